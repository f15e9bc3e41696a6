//! Related Identity (relationship card) table (§3).

use super::locks::RELATED_IDENTITIES;
use super::types::RelatedIdentity;
use super::Store;
use crate::common::NetworkId;
use crate::error::{Error, Result};
use rusqlite::{params, Row};

fn row_to_related(row: &Row) -> rusqlite::Result<RelatedIdentity> {
    let identity_id: Vec<u8> = row.get("identity_id")?;
    let related_to: Vec<u8> = row.get("related_to_identity_id")?;
    Ok(RelatedIdentity {
        identity_id: NetworkId(to_array32(&identity_id)),
        application_id: row.get("application_id")?,
        related_to_identity_id: NetworkId(to_array32(&related_to)),
        relation_type: row.get("relation_type")?,
        valid_from: row.get("valid_from")?,
        valid_to: row.get("valid_to")?,
        signed_card: row.get("signed_card")?,
    })
}

fn to_array32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

impl Store {
    pub async fn add_related_identity(&self, card: RelatedIdentity, max_relations: u32) -> Result<()> {
        self.unit_of_work(&[RELATED_IDENTITIES], move |tx| {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM related_identities WHERE identity_id = ?1",
                params![card.identity_id.0.to_vec()],
                |r| r.get(0),
            )?;
            if count as u32 >= max_relations {
                return Err(Error::ResourceExhausted("max_identity_relations reached".into()));
            }
            tx.execute(
                "INSERT INTO related_identities
                    (identity_id, application_id, related_to_identity_id, relation_type, valid_from, valid_to, signed_card)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)
                 ON CONFLICT(identity_id, application_id) DO UPDATE SET
                    related_to_identity_id = excluded.related_to_identity_id,
                    relation_type = excluded.relation_type,
                    valid_from = excluded.valid_from,
                    valid_to = excluded.valid_to,
                    signed_card = excluded.signed_card",
                params![
                    card.identity_id.0.to_vec(),
                    card.application_id,
                    card.related_to_identity_id.0.to_vec(),
                    card.relation_type,
                    card.valid_from,
                    card.valid_to,
                    card.signed_card,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn remove_related_identity(&self, identity_id: NetworkId, application_id: String) -> Result<()> {
        self.unit_of_work(&[RELATED_IDENTITIES], move |tx| {
            tx.execute(
                "DELETE FROM related_identities WHERE identity_id = ?1 AND application_id = ?2",
                params![identity_id.0.to_vec(), application_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Removes every relationship card owned by `identity_id` (host
    /// identity deletion, §3).
    pub async fn remove_all_for_identity(&self, identity_id: NetworkId) -> Result<()> {
        self.unit_of_work(&[RELATED_IDENTITIES], move |tx| {
            tx.execute(
                "DELETE FROM related_identities WHERE identity_id = ?1",
                params![identity_id.0.to_vec()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_related_identities(&self, identity_id: NetworkId) -> Result<Vec<RelatedIdentity>> {
        self.unit_of_work(&[RELATED_IDENTITIES], move |tx| {
            let mut stmt = tx.prepare("SELECT * FROM related_identities WHERE identity_id = ?1")?;
            let rows = stmt.query_map(params![identity_id.0.to_vec()], row_to_related)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}
