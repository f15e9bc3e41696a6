//! Neighbor Identity table (§3): profiles imported from a neighbor.

use super::locks::NEIGHBOR_IDENTITIES;
use super::types::NeighborIdentity;
use super::Store;
use crate::common::{ImageHash, Location, NetworkId, Version};
use crate::error::Result;
use rusqlite::{params, OptionalExtension, Row, Transaction};

fn row_to_identity(row: &Row) -> rusqlite::Result<NeighborIdentity> {
    let hosting: Vec<u8> = row.get("hosting_server_network_id")?;
    let network_id: Vec<u8> = row.get("network_id")?;
    let thumbnail: Option<Vec<u8>> = row.get("thumbnail_image")?;
    Ok(NeighborIdentity {
        hosting_server_network_id: NetworkId(to_array32(&hosting)),
        network_id: NetworkId(to_array32(&network_id)),
        name: row.get("name")?,
        identity_type: row.get("identity_type")?,
        location: Location {
            lat_micro: row.get("lat_micro")?,
            lon_micro: row.get("lon_micro")?,
        },
        extra_data: row.get("extra_data")?,
        version: Version {
            major: row.get("version_major")?,
            minor: row.get("version_minor")?,
            patch: row.get("version_patch")?,
        },
        thumbnail_image: thumbnail.map(|b| ImageHash(to_array32(&b))),
    })
}

fn to_array32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Upserts `identity`, returning the thumbnail hash the row had *before*
/// this write (`None` if the row didn't exist yet), so the caller can
/// release it if it's being replaced (§4.4, §8 invariant 1).
fn upsert_tx(tx: &Transaction, identity: &NeighborIdentity) -> Result<Option<ImageHash>> {
    let previous: Option<Vec<u8>> = tx
        .query_row(
            "SELECT thumbnail_image FROM neighbor_identities WHERE hosting_server_network_id = ?1 AND network_id = ?2",
            params![identity.hosting_server_network_id.0.to_vec(), identity.network_id.0.to_vec()],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    tx.execute(
        "INSERT INTO neighbor_identities
            (hosting_server_network_id, network_id, name, identity_type, lat_micro, lon_micro,
             extra_data, version_major, version_minor, version_patch, thumbnail_image)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
         ON CONFLICT(hosting_server_network_id, network_id) DO UPDATE SET
            name = excluded.name, identity_type = excluded.identity_type,
            lat_micro = excluded.lat_micro, lon_micro = excluded.lon_micro,
            extra_data = excluded.extra_data,
            version_major = excluded.version_major, version_minor = excluded.version_minor,
            version_patch = excluded.version_patch, thumbnail_image = excluded.thumbnail_image",
        params![
            identity.hosting_server_network_id.0.to_vec(),
            identity.network_id.0.to_vec(),
            identity.name,
            identity.identity_type,
            identity.location.lat_micro,
            identity.location.lon_micro,
            identity.extra_data,
            identity.version.major,
            identity.version.minor,
            identity.version.patch,
            identity.thumbnail_image.map(|h| h.0.to_vec()),
        ],
    )?;
    Ok(previous.map(|b| ImageHash(to_array32(&b))))
}

impl Store {
    /// Applies an `AddProfile`/`ChangeProfile` item from
    /// `NeighborhoodSharedProfileUpdate` (§3, §4.8). Returns the thumbnail
    /// hash the row had before this write, if any, so the caller can
    /// release it when it's being replaced.
    pub async fn upsert_neighbor_identity(&self, identity: NeighborIdentity) -> Result<Option<ImageHash>> {
        self.unit_of_work(&[NEIGHBOR_IDENTITIES], move |tx| upsert_tx(tx, &identity))
            .await
    }

    /// Applies a `Delete` update item for one identity, returning its
    /// thumbnail hash (if any) for image refcount cleanup.
    pub async fn delete_neighbor_identity(&self, hosting_server: NetworkId, network_id: NetworkId) -> Result<Option<ImageHash>> {
        self.unit_of_work(&[NEIGHBOR_IDENTITIES], move |tx| {
            let thumbnail: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT thumbnail_image FROM neighbor_identities WHERE hosting_server_network_id = ?1 AND network_id = ?2",
                    params![hosting_server.0.to_vec(), network_id.0.to_vec()],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            tx.execute(
                "DELETE FROM neighbor_identities WHERE hosting_server_network_id = ?1 AND network_id = ?2",
                params![hosting_server.0.to_vec(), network_id.0.to_vec()],
            )?;
            Ok(thumbnail.map(|b| ImageHash(to_array32(&b))))
        })
        .await
    }

    /// Deletes every identity imported from `hosting_server`, returning
    /// their thumbnail hashes for image refcount cleanup (neighbor
    /// removal, §3, §4.8).
    pub async fn delete_all_from_server(&self, hosting_server: NetworkId) -> Result<Vec<ImageHash>> {
        self.unit_of_work(&[NEIGHBOR_IDENTITIES], move |tx| {
            let mut stmt = tx.prepare(
                "SELECT thumbnail_image FROM neighbor_identities WHERE hosting_server_network_id = ?1",
            )?;
            let hashes: Vec<ImageHash> = stmt
                .query_map(params![hosting_server.0.to_vec()], |row| {
                    let thumb: Option<Vec<u8>> = row.get(0)?;
                    Ok(thumb.map(|b| ImageHash(to_array32(&b))))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect();
            tx.execute(
                "DELETE FROM neighbor_identities WHERE hosting_server_network_id = ?1",
                params![hosting_server.0.to_vec()],
            )?;
            Ok(hashes)
        })
        .await
    }

    pub async fn search_neighbor_identities(&self) -> Result<Vec<NeighborIdentity>> {
        self.unit_of_work(&[NEIGHBOR_IDENTITIES], |tx| {
            let mut stmt = tx.prepare(
                "SELECT * FROM neighbor_identities
                 WHERE NOT (version_major = 0 AND version_minor = 0 AND version_patch = 0)",
            )?;
            let rows = stmt.query_map([], row_to_identity)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}
