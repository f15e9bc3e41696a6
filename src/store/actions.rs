//! Neighborhood Action queue (§3, §4.8): the persistent unit of work that
//! C8 drains.

use super::locks::{FOLLOWERS, NEIGHBORHOOD_ACTIONS};
use super::types::{ActionType, NeighborhoodAction};
use super::Store;
use crate::common::NetworkId;
use crate::error::Result;
use rusqlite::{params, Row, Transaction};

fn row_to_action(row: &Row) -> rusqlite::Result<NeighborhoodAction> {
    let server_id: Vec<u8> = row.get("server_id")?;
    let target: Option<Vec<u8>> = row.get("target_identity_id")?;
    let raw_action_type: String = row.get("action_type")?;
    let action_type = ActionType::from_str(&raw_action_type).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(0, format!("action_type = {raw_action_type:?}"), rusqlite::types::Type::Text)
    })?;
    Ok(NeighborhoodAction {
        id: row.get("id")?,
        server_id: NetworkId(to_array32(&server_id)),
        action_type,
        timestamp: row.get("timestamp")?,
        execute_after: row.get("execute_after")?,
        target_identity_id: target.map(|b| NetworkId(to_array32(&b))),
        additional_data: row.get("additional_data")?,
    })
}

fn to_array32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn insert_tx(
    tx: &Transaction,
    server_id: NetworkId,
    action_type: ActionType,
    now: i64,
    target_identity_id: Option<NetworkId>,
    additional_data: Option<String>,
) -> Result<()> {
    tx.execute(
        "INSERT INTO neighborhood_actions (server_id, action_type, timestamp, execute_after, target_identity_id, additional_data)
         VALUES (?1,?2,?3,NULL,?4,?5)",
        params![
            server_id.0.to_vec(),
            action_type.as_str(),
            now,
            target_identity_id.map(|n| n.0.to_vec()),
            additional_data,
        ],
    )?;
    Ok(())
}

impl Store {
    pub async fn enqueue_action(
        &self,
        server_id: NetworkId,
        action_type: ActionType,
        now: i64,
        target_identity_id: Option<NetworkId>,
        additional_data: Option<String>,
    ) -> Result<()> {
        self.unit_of_work(&[NEIGHBORHOOD_ACTIONS], move |tx| {
            insert_tx(tx, server_id, action_type, now, target_identity_id, additional_data)
        })
        .await
    }

    /// Identity-change fan-out (§4.8): inserts a `ChangeProfile` action for
    /// every Follower row, holding the Follower and NeighborhoodAction
    /// locks together so the follower set cannot change mid-fan-out.
    pub async fn fan_out_to_followers(
        &self,
        action_type: ActionType,
        target_identity_id: NetworkId,
        now: i64,
        additional_data: Option<String>,
    ) -> Result<usize> {
        self.unit_of_work(&[FOLLOWERS, NEIGHBORHOOD_ACTIONS], move |tx| {
            let mut stmt = tx.prepare("SELECT network_id FROM followers")?;
            let follower_ids: Vec<Vec<u8>> = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);
            for raw in &follower_ids {
                insert_tx(
                    tx,
                    NetworkId(to_array32(raw)),
                    action_type,
                    now,
                    Some(target_identity_id),
                    additional_data.clone(),
                )?;
            }
            Ok(follower_ids.len())
        })
        .await
    }

    /// Actions ready to run: `ExecuteAfter IS NULL OR ExecuteAfter <= now`,
    /// ordered by `Id` ascending, up to `limit` (§4.8 step 1).
    pub async fn poll_ready_actions(&self, now: i64, limit: usize) -> Result<Vec<NeighborhoodAction>> {
        self.unit_of_work(&[NEIGHBORHOOD_ACTIONS], move |tx| {
            let mut stmt = tx.prepare(
                "SELECT * FROM neighborhood_actions
                 WHERE execute_after IS NULL OR execute_after <= ?1
                 ORDER BY id ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![now, limit as i64], row_to_action)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    pub async fn delete_action(&self, id: i64) -> Result<()> {
        self.unit_of_work(&[NEIGHBORHOOD_ACTIONS], move |tx| {
            tx.execute("DELETE FROM neighborhood_actions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    pub async fn reschedule_action(&self, id: i64, execute_after: i64) -> Result<()> {
        self.unit_of_work(&[NEIGHBORHOOD_ACTIONS], move |tx| {
            tx.execute(
                "UPDATE neighborhood_actions SET execute_after = ?2 WHERE id = ?1",
                params![id, execute_after],
            )?;
            Ok(())
        })
        .await
    }

    /// Count of outstanding `RefreshProfiles` actions targeting `server_id`
    /// (follower eviction threshold, §3, §4.9).
    pub async fn count_refresh_actions(&self, server_id: NetworkId) -> Result<u32> {
        self.unit_of_work(&[NEIGHBORHOOD_ACTIONS], move |tx| {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM neighborhood_actions WHERE server_id = ?1 AND action_type = ?2",
                params![server_id.0.to_vec(), ActionType::RefreshProfiles.as_str()],
                |r| r.get(0),
            )?;
            Ok(count as u32)
        })
        .await
    }

    /// Whether a `RemoveNeighbor` action is already queued for `server_id`.
    pub async fn has_pending_remove_neighbor(&self, server_id: NetworkId) -> Result<bool> {
        self.unit_of_work(&[NEIGHBORHOOD_ACTIONS], move |tx| {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM neighborhood_actions WHERE server_id = ?1 AND action_type = ?2",
                params![server_id.0.to_vec(), ActionType::RemoveNeighbor.as_str()],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    /// Deletes every action targeting `server_id` except `keep_id`
    /// (`RemoveNeighbor` effect, §4.8 step 4).
    pub async fn delete_actions_for_server_except(&self, server_id: NetworkId, keep_id: i64) -> Result<()> {
        self.unit_of_work(&[NEIGHBORHOOD_ACTIONS], move |tx| {
            tx.execute(
                "DELETE FROM neighborhood_actions WHERE server_id = ?1 AND id != ?2",
                params![server_id.0.to_vec(), keep_id],
            )?;
            Ok(())
        })
        .await
    }
}
