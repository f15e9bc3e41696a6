//! Follower table (§3): remote profile servers we push to.

use super::locks::FOLLOWERS;
use super::types::Follower;
use super::Store;
use crate::common::{Location, NetworkId};
use crate::error::Result;
use rusqlite::{params, OptionalExtension, Row};

fn row_to_follower(row: &Row) -> rusqlite::Result<Follower> {
    let network_id: Vec<u8> = row.get("network_id")?;
    Ok(Follower {
        network_id: NetworkId(to_array32(&network_id)),
        ip: row.get("ip")?,
        primary_port: row.get("primary_port")?,
        sr_neighbor_port: row.get("sr_neighbor_port")?,
        location: Location {
            lat_micro: row.get("lat_micro")?,
            lon_micro: row.get("lon_micro")?,
        },
        last_refresh_time: row.get("last_refresh_time")?,
    })
}

fn to_array32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

impl Store {
    /// Created when a remote server successfully completes neighborhood
    /// initialization against us (§3).
    pub async fn create_follower(&self, follower: Follower) -> Result<()> {
        self.unit_of_work(&[FOLLOWERS], move |tx| {
            tx.execute(
                "INSERT INTO followers (network_id, ip, primary_port, sr_neighbor_port, lat_micro, lon_micro, last_refresh_time)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)
                 ON CONFLICT(network_id) DO UPDATE SET
                    ip = excluded.ip, primary_port = excluded.primary_port,
                    sr_neighbor_port = excluded.sr_neighbor_port,
                    last_refresh_time = excluded.last_refresh_time",
                params![
                    follower.network_id.0.to_vec(),
                    follower.ip,
                    follower.primary_port,
                    follower.sr_neighbor_port,
                    follower.location.lat_micro,
                    follower.location.lon_micro,
                    follower.last_refresh_time,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_follower(&self, network_id: NetworkId) -> Result<Option<Follower>> {
        self.unit_of_work(&[FOLLOWERS], move |tx| {
            tx.query_row(
                "SELECT * FROM followers WHERE network_id = ?1",
                params![network_id.0.to_vec()],
                row_to_follower,
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    pub async fn list_followers(&self) -> Result<Vec<Follower>> {
        self.unit_of_work(&[FOLLOWERS], |tx| {
            let mut stmt = tx.prepare("SELECT * FROM followers")?;
            let rows = stmt.query_map([], row_to_follower)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    pub async fn set_follower_sr_port(&self, network_id: NetworkId, port: u16) -> Result<()> {
        self.unit_of_work(&[FOLLOWERS], move |tx| {
            tx.execute(
                "UPDATE followers SET sr_neighbor_port = ?2 WHERE network_id = ?1",
                params![network_id.0.to_vec(), port],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_follower_last_refresh(&self, network_id: NetworkId, now: i64) -> Result<()> {
        self.unit_of_work(&[FOLLOWERS], move |tx| {
            tx.execute(
                "UPDATE followers SET last_refresh_time = ?2 WHERE network_id = ?1",
                params![network_id.0.to_vec(), now],
            )?;
            Ok(())
        })
        .await
    }

    /// Removed when refresh actions fail three consecutive times, or on
    /// `StopNeighborhoodUpdates` (§3).
    pub async fn delete_follower(&self, network_id: NetworkId) -> Result<()> {
        self.unit_of_work(&[FOLLOWERS], move |tx| {
            tx.execute("DELETE FROM followers WHERE network_id = ?1", params![network_id.0.to_vec()])?;
            Ok(())
        })
        .await
    }

    pub async fn count_followers(&self) -> Result<u32> {
        self.unit_of_work(&[FOLLOWERS], |tx| {
            let count: i64 = tx.query_row("SELECT COUNT(*) FROM followers", [], |r| r.get(0))?;
            Ok(count as u32)
        })
        .await
    }
}
