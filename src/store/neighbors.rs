//! Neighbor table (§3): remote profile servers we import profiles from.

use super::locks::NEIGHBORS;
use super::types::Neighbor;
use super::Store;
use crate::common::{Location, NetworkId};
use crate::error::Result;
use rusqlite::{params, OptionalExtension, Row};

fn row_to_neighbor(row: &Row) -> rusqlite::Result<Neighbor> {
    let network_id: Vec<u8> = row.get("network_id")?;
    Ok(Neighbor {
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
    /// Upserts a neighbor from a LOC-delivered neighbor set (§3, §4.9).
    pub async fn upsert_neighbor(&self, neighbor: Neighbor) -> Result<()> {
        self.unit_of_work(&[NEIGHBORS], move |tx| {
            tx.execute(
                "INSERT INTO neighbors (network_id, ip, primary_port, sr_neighbor_port, lat_micro, lon_micro, last_refresh_time)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)
                 ON CONFLICT(network_id) DO UPDATE SET
                    ip = excluded.ip, primary_port = excluded.primary_port,
                    lat_micro = excluded.lat_micro, lon_micro = excluded.lon_micro",
                params![
                    neighbor.network_id.0.to_vec(),
                    neighbor.ip,
                    neighbor.primary_port,
                    neighbor.sr_neighbor_port,
                    neighbor.location.lat_micro,
                    neighbor.location.lon_micro,
                    neighbor.last_refresh_time,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_neighbor_sr_port(&self, network_id: NetworkId, port: u16) -> Result<()> {
        self.unit_of_work(&[NEIGHBORS], move |tx| {
            tx.execute(
                "UPDATE neighbors SET sr_neighbor_port = ?2 WHERE network_id = ?1",
                params![network_id.0.to_vec(), port],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_neighbor_last_refresh(&self, network_id: NetworkId, now: i64) -> Result<()> {
        self.unit_of_work(&[NEIGHBORS], move |tx| {
            tx.execute(
                "UPDATE neighbors SET last_refresh_time = ?2 WHERE network_id = ?1",
                params![network_id.0.to_vec(), now],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_neighbor(&self, network_id: NetworkId) -> Result<Option<Neighbor>> {
        self.unit_of_work(&[NEIGHBORS], move |tx| {
            tx.query_row(
                "SELECT * FROM neighbors WHERE network_id = ?1",
                params![network_id.0.to_vec()],
                row_to_neighbor,
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    pub async fn delete_neighbor(&self, network_id: NetworkId) -> Result<()> {
        self.unit_of_work(&[NEIGHBORS], move |tx| {
            tx.execute("DELETE FROM neighbors WHERE network_id = ?1", params![network_id.0.to_vec()])?;
            Ok(())
        })
        .await
    }

    pub async fn list_neighbors(&self) -> Result<Vec<Neighbor>> {
        self.unit_of_work(&[NEIGHBORS], |tx| {
            let mut stmt = tx.prepare("SELECT * FROM neighbors")?;
            let rows = stmt.query_map([], row_to_neighbor)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Neighbors absent from the latest LOC set beyond the grace window,
    /// or stale past `neighbor_profiles_expiration_time` (Cron, §4.9).
    pub async fn stale_neighbors(&self, refresh_before: i64) -> Result<Vec<Neighbor>> {
        self.unit_of_work(&[NEIGHBORS], move |tx| {
            let mut stmt = tx.prepare(
                "SELECT * FROM neighbors WHERE last_refresh_time IS NOT NULL AND last_refresh_time < ?1",
            )?;
            let rows = stmt.query_map(params![refresh_before], row_to_neighbor)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}
