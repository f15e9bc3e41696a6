//! Profile Store (C3, §3, §4.3).
//!
//! Embedded transactional store (SQLite via `rusqlite`) of hosted
//! identities, neighbor identities, related-identity cards, neighbors,
//! followers, the neighborhood-action queue, and settings. Grounded on
//! the teacher's `storage`/`catalog` split, simplified to a single
//! connection guarded by a serializing mutex plus the named [`locks::LockSet`]
//! that encodes the lock-ordering discipline from §4.3/§9.
//!
//! A single `rusqlite::Connection` wrapped in a mutex stands in for the
//! teacher's buffer-pool/page-manager storage engine: every unit-of-work
//! still runs as one `BEGIN IMMEDIATE` transaction, which is what §4.3's
//! serializable-isolation requirement actually needs here.

pub mod actions;
pub mod followers;
pub mod hosted;
pub mod locks;
pub mod neighbor_identities;
pub mod neighbors;
pub mod related;
pub mod settings;
pub mod types;

use crate::error::{Error, Result};
use locks::LockSet;
use parking_lot::Mutex as SyncMutex;
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;

fn bytes_to_hash(bytes: &[u8]) -> crate::common::ImageHash {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    crate::common::ImageHash(out)
}

pub struct Store {
    conn: SyncMutex<Connection>,
    locks: LockSet,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Store {
            conn: SyncMutex::new(conn),
            locks: LockSet::new(),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS hosted_identities (
                network_id        BLOB PRIMARY KEY,
                public_key        BLOB NOT NULL,
                name              TEXT NOT NULL,
                identity_type     TEXT NOT NULL,
                lat_micro         INTEGER NOT NULL,
                lon_micro         INTEGER NOT NULL,
                extra_data        TEXT NOT NULL,
                version_major     INTEGER NOT NULL,
                version_minor     INTEGER NOT NULL,
                version_patch     INTEGER NOT NULL,
                profile_image     BLOB,
                thumbnail_image   BLOB,
                initialized       INTEGER NOT NULL DEFAULT 0,
                cancelled         INTEGER NOT NULL DEFAULT 0,
                expiration_date   INTEGER
            );

            CREATE TABLE IF NOT EXISTS neighbor_identities (
                hosting_server_network_id BLOB NOT NULL,
                network_id                BLOB NOT NULL,
                name                      TEXT NOT NULL,
                identity_type             TEXT NOT NULL,
                lat_micro                 INTEGER NOT NULL,
                lon_micro                 INTEGER NOT NULL,
                extra_data                TEXT NOT NULL,
                version_major             INTEGER NOT NULL,
                version_minor             INTEGER NOT NULL,
                version_patch             INTEGER NOT NULL,
                thumbnail_image           BLOB,
                PRIMARY KEY (hosting_server_network_id, network_id)
            );

            CREATE TABLE IF NOT EXISTS related_identities (
                identity_id           BLOB NOT NULL,
                application_id        TEXT NOT NULL,
                related_to_identity_id BLOB NOT NULL,
                relation_type         TEXT NOT NULL,
                valid_from            INTEGER NOT NULL,
                valid_to              INTEGER NOT NULL,
                signed_card           BLOB NOT NULL,
                PRIMARY KEY (identity_id, application_id)
            );

            CREATE TABLE IF NOT EXISTS neighbors (
                network_id        BLOB PRIMARY KEY,
                ip                TEXT NOT NULL,
                primary_port      INTEGER NOT NULL,
                sr_neighbor_port  INTEGER,
                lat_micro         INTEGER NOT NULL,
                lon_micro         INTEGER NOT NULL,
                last_refresh_time INTEGER
            );

            CREATE TABLE IF NOT EXISTS followers (
                network_id        BLOB PRIMARY KEY,
                ip                TEXT NOT NULL,
                primary_port      INTEGER NOT NULL,
                sr_neighbor_port  INTEGER,
                lat_micro         INTEGER NOT NULL,
                lon_micro         INTEGER NOT NULL,
                last_refresh_time INTEGER
            );

            CREATE TABLE IF NOT EXISTS neighborhood_actions (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id          BLOB NOT NULL,
                action_type        TEXT NOT NULL,
                timestamp          INTEGER NOT NULL,
                execute_after      INTEGER,
                target_identity_id BLOB,
                additional_data    TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_actions_execute_after ON neighborhood_actions(execute_after);
            CREATE INDEX IF NOT EXISTS idx_actions_server ON neighborhood_actions(server_id);

            CREATE TABLE IF NOT EXISTS settings (
                name  TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Runs `f` inside a single serializable transaction, after acquiring
    /// the named locks for `tables` in lexicographic order (§4.3). `f`
    /// must not perform network or other unbounded-wait I/O — only the
    /// transaction body.
    pub async fn unit_of_work<F, T>(&self, tables: &[&'static str], f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.locks.acquire(tables).await;
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(Error::from)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(Error::from)?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    /// Direct connection access for simple, low-contention reads/writes
    /// (settings at startup) that don't need a full unit-of-work. Prefer
    /// [`Store::unit_of_work`] for anything touching hosted/neighbor state.
    pub(crate) fn lock_conn(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Every `ImageHash` currently referenced by a row in the store, for
    /// [`crate::images::ImageManager::reconcile`] at startup.
    pub async fn all_image_references(&self) -> Result<Vec<crate::common::ImageHash>> {
        self.unit_of_work(&[locks::HOSTED_IDENTITIES, locks::NEIGHBOR_IDENTITIES], |tx| {
            let mut hashes = Vec::new();
            let mut stmt = tx.prepare("SELECT profile_image, thumbnail_image FROM hosted_identities")?;
            let rows = stmt.query_map([], |row| {
                let profile: Option<Vec<u8>> = row.get(0)?;
                let thumb: Option<Vec<u8>> = row.get(1)?;
                Ok([profile, thumb])
            })?;
            for pair in rows {
                for bytes in pair?.into_iter().flatten() {
                    hashes.push(bytes_to_hash(&bytes));
                }
            }
            drop(stmt);

            let mut stmt = tx.prepare("SELECT thumbnail_image FROM neighbor_identities")?;
            let rows = stmt.query_map([], |row| row.get::<_, Option<Vec<u8>>>(0))?;
            for thumb in rows {
                if let Some(bytes) = thumb? {
                    hashes.push(bytes_to_hash(&bytes));
                }
            }
            Ok(hashes)
        })
        .await
    }

    pub fn tables() -> &'static [&'static str] {
        &[
            locks::FOLLOWERS,
            locks::HOSTED_IDENTITIES,
            locks::NEIGHBOR_IDENTITIES,
            locks::NEIGHBORHOOD_ACTIONS,
            locks::NEIGHBORS,
            locks::RELATED_IDENTITIES,
            locks::SETTINGS,
        ]
    }
}
