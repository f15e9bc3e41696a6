//! Hosted Identity table (§3): identities owned by this server.

use super::locks::HOSTED_IDENTITIES;
use super::types::HostedIdentity;
use super::Store;
use crate::common::{ImageHash, Location, NetworkId, Version};
use crate::error::{Error, Result};
use rusqlite::{params, OptionalExtension, Row, Transaction};

fn row_to_identity(row: &Row) -> rusqlite::Result<HostedIdentity> {
    let network_id: Vec<u8> = row.get("network_id")?;
    let public_key: Vec<u8> = row.get("public_key")?;
    let profile_image: Option<Vec<u8>> = row.get("profile_image")?;
    let thumbnail_image: Option<Vec<u8>> = row.get("thumbnail_image")?;
    Ok(HostedIdentity {
        network_id: to_network_id(&network_id),
        public_key: to_array32(&public_key),
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
        profile_image: profile_image.map(|b| ImageHash(to_array32(&b))),
        thumbnail_image: thumbnail_image.map(|b| ImageHash(to_array32(&b))),
        initialized: row.get::<_, i64>("initialized")? != 0,
        cancelled: row.get::<_, i64>("cancelled")? != 0,
        expiration_date: row.get("expiration_date")?,
    })
}

fn to_network_id(bytes: &[u8]) -> NetworkId {
    NetworkId(to_array32(bytes))
}

fn to_array32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn insert_tx(tx: &Transaction, identity: &HostedIdentity) -> Result<()> {
    tx.execute(
        "INSERT INTO hosted_identities
            (network_id, public_key, name, identity_type, lat_micro, lon_micro, extra_data,
             version_major, version_minor, version_patch, profile_image, thumbnail_image,
             initialized, cancelled, expiration_date)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
        params![
            identity.network_id.0.to_vec(),
            identity.public_key.to_vec(),
            identity.name,
            identity.identity_type,
            identity.location.lat_micro,
            identity.location.lon_micro,
            identity.extra_data,
            identity.version.major,
            identity.version.minor,
            identity.version.patch,
            identity.profile_image.map(|h| h.0.to_vec()),
            identity.thumbnail_image.map(|h| h.0.to_vec()),
            identity.initialized as i64,
            identity.cancelled as i64,
            identity.expiration_date,
        ],
    )?;
    Ok(())
}

impl Store {
    pub async fn count_hosted_identities(&self) -> Result<u32> {
        self.unit_of_work(&[HOSTED_IDENTITIES], |tx| {
            let count: i64 = tx.query_row("SELECT COUNT(*) FROM hosted_identities", [], |r| r.get(0))?;
            Ok(count as u32)
        })
        .await
    }

    /// `RegisterHosting`: creates a fresh, uninitialized hosted identity
    /// (`Version = 0.0.0`, §3).
    pub async fn register_hosting(&self, network_id: NetworkId, public_key: [u8; 32]) -> Result<()> {
        self.unit_of_work(&[HOSTED_IDENTITIES], move |tx| {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM hosted_identities WHERE network_id = ?1",
                    params![network_id.0.to_vec()],
                    |r| r.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(Error::AlreadyExists("identity already hosted".into()));
            }
            let identity = HostedIdentity {
                network_id,
                public_key,
                name: String::new(),
                identity_type: String::new(),
                location: Location { lat_micro: 0, lon_micro: 0 },
                extra_data: String::new(),
                version: Version::UNINITIALIZED,
                profile_image: None,
                thumbnail_image: None,
                initialized: false,
                cancelled: false,
                expiration_date: None,
            };
            insert_tx(tx, &identity)
        })
        .await
    }

    pub async fn get_hosted_identity(&self, network_id: NetworkId) -> Result<Option<HostedIdentity>> {
        self.unit_of_work(&[HOSTED_IDENTITIES], move |tx| {
            tx.query_row(
                "SELECT * FROM hosted_identities WHERE network_id = ?1",
                params![network_id.0.to_vec()],
                row_to_identity,
            )
            .optional()
            .map_err(Error::from)
        })
        .await
    }

    /// `UpdateProfile`: sets `Initialized = true` on first call, refreshes
    /// name/type/location/extra_data/version/images (§3).
    pub async fn update_profile(
        &self,
        network_id: NetworkId,
        name: String,
        identity_type: String,
        location: Location,
        extra_data: String,
        version: Version,
        profile_image: Option<ImageHash>,
        thumbnail_image: Option<ImageHash>,
    ) -> Result<()> {
        self.unit_of_work(&[HOSTED_IDENTITIES], move |tx| {
            let updated = tx.execute(
                "UPDATE hosted_identities SET
                    name = ?2, identity_type = ?3, lat_micro = ?4, lon_micro = ?5,
                    extra_data = ?6, version_major = ?7, version_minor = ?8, version_patch = ?9,
                    profile_image = ?10, thumbnail_image = ?11, initialized = 1
                 WHERE network_id = ?1 AND cancelled = 0",
                params![
                    network_id.0.to_vec(),
                    name,
                    identity_type,
                    location.lat_micro,
                    location.lon_micro,
                    extra_data,
                    version.major,
                    version.minor,
                    version.patch,
                    profile_image.map(|h| h.0.to_vec()),
                    thumbnail_image.map(|h| h.0.to_vec()),
                ],
            )?;
            if updated == 0 {
                return Err(Error::NotFound("hosted identity".into()));
            }
            Ok(())
        })
        .await
    }

    /// Sets `ExpirationDate`; `None` while an active session exists.
    pub async fn set_expiration(&self, network_id: NetworkId, expiration: Option<i64>) -> Result<()> {
        self.unit_of_work(&[HOSTED_IDENTITIES], move |tx| {
            tx.execute(
                "UPDATE hosted_identities SET expiration_date = ?2 WHERE network_id = ?1",
                params![network_id.0.to_vec(), expiration],
            )?;
            Ok(())
        })
        .await
    }

    /// `CancelHostingAgreement` / Cron expiry: deletes the row and returns
    /// it so the caller can release its image references (§3, §9).
    pub async fn delete_hosted_identity(&self, network_id: NetworkId) -> Result<Option<HostedIdentity>> {
        self.unit_of_work(&[HOSTED_IDENTITIES], move |tx| {
            let existing = tx
                .query_row(
                    "SELECT * FROM hosted_identities WHERE network_id = ?1",
                    params![network_id.0.to_vec()],
                    row_to_identity,
                )
                .optional()?;
            if existing.is_some() {
                tx.execute(
                    "DELETE FROM hosted_identities WHERE network_id = ?1",
                    params![network_id.0.to_vec()],
                )?;
            }
            Ok(existing)
        })
        .await
    }

    pub async fn mark_cancelled(&self, network_id: NetworkId) -> Result<()> {
        self.unit_of_work(&[HOSTED_IDENTITIES], move |tx| {
            tx.execute(
                "UPDATE hosted_identities SET cancelled = 1 WHERE network_id = ?1",
                params![network_id.0.to_vec()],
            )?;
            Ok(())
        })
        .await
    }

    /// Hosted identities with `ExpirationDate < now` (Cron, §4.9).
    pub async fn expired_hosted_identities(&self, now: i64) -> Result<Vec<HostedIdentity>> {
        self.unit_of_work(&[HOSTED_IDENTITIES], move |tx| {
            let mut stmt = tx.prepare(
                "SELECT * FROM hosted_identities WHERE expiration_date IS NOT NULL AND expiration_date < ?1",
            )?;
            let rows = stmt.query_map(params![now], row_to_identity)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// All initialized, non-cancelled hosted identities, for
    /// `InitializeProfiles` snapshots (§4.8).
    pub async fn all_active_hosted_identities(&self) -> Result<Vec<HostedIdentity>> {
        self.unit_of_work(&[HOSTED_IDENTITIES], |tx| {
            let mut stmt = tx.prepare(
                "SELECT * FROM hosted_identities
                 WHERE initialized = 1 AND cancelled = 0 AND (version_major + version_minor + version_patch) > 0",
            )?;
            let rows = stmt.query_map([], row_to_identity)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Hosted-side half of a search query (§4.7): excludes `0.0.0`
    /// versions, cancelled, and expiring identities at the SQL level.
    pub async fn search_hosted(&self) -> Result<Vec<HostedIdentity>> {
        self.unit_of_work(&[HOSTED_IDENTITIES], |tx| {
            let mut stmt = tx.prepare(
                "SELECT * FROM hosted_identities
                 WHERE cancelled = 0 AND expiration_date IS NULL
                   AND NOT (version_major = 0 AND version_minor = 0 AND version_patch = 0)",
            )?;
            let rows = stmt.query_map([], row_to_identity)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}
