//! CAN client (§4.2, §4.10): the content-addressed network sidecar this
//! server publishes its contact record to, and through which profile
//! images can be pinned/resolved by hash for other servers to fetch.
//! Same `reqwest::Client` shape as [`super::loc::LocClient`].

use crate::common::{ImageHash, NetworkId};
use crate::config::Settings;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CanClient {
    http: reqwest::Client,
    base_url: String,
}

/// The server's published contact record (§4.2): how a client resolving
/// this server's `NetworkId` learns where to reach it.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContactRecord {
    pub network_id: String,
    pub address: String,
    pub primary_port: u16,
}

impl CanClient {
    pub fn new(settings: &Settings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        CanClient { http, base_url: format!("http://127.0.0.1:{}", settings.can_api_port) }
    }

    /// Publishes this server's contact record, called at startup when
    /// [`crate::identity::ServerIdentity::contact_information_changed`] is
    /// set (§4.2).
    pub async fn publish_contact(&self, network_id: NetworkId, address: &str, primary_port: u16) -> Result<()> {
        let record = ContactRecord { network_id: network_id.to_hex(), address: address.to_string(), primary_port };
        let url = format!("{}/api/v0/publish", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&record)
            .send()
            .await
            .map_err(|e| Error::Network(format!("CAN publish failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!("CAN publish returned {}", response.status())));
        }
        Ok(())
    }

    /// Resolves a remote server's `NetworkId` to its current contact
    /// record (§4.2), used when dialing a neighbor whose `ip`/`primary_port`
    /// is missing or stale.
    pub async fn resolve_contact(&self, network_id: NetworkId) -> Result<ContactRecord> {
        let url = format!("{}/api/v0/resolve/{}", self.base_url, network_id.to_hex());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("CAN resolve failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!("CAN resolve returned {}", response.status())));
        }
        response.json().await.map_err(|e| Error::Serialization(format!("failed to parse CAN resolve response: {e}")))
    }

    /// Fetches pinned image bytes by content hash.
    pub async fn cat(&self, hash: ImageHash) -> Result<Vec<u8>> {
        let url = format!("{}/api/v0/cat/{}", self.base_url, hash.to_hex_lower());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("CAN cat failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!("CAN cat returned {}", response.status())));
        }
        response.bytes().await.map(|b| b.to_vec()).map_err(|e| Error::Network(format!("CAN cat body read failed: {e}")))
    }

    /// Pins image bytes under their content hash so other servers can
    /// `cat` them.
    pub async fn pin(&self, bytes: &[u8]) -> Result<ImageHash> {
        let hash = ImageHash::of(bytes);
        let url = format!("{}/api/v0/pin/{}", self.base_url, hash.to_hex_lower());
        let response = self
            .http
            .post(&url)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| Error::Network(format!("CAN pin failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!("CAN pin returned {}", response.status())));
        }
        Ok(hash)
    }

    /// Releases a pin once this server no longer references an image
    /// (called alongside [`crate::images::ImageManager::gc`]).
    pub async fn pin_rm(&self, hash: ImageHash) -> Result<()> {
        let url = format!("{}/api/v0/pin/rm/{}", self.base_url, hash.to_hex_lower());
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("CAN pin_rm failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!("CAN pin_rm returned {}", response.status())));
        }
        Ok(())
    }
}
