//! LOC client (§4.9, §4.10): the location/neighborhood coordinator sidecar
//! that computes which servers are geographic neighbors of this one.
//! Grounded on the teacher's `ConsulDiscovery` HTTP client shape
//! (`networking::discovery::consul`): a `reqwest::Client` with a fixed
//! base URL, JSON responses mapped onto our own row types at the edge.

use crate::common::{Location, NetworkId};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::store::types::Neighbor;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct LocClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LocNeighborEntry {
    network_id: String,
    ip: String,
    primary_port: u16,
    sr_neighbor_port: Option<u16>,
    lat_micro: i64,
    lon_micro: i64,
}

impl LocClient {
    pub fn new(settings: &Settings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        LocClient { http, base_url: format!("http://127.0.0.1:{}", settings.loc_port) }
    }

    /// Fetches the current neighbor set for `network_id` (§4.9). LOC runs
    /// as a local sidecar process, not a remote service, so a connection
    /// failure here is worth logging but never fatal to the server.
    pub async fn get_neighborhood(&self, network_id: NetworkId) -> Result<Vec<Neighbor>> {
        let url = format!("{}/neighborhood/{}", self.base_url, network_id.to_hex());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("LOC request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Network(format!("LOC returned {}", response.status())));
        }

        let entries: Vec<LocNeighborEntry> = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("failed to parse LOC response: {e}")))?;

        entries
            .into_iter()
            .map(|e| {
                Ok(Neighbor {
                    network_id: NetworkId::from_hex(&e.network_id)
                        .ok_or_else(|| Error::Serialization("LOC returned malformed network_id".into()))?,
                    ip: e.ip,
                    primary_port: e.primary_port,
                    sr_neighbor_port: e.sr_neighbor_port,
                    location: Location { lat_micro: e.lat_micro, lon_micro: e.lon_micro },
                    last_refresh_time: None,
                })
            })
            .collect()
    }
}
