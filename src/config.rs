//! Configuration Store (C2, §4.2, §6).
//!
//! Loads and validates the declarative configuration surface. Mirrors the
//! teacher's `common::DatabaseConfig` in shape (a flat, serde-derived
//! settings struct with grouped fields) but validates semantically instead
//! of just deserializing.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub test_mode: bool,

    pub external_server_address: String,
    pub bind_to_interface: String,

    pub primary_interface_port: u16,
    pub server_neighbor_interface_port: u16,
    pub client_non_customer_interface_port: u16,
    pub client_customer_interface_port: u16,
    pub client_app_service_interface_port: u16,

    pub tls_server_certificate: PathBuf,

    pub image_data_folder: PathBuf,
    pub tmp_data_folder: PathBuf,

    pub max_hosted_identities: u32,
    pub max_identity_relations: u32,

    pub neighborhood_initialization_parallelism: usize,

    pub loc_port: u16,
    pub can_api_port: u16,

    pub neighbor_profiles_expiration_time: u64,
    pub follower_refresh_time: u64,

    pub max_neighborhood_size: u32,
    pub max_follower_servers_count: u32,

    pub hosting_grace_period_secs: u64,
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            test_mode: false,
            external_server_address: "0.0.0.0".to_string(),
            bind_to_interface: "0.0.0.0".to_string(),
            primary_interface_port: 16980,
            server_neighbor_interface_port: 16981,
            client_non_customer_interface_port: 16982,
            client_customer_interface_port: 16983,
            client_app_service_interface_port: 16984,
            tls_server_certificate: PathBuf::from("server.pem"),
            image_data_folder: PathBuf::from("images"),
            tmp_data_folder: PathBuf::from("tmp"),
            max_hosted_identities: 10_000,
            max_identity_relations: 100,
            neighborhood_initialization_parallelism: 2,
            loc_port: 16987,
            can_api_port: 5001,
            neighbor_profiles_expiration_time: 86_400,
            follower_refresh_time: 3_600,
            max_neighborhood_size: 100,
            max_follower_servers_count: 200,
            hosting_grace_period_secs: 180,
            data_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let settings = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            Settings::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic + syntactic validation (§4.2): non-conflicting ports, a
    /// loadable TLS certificate, external address not in reserved ranges
    /// unless `test_mode`, and numeric bounds on size/time limits.
    pub fn validate(&self) -> Result<()> {
        let ports = [
            self.primary_interface_port,
            self.server_neighbor_interface_port,
            self.client_non_customer_interface_port,
            self.client_customer_interface_port,
            self.client_app_service_interface_port,
        ];
        // Roles may only share a port when their TLS flags agree; since
        // all role TLS flags are fixed by the role itself (see `net::role`),
        // here we only forbid accidental duplicate *distinct* ports that
        // were meant to be distinct listeners sharing nothing.
        for (i, a) in ports.iter().enumerate() {
            for b in &ports[i + 1..] {
                if a == b {
                    return Err(Error::Config(format!("duplicate role port {a}")));
                }
            }
        }

        if !self.test_mode {
            let addr: IpAddr = self
                .external_server_address
                .parse()
                .map_err(|_| Error::Config("external_server_address is not a valid IP".into()))?;
            if is_reserved(&addr) {
                return Err(Error::Config(
                    "external_server_address is in a reserved range; set test_mode to allow".into(),
                ));
            }
        }

        if self.tls_server_certificate.as_os_str().is_empty() {
            return Err(Error::Config("tls_server_certificate must be set".into()));
        }

        if self.max_hosted_identities == 0 {
            return Err(Error::Config("max_hosted_identities must be > 0".into()));
        }
        if self.neighborhood_initialization_parallelism == 0 {
            return Err(Error::Config("neighborhood_initialization_parallelism must be > 0".into()));
        }
        if self.follower_refresh_time >= self.neighbor_profiles_expiration_time {
            return Err(Error::Config(
                "follower_refresh_time must be strictly less than neighbor_profiles_expiration_time".into(),
            ));
        }

        Ok(())
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.follower_refresh_time)
    }

    pub fn expiry_threshold(&self) -> Duration {
        Duration::from_secs(self.neighbor_profiles_expiration_time)
    }

    pub fn hosting_grace_period(&self) -> Duration {
        Duration::from_secs(self.hosting_grace_period_secs)
    }
}

fn is_reserved(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_unspecified() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
