//! Shared identifiers and value types used across the store, session and
//! neighborhood layers. Grounded on the teacher's `common::` module, which
//! plays the same "shared vocabulary" role for its storage/network code.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// `SHA256(PublicKey)` for an identity or a server (§3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub [u8; 32]);

impl NetworkId {
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(public_key);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        NetworkId(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(NetworkId(out))
    }
}

impl fmt::Debug for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// `SHA256(image_bytes)` (§3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageHash(pub [u8; 32]);

impl ImageHash {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        ImageHash(out)
    }

    pub fn to_hex_lower(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_hex_upper(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageHash({})", &self.to_hex_lower()[..12])
    }
}

/// Fixed-precision decimal degrees location. Stored as micro-degrees
/// (`1e-6` degree units) to keep it an exact integer on the wire and in
/// the store, matching the "fixed-precision decimal" requirement in §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub lat_micro: i64,
    pub lon_micro: i64,
}

impl Location {
    pub const MICRO: f64 = 1_000_000.0;

    pub fn new(lat: f64, lon: f64) -> Self {
        Location {
            lat_micro: (lat * Self::MICRO).round() as i64,
            lon_micro: (lon * Self::MICRO).round() as i64,
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat_micro as f64 / Self::MICRO
    }

    pub fn lon(&self) -> f64 {
        self.lon_micro as f64 / Self::MICRO
    }

    pub fn is_valid(&self) -> bool {
        let lat = self.lat();
        let lon = self.lon();
        (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
    }
}

/// Semantic version; `0.0.0` marks an uninitialized registration (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const UNINITIALIZED: Version = Version { major: 0, minor: 0, patch: 0 };

    pub fn is_uninitialized(&self) -> bool {
        *self == Self::UNINITIALIZED
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Current wall-clock time as a Unix timestamp, the time base for
/// expiration/refresh bookkeeping across the store and neighborhood layers.
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Component lifecycle health, mirrored from the teacher's `common::HealthStatus`
/// and used by [`crate::lifecycle`] to report readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}
