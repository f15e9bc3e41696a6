//! Wire message set (§6).
//!
//! The codec (length-prefixed framing over a serialized `Message`) is
//! treated as an external collaborator per §1; this module defines the
//! concrete shape of that serialized payload so the rest of the crate has
//! something to compile and dispatch against. Grounded on the teacher's
//! `network::protocol::{Request, Response}` split — a flat, serde- and
//! bincode-derived enum per direction.

use crate::common::{ImageHash, Location, NetworkId, Version};
use crate::error::StatusCode;
use serde::{Deserialize, Serialize};

/// Every message carries a 32-bit id that the receiver echoes (§4.6, §6).
pub type MessageId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: MessageId,
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    StartConversation { challenge_from_client: [u8; 32] },
    VerifyIdentity { signature: Vec<u8> },

    RegisterHosting { public_key: [u8; 32] },
    CheckIn { public_key: [u8; 32], signature: Vec<u8> },

    UpdateProfile(UpdateProfileRequest),
    CancelHostingAgreement,

    ListRoles,
    GetIdentityInformation { network_id: NetworkId },
    ProfileSearch(ProfileSearchRequest),

    ApplicationServiceAdd { service_name: String },

    StartNeighborhoodInitialization,
    NeighborhoodSharedProfileUpdate { items: Vec<ProfileUpdateItem> },
    FinishNeighborhoodInitialization,
    StopNeighborhoodUpdates,
    RefreshNeighborStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub identity_type: String,
    pub location: Location,
    pub extra_data: String,
    pub version: Version,
    pub profile_image: Option<Vec<u8>>,
    pub thumbnail_image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSearchRequest {
    pub offset: u32,
    pub max_results: u32,
    pub type_filter: String,
    pub name_filter: String,
    pub location_filter: Option<LocationFilter>,
    pub extra_data_regex: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationFilter {
    pub center: Location,
    pub radius_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProfileUpdateItem {
    AddOrChange {
        hosting_server_network_id: NetworkId,
        network_id: NetworkId,
        name: String,
        identity_type: String,
        location: Location,
        extra_data: String,
        version: Version,
        thumbnail_image: Option<Vec<u8>>,
    },
    Delete {
        hosting_server_network_id: NetworkId,
        network_id: NetworkId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ok(OkPayload),
    Error(WireStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OkPayload {
    Empty,
    StartConversationAck {
        server_public_key: [u8; 32],
        challenge_from_server: [u8; 32],
        signature_of_client_challenge: Vec<u8>,
    },
    IdentityInformation {
        network_id: NetworkId,
        name: String,
        identity_type: String,
        location: Location,
        extra_data: String,
        version: Version,
        profile_image: Option<Vec<u8>>,
        thumbnail_image: Option<Vec<u8>>,
    },
    SearchResults {
        results: Vec<SearchResultItem>,
    },
    Roles {
        roles: Vec<String>,
        external_address: String,
        primary_port: u16,
        sr_neighbor_port: Option<u16>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub network_id: NetworkId,
    pub name: String,
    pub identity_type: String,
    pub location: Location,
    pub thumbnail_image: Option<ImageHash>,
}

/// Wire-compatible mirror of [`crate::error::StatusCode`]; kept distinct
/// because the status code travels over the network while `StatusCode`
/// is the in-process error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireStatus {
    ErrorProtocolViolation,
    ErrorUnsupported,
    ErrorInvalidSignature,
    ErrorInvalidValue,
    ErrorBusy,
    ErrorRejected,
    ErrorNotFound,
    ErrorInternal,
}

impl From<StatusCode> for WireStatus {
    fn from(s: StatusCode) -> Self {
        match s {
            StatusCode::Ok => unreachable!("Ok does not map to an error status"),
            StatusCode::ErrorProtocolViolation => WireStatus::ErrorProtocolViolation,
            StatusCode::ErrorUnsupported => WireStatus::ErrorUnsupported,
            StatusCode::ErrorInvalidSignature => WireStatus::ErrorInvalidSignature,
            StatusCode::ErrorInvalidValue => WireStatus::ErrorInvalidValue,
            StatusCode::ErrorBusy => WireStatus::ErrorBusy,
            StatusCode::ErrorRejected => WireStatus::ErrorRejected,
            StatusCode::ErrorNotFound => WireStatus::ErrorNotFound,
            StatusCode::ErrorInternal => WireStatus::ErrorInternal,
        }
    }
}

impl Response {
    pub fn ok(payload: OkPayload) -> Self {
        Response::Ok(payload)
    }

    pub fn error(status: crate::error::StatusCode) -> Self {
        Response::Error(status.into())
    }
}
