//! Row types for the seven tables of §3.

use crate::common::{ImageHash, Location, NetworkId, Version};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct HostedIdentity {
    pub network_id: NetworkId,
    pub public_key: [u8; 32],
    pub name: String,
    pub identity_type: String,
    pub location: Location,
    pub extra_data: String,
    pub version: Version,
    pub profile_image: Option<ImageHash>,
    pub thumbnail_image: Option<ImageHash>,
    pub initialized: bool,
    pub cancelled: bool,
    /// Null while an active session exists (§3).
    pub expiration_date: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NeighborIdentity {
    pub hosting_server_network_id: NetworkId,
    pub network_id: NetworkId,
    pub name: String,
    pub identity_type: String,
    pub location: Location,
    pub extra_data: String,
    pub version: Version,
    pub thumbnail_image: Option<ImageHash>,
}

#[derive(Debug, Clone)]
pub struct RelatedIdentity {
    pub identity_id: NetworkId,
    pub application_id: String,
    pub related_to_identity_id: NetworkId,
    pub relation_type: String,
    pub valid_from: i64,
    pub valid_to: i64,
    pub signed_card: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Neighbor {
    pub network_id: NetworkId,
    pub ip: String,
    pub primary_port: u16,
    pub sr_neighbor_port: Option<u16>,
    pub location: Location,
    pub last_refresh_time: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Follower {
    pub network_id: NetworkId,
    pub ip: String,
    pub primary_port: u16,
    pub sr_neighbor_port: Option<u16>,
    pub location: Location,
    pub last_refresh_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    AddProfile,
    ChangeProfile,
    RemoveProfile,
    RefreshProfiles,
    InitializeProfiles,
    StopNeighborhoodUpdates,
    RemoveNeighbor,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AddProfile => "AddProfile",
            ActionType::ChangeProfile => "ChangeProfile",
            ActionType::RemoveProfile => "RemoveProfile",
            ActionType::RefreshProfiles => "RefreshProfiles",
            ActionType::InitializeProfiles => "InitializeProfiles",
            ActionType::StopNeighborhoodUpdates => "StopNeighborhoodUpdates",
            ActionType::RemoveNeighbor => "RemoveNeighbor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "AddProfile" => ActionType::AddProfile,
            "ChangeProfile" => ActionType::ChangeProfile,
            "RemoveProfile" => ActionType::RemoveProfile,
            "RefreshProfiles" => ActionType::RefreshProfiles,
            "InitializeProfiles" => ActionType::InitializeProfiles,
            "StopNeighborhoodUpdates" => ActionType::StopNeighborhoodUpdates,
            "RemoveNeighbor" => ActionType::RemoveNeighbor,
            _ => return None,
        })
    }

    /// Profile-propagation actions target a Follower; the rest target a
    /// Neighbor (invariant, §3).
    pub fn targets_follower(&self) -> bool {
        matches!(
            self,
            ActionType::AddProfile | ActionType::ChangeProfile | ActionType::RemoveProfile | ActionType::RefreshProfiles
        )
    }
}

#[derive(Debug, Clone)]
pub struct NeighborhoodAction {
    pub id: i64,
    pub server_id: NetworkId,
    pub action_type: ActionType,
    pub timestamp: i64,
    pub execute_after: Option<i64>,
    pub target_identity_id: Option<NetworkId>,
    pub additional_data: Option<String>,
}
