//! Role definitions for the Role Server Fabric (C5, §4.5, GLOSSARY).
//!
//! A role defines a port, a TLS flag, a keep-alive interval, and an
//! identifier encoded as the high byte of message ids this server
//! generates while acting as the initiator on a connection of that role
//! (outbound neighborhood traffic, server-initiated requests).

use crate::config::Settings;
use crate::protocol::MessageId;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    ServerNeighbor,
    ClientNonCustomer,
    ClientCustomer,
    ClientAppService,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Primary,
        Role::ServerNeighbor,
        Role::ClientNonCustomer,
        Role::ClientCustomer,
        Role::ClientAppService,
    ];

    /// High byte for message ids originated on a connection of this role,
    /// keeping per-role sequences from colliding (§4.5).
    pub fn id_byte(&self) -> u8 {
        match self {
            Role::Primary => 0x01,
            Role::ServerNeighbor => 0x02,
            Role::ClientNonCustomer => 0x03,
            Role::ClientCustomer => 0x04,
            Role::ClientAppService => 0x05,
        }
    }

    pub fn requires_tls(&self) -> bool {
        match self {
            Role::Primary => false,
            Role::ServerNeighbor => true,
            Role::ClientNonCustomer => true,
            Role::ClientCustomer => true,
            Role::ClientAppService => true,
        }
    }

    /// Server-peer and client-peer roles use distinct keep-alive defaults
    /// (§4.5).
    pub fn keep_alive_interval(&self) -> Duration {
        match self {
            Role::Primary => Duration::from_secs(60),
            Role::ServerNeighbor => Duration::from_secs(20),
            Role::ClientNonCustomer | Role::ClientCustomer | Role::ClientAppService => Duration::from_secs(60),
        }
    }

    pub fn allows_unauthenticated_list_roles(&self) -> bool {
        matches!(self, Role::Primary)
    }
}

#[derive(Debug, Clone)]
pub struct RoleConfig {
    pub role: Role,
    pub port: u16,
    pub tls: bool,
    pub keep_alive: Duration,
}

impl RoleConfig {
    pub fn from_settings(settings: &Settings) -> Vec<RoleConfig> {
        vec![
            RoleConfig {
                role: Role::Primary,
                port: settings.primary_interface_port,
                tls: Role::Primary.requires_tls(),
                keep_alive: Role::Primary.keep_alive_interval(),
            },
            RoleConfig {
                role: Role::ServerNeighbor,
                port: settings.server_neighbor_interface_port,
                tls: Role::ServerNeighbor.requires_tls(),
                keep_alive: Role::ServerNeighbor.keep_alive_interval(),
            },
            RoleConfig {
                role: Role::ClientNonCustomer,
                port: settings.client_non_customer_interface_port,
                tls: Role::ClientNonCustomer.requires_tls(),
                keep_alive: Role::ClientNonCustomer.keep_alive_interval(),
            },
            RoleConfig {
                role: Role::ClientCustomer,
                port: settings.client_customer_interface_port,
                tls: Role::ClientCustomer.requires_tls(),
                keep_alive: Role::ClientCustomer.keep_alive_interval(),
            },
            RoleConfig {
                role: Role::ClientAppService,
                port: settings.client_app_service_interface_port,
                tls: Role::ClientAppService.requires_tls(),
                keep_alive: Role::ClientAppService.keep_alive_interval(),
            },
        ]
    }

    /// Two roles may share a port only if their TLS flags agree (§4.5).
    pub fn validate_no_conflicts(configs: &[RoleConfig]) -> crate::error::Result<()> {
        for (i, a) in configs.iter().enumerate() {
            for b in &configs[i + 1..] {
                if a.port == b.port && a.tls != b.tls {
                    return Err(crate::error::Error::Config(format!(
                        "roles {:?} and {:?} share port {} with differing TLS flags",
                        a.role, b.role, a.port
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Generates strictly-increasing per-role message ids whose high byte
/// identifies the role, for server-initiated requests.
pub struct MessageIdGenerator {
    high_byte: u8,
    next: std::sync::atomic::AtomicU32,
}

impl MessageIdGenerator {
    pub fn new(role: Role) -> Self {
        MessageIdGenerator {
            high_byte: role.id_byte(),
            next: std::sync::atomic::AtomicU32::new(1),
        }
    }

    pub fn next_id(&self) -> MessageId {
        let low = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed) & 0x00FF_FFFF;
        ((self.high_byte as u32) << 24) | low
    }
}
