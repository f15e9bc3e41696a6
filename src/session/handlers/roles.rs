//! `ListRoles` (§4.5, §6): advertises the role ports this server answers
//! on, so a peer that only knows our primary port can discover the rest.

use crate::error::{Error, Result};
use crate::net::role::Role;
use crate::protocol::OkPayload;
use crate::session::{IdentityState, Session};

pub fn list_roles<S>(session: &Session<S>) -> Result<OkPayload> {
    if !session.role.allows_unauthenticated_list_roles() {
        if matches!(session.state.identity, IdentityState::Anonymous) {
            return Err(Error::ProtocolViolation("ListRoles requires authentication on this role".into()));
        }
    }

    let roles = Role::ALL.iter().map(|r| format!("{r:?}")).collect();
    Ok(OkPayload::Roles {
        roles,
        external_address: session.ctx.settings.external_server_address.clone(),
        primary_port: session.ctx.settings.primary_interface_port,
        sr_neighbor_port: Some(session.ctx.settings.server_neighbor_interface_port),
    })
}
