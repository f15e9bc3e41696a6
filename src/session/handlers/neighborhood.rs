//! Neighborhood synchronization handlers on a `ServerNeighbor`-role
//! session (§4.8). The peer that calls `StartNeighborhoodInitialization`
//! is asking to become our follower: we push a snapshot of our hosted
//! profiles to it as outbound `NeighborhoodSharedProfileUpdate` requests,
//! then record it as a follower. `NeighborhoodSharedProfileUpdate` /
//! `FinishNeighborhoodInitialization` arriving as *inbound* requests are
//! the mirror image: a neighbor pushing its own snapshot to us.

use super::now_unix;
use crate::error::{Error, Result};
use crate::net::role::Role;
use crate::neighborhood::apply::apply_items;
use crate::protocol::{OkPayload, ProfileUpdateItem, Request};
use crate::session::{IdentityState, NeighborhoodInitStatus, Session};
use crate::store::types::Follower;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

/// Profiles per outbound `NeighborhoodSharedProfileUpdate` batch (§4.8).
const BATCH_SIZE: usize = 50;

pub async fn start_initialization<S>(session: &mut Session<S>) -> Result<OkPayload>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    require_server_neighbor(session)?;
    let peer = authenticated_peer(session)?;

    let neighbor = session
        .ctx
        .store
        .get_neighbor(peer)
        .await?
        .ok_or_else(|| Error::Rejected("peer is not a recognized neighbor".into()))?;

    let snapshot = session.ctx.store.all_active_hosted_identities().await?;
    let host_id = session.ctx.identity.network_id;

    for chunk in snapshot.chunks(BATCH_SIZE) {
        let items = chunk
            .iter()
            .map(|identity| ProfileUpdateItem::AddOrChange {
                hosting_server_network_id: host_id,
                network_id: identity.network_id,
                name: identity.name.clone(),
                identity_type: identity.identity_type.clone(),
                location: identity.location,
                extra_data: identity.extra_data.clone(),
                version: identity.version,
                thumbnail_image: identity.thumbnail_image.and_then(|h| session.ctx.images.load(h).ok()),
            })
            .collect();
        session.conn.send_request(Request::NeighborhoodSharedProfileUpdate { items }).await?;
    }
    session.conn.send_request(Request::FinishNeighborhoodInitialization).await?;

    session.ctx.store.create_follower(Follower {
        network_id: peer,
        ip: neighbor.ip,
        primary_port: neighbor.primary_port,
        sr_neighbor_port: neighbor.sr_neighbor_port,
        location: neighbor.location,
        last_refresh_time: Some(now_unix()),
    }).await?;

    session.state.role_ctx.neighborhood_init = NeighborhoodInitStatus::InProgress;
    info!(session = session.id, %peer, sent = snapshot.len(), "pushed neighborhood initialization snapshot");
    Ok(OkPayload::Empty)
}

/// Inbound push of a neighbor's own profile set (AddOrChange/Delete
/// items), applied against our `neighbor_identities` table.
pub async fn shared_profile_update<S>(session: &mut Session<S>, items: &[ProfileUpdateItem]) -> Result<OkPayload> {
    require_server_neighbor(session)?;
    apply_items(&session.ctx.store, &session.ctx.images, items).await?;
    Ok(OkPayload::Empty)
}

pub fn finish_initialization<S>(session: &mut Session<S>) -> Result<OkPayload> {
    require_server_neighbor(session)?;
    session.state.role_ctx.neighborhood_init = NeighborhoodInitStatus::Finished;
    Ok(OkPayload::Empty)
}

/// Either side of the relationship telling the other to stop: removes
/// whichever of Follower/Neighbor rows exist for this peer, releasing any
/// imported identities and their image references (§3, §4.8).
pub async fn stop_updates<S>(session: &mut Session<S>) -> Result<OkPayload> {
    require_server_neighbor(session)?;
    let peer = authenticated_peer(session)?;

    if session.ctx.store.get_follower(peer).await?.is_some() {
        session.ctx.store.delete_follower(peer).await?;
    }
    if session.ctx.store.get_neighbor(peer).await?.is_some() {
        let released = session.ctx.store.delete_all_from_server(peer).await?;
        for hash in released {
            session.ctx.images.remove_reference(hash);
        }
        session.ctx.store.delete_neighbor(peer).await?;
    }
    Ok(OkPayload::Empty)
}

pub async fn refresh_status<S>(session: &mut Session<S>) -> Result<OkPayload> {
    require_server_neighbor(session)?;
    let peer = authenticated_peer(session)?;
    let now = now_unix();

    let mut touched = false;
    if session.ctx.store.get_neighbor(peer).await?.is_some() {
        session.ctx.store.set_neighbor_last_refresh(peer, now).await?;
        touched = true;
    }
    if session.ctx.store.get_follower(peer).await?.is_some() {
        session.ctx.store.set_follower_last_refresh(peer, now).await?;
        touched = true;
    }
    if !touched {
        warn!(session = session.id, %peer, "refresh from a peer with neither a neighbor nor follower record");
    }
    Ok(OkPayload::Empty)
}

fn require_server_neighbor<S>(session: &Session<S>) -> Result<()> {
    if session.role != Role::ServerNeighbor {
        return Err(Error::Unsupported("neighborhood requests are only valid on the server-neighbor role".into()));
    }
    Ok(())
}

fn authenticated_peer<S>(session: &Session<S>) -> Result<crate::common::NetworkId> {
    match session.state.identity {
        IdentityState::Authenticated { network_id, .. } => Ok(network_id),
        IdentityState::Anonymous => Err(Error::ProtocolViolation("not authenticated".into())),
    }
}
