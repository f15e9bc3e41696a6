//! Neighborhood Action Processor (C8, §4.8, §4.9).
//!
//! Background worker draining the persistent `neighborhood_actions` queue
//! and reflecting each action onto the wire as a request to the target
//! follower or neighbor. Grounded on the teacher's `scheduler`-style
//! poll/claim/execute worker loop, adapted from claiming individual rows
//! to the store's `poll_ready_actions` + per-action `reschedule_action`/
//! `delete_action` pair.

use super::apply::apply_items;
use super::client::{self, NeighborConnection};
use crate::common::now_unix;
use crate::config::Settings;
use crate::error::Result;
use crate::identity::ServerIdentity;
use crate::images::ImageManager;
use crate::lifecycle::{Component, Shutdown};
use crate::protocol::{OkPayload, ProfileUpdateItem, Request, Response};
use crate::store::types::{ActionType, NeighborhoodAction};
use crate::store::Store;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const BASE_BACKOFF_SECS: i64 = 30;
const MAX_BACKOFF_SECS: i64 = 3_600;
const MAX_STRIKES: u32 = 3;

pub struct NeighborhoodProcessor {
    settings: Arc<Settings>,
    store: Arc<Store>,
    images: Arc<ImageManager>,
    identity: Arc<ServerIdentity>,
}

impl NeighborhoodProcessor {
    pub fn new(settings: Arc<Settings>, store: Arc<Store>, images: Arc<ImageManager>, identity: Arc<ServerIdentity>) -> Self {
        NeighborhoodProcessor { settings, store, images, identity }
    }
}

#[async_trait]
impl Component for NeighborhoodProcessor {
    fn name(&self) -> &'static str {
        "neighborhood_processor"
    }

    async fn init(&self, shutdown: Shutdown) -> Result<()> {
        let settings = self.settings.clone();
        let store = self.store.clone();
        let images = self.images.clone();
        let identity = self.identity.clone();
        tokio::spawn(poll_loop(settings, store, images, identity, shutdown));
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

async fn poll_loop(
    settings: Arc<Settings>,
    store: Arc<Store>,
    images: Arc<ImageManager>,
    identity: Arc<ServerIdentity>,
    shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("neighborhood processor observed shutdown");
                return;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let limit = settings.neighborhood_initialization_parallelism * 8;
        let ready = match store.poll_ready_actions(now_unix(), limit).await {
            Ok(actions) => actions,
            Err(e) => {
                warn!(error = %e, "failed to poll neighborhood action queue");
                continue;
            }
        };
        if ready.is_empty() {
            continue;
        }

        // Serialize at most one in-flight action per (server, target
        // identity) pair this round; actions against the same follower for
        // different identities may still run concurrently (§4.8 step 2).
        let mut claimed = HashSet::new();
        let batch: Vec<NeighborhoodAction> =
            ready.into_iter().filter(|a| claimed.insert((a.server_id, a.target_identity_id))).collect();

        let semaphore = Arc::new(Semaphore::new(settings.neighborhood_initialization_parallelism));
        let mut handles = Vec::with_capacity(batch.len());
        for action in batch {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let settings = settings.clone();
            let store = store.clone();
            let images = images.clone();
            let identity = identity.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                execute(action, &settings, &store, &images, &identity).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn execute(action: NeighborhoodAction, settings: &Settings, store: &Store, images: &ImageManager, identity: &ServerIdentity) {
    match run_action(&action, store, images, identity).await {
        Ok(()) => {
            if let Err(e) = store.delete_action(action.id).await {
                warn!(error = %e, action_id = action.id, "failed to delete completed neighborhood action");
            }
        }
        Err(e) => {
            warn!(
                error = %e, action_id = action.id, server = %action.server_id,
                action_type = ?action.action_type, "neighborhood action failed"
            );
            handle_failure(&action, settings, store).await;
        }
    }
}

async fn run_action(action: &NeighborhoodAction, store: &Store, images: &ImageManager, identity: &ServerIdentity) -> Result<()> {
    use crate::error::Error;

    match action.action_type {
        ActionType::AddProfile | ActionType::ChangeProfile | ActionType::RemoveProfile => {
            let Some(follower) = store.get_follower(action.server_id).await? else { return Ok(()) };
            let Some(target) = action.target_identity_id else {
                return Err(Error::Internal("profile action missing target_identity_id".into()));
            };
            let item = if action.action_type == ActionType::RemoveProfile {
                ProfileUpdateItem::Delete { hosting_server_network_id: identity.network_id, network_id: target }
            } else {
                let hosted = store.get_hosted_identity(target).await?.ok_or_else(|| Error::NotFound("hosted identity".into()))?;
                ProfileUpdateItem::AddOrChange {
                    hosting_server_network_id: identity.network_id,
                    network_id: hosted.network_id,
                    name: hosted.name,
                    identity_type: hosted.identity_type,
                    location: hosted.location,
                    extra_data: hosted.extra_data,
                    version: hosted.version,
                    thumbnail_image: hosted.thumbnail_image.and_then(|h| images.load(h).ok()),
                }
            };
            let port = resolve_port(store, action.server_id, true, &follower.ip, follower.primary_port, follower.sr_neighbor_port).await?;
            let mut conn = NeighborConnection::open(&follower.ip, port, identity).await?;
            conn.call(Request::NeighborhoodSharedProfileUpdate { items: vec![item] }).await?;
            Ok(())
        }
        ActionType::RefreshProfiles => {
            let Some(follower) = store.get_follower(action.server_id).await? else { return Ok(()) };
            let port = resolve_port(store, action.server_id, true, &follower.ip, follower.primary_port, follower.sr_neighbor_port).await?;
            let mut conn = NeighborConnection::open(&follower.ip, port, identity).await?;
            conn.call(Request::RefreshNeighborStatus).await?;
            Ok(())
        }
        ActionType::InitializeProfiles => {
            let Some(neighbor) = store.get_neighbor(action.server_id).await? else { return Ok(()) };
            let port = resolve_port(store, action.server_id, false, &neighbor.ip, neighbor.primary_port, neighbor.sr_neighbor_port).await?;
            let mut conn = NeighborConnection::open(&neighbor.ip, port, identity).await?;
            conn.call(Request::StartNeighborhoodInitialization).await?;
            drain_initialization(&mut conn, store, images).await
        }
        ActionType::StopNeighborhoodUpdates => {
            let Some(neighbor) = store.get_neighbor(action.server_id).await? else { return Ok(()) };
            let port = resolve_port(store, action.server_id, false, &neighbor.ip, neighbor.primary_port, neighbor.sr_neighbor_port).await?;
            let mut conn = NeighborConnection::open(&neighbor.ip, port, identity).await?;
            conn.call(Request::StopNeighborhoodUpdates).await?;
            let released = store.delete_all_from_server(action.server_id).await?;
            for hash in released {
                images.remove_reference(hash);
            }
            store.delete_neighbor(action.server_id).await?;
            Ok(())
        }
        ActionType::RemoveNeighbor => {
            // The neighbor is already known to be gone (Cron expiry, §4.9);
            // no point dialing it. Purely local cleanup.
            let released = store.delete_all_from_server(action.server_id).await?;
            for hash in released {
                images.remove_reference(hash);
            }
            store.delete_neighbor(action.server_id).await?;
            store.delete_actions_for_server_except(action.server_id, action.id).await?;
            Ok(())
        }
    }
}

/// Drains a neighbor's snapshot push after we've asked it to initialize
/// us (§4.8): the roles invert and our outbound connection starts
/// receiving `NeighborhoodSharedProfileUpdate` / `FinishNeighborhoodInitialization`
/// requests, which we must ack like any other session would.
async fn drain_initialization(conn: &mut NeighborConnection, store: &Store, images: &ImageManager) -> Result<()> {
    loop {
        let (id, request) = conn.recv_request().await?;
        match request {
            Request::NeighborhoodSharedProfileUpdate { items } => {
                apply_items(store, images, &items).await?;
                conn.reply(id, Response::ok(OkPayload::Empty)).await?;
            }
            Request::FinishNeighborhoodInitialization => {
                conn.reply(id, Response::ok(OkPayload::Empty)).await?;
                return Ok(());
            }
            other => {
                warn!(?other, "unexpected request while draining neighborhood initialization");
                conn.reply(id, Response::error(crate::error::StatusCode::ErrorProtocolViolation)).await?;
                return Err(crate::error::Error::ProtocolViolation("unexpected request mid-initialization".into()));
            }
        }
    }
}

/// Resolves the port to dial for `server_id`, persisting a freshly
/// discovered `sr_neighbor_port` onto the owning row before returning it
/// so future dispatches to the same target skip the discovery round-trip
/// (§4.8 step 3). `is_follower` picks which table owns the row.
async fn resolve_port(
    store: &Store,
    server_id: crate::common::NetworkId,
    is_follower: bool,
    ip: &str,
    primary_port: u16,
    sr_neighbor_port: Option<u16>,
) -> Result<u16> {
    if let Some(port) = sr_neighbor_port {
        return Ok(port);
    }
    let port = client::discover_sr_neighbor_port(ip, primary_port).await?;
    if is_follower {
        store.set_follower_sr_port(server_id, port).await?;
    } else {
        store.set_neighbor_sr_port(server_id, port).await?;
    }
    Ok(port)
}

/// Follower-targeting actions count outstanding `RefreshProfiles` rows for
/// the same server as a proxy strike counter (§3, §4.9): a follower that
/// cannot be reached keeps failing refreshes faster than it can be
/// evicted by any one of them alone. Neighbor-targeting actions (pulling
/// from a neighbor) are retried on a flat backoff instead — neighbor
/// membership is governed by LOC (C10) and Cron (C9), not this queue.
async fn handle_failure(action: &NeighborhoodAction, _settings: &Settings, store: &Store) {
    let now = now_unix();
    if action.action_type.targets_follower() {
        let strikes = store.count_refresh_actions(action.server_id).await.unwrap_or(0);
        if strikes >= MAX_STRIKES {
            warn!(server = %action.server_id, "evicting follower after repeated failed refreshes");
            let _ = store.delete_actions_for_server_except(action.server_id, action.id).await;
            let _ = store.delete_follower(action.server_id).await;
            let _ = store.delete_action(action.id).await;
            return;
        }
        if let Err(e) = store.reschedule_action(action.id, now + backoff_secs(strikes)).await {
            warn!(error = %e, "failed to reschedule neighborhood action");
        }
        return;
    }
    if let Err(e) = store.reschedule_action(action.id, now + BASE_BACKOFF_SECS).await {
        warn!(error = %e, "failed to reschedule neighborhood action");
    }
}

fn backoff_secs(strikes: u32) -> i64 {
    let scaled = BASE_BACKOFF_SECS.saturating_mul(1i64 << strikes.min(6));
    scaled.min(MAX_BACKOFF_SECS)
}
