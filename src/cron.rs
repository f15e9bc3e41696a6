//! Scheduled Maintenance (C9, §4.9): independent periodic tasks, each on
//! its own start-delay/interval pair, grounded on the teacher's
//! `scheduler`-style background ticker spawned per maintenance concern.

use crate::common::now_unix;
use crate::config::Settings;
use crate::error::Result;
use crate::identity::ServerIdentity;
use crate::images::ImageManager;
use crate::lifecycle::{Component, Shutdown};
use crate::store::types::ActionType;
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

struct Task {
    name: &'static str,
    start_delay: Duration,
    interval: Duration,
}

const TASKS: &[Task] = &[
    Task { name: "check_followers_refresh", start_delay: Duration::from_secs(19), interval: Duration::from_secs(11 * 60) },
    Task { name: "check_expired_hosted_identities", start_delay: Duration::from_secs(59), interval: Duration::from_secs(119 * 60) },
    Task { name: "check_expired_neighbors", start_delay: Duration::from_secs(5 * 60), interval: Duration::from_secs(31 * 60) },
    Task { name: "delete_unused_images", start_delay: Duration::from_secs(200), interval: Duration::from_secs(37 * 60) },
    Task { name: "refresh_loc_data", start_delay: Duration::from_secs(67 * 60), interval: Duration::from_secs(601 * 60) },
];

pub struct Cron {
    settings: Arc<Settings>,
    store: Arc<Store>,
    images: Arc<ImageManager>,
    identity: Arc<ServerIdentity>,
}

impl Cron {
    pub fn new(settings: Arc<Settings>, store: Arc<Store>, images: Arc<ImageManager>, identity: Arc<ServerIdentity>) -> Self {
        Cron { settings, store, images, identity }
    }
}

#[async_trait]
impl Component for Cron {
    fn name(&self) -> &'static str {
        "cron"
    }

    async fn init(&self, shutdown: Shutdown) -> Result<()> {
        for task in TASKS {
            let settings = self.settings.clone();
            let store = self.store.clone();
            let images = self.images.clone();
            let identity = self.identity.clone();
            let shutdown = shutdown.child();
            tokio::spawn(run_task(task, settings, store, images, identity, shutdown));
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

async fn run_task(
    task: &'static Task,
    settings: Arc<Settings>,
    store: Arc<Store>,
    images: Arc<ImageManager>,
    identity: Arc<ServerIdentity>,
    shutdown: Shutdown,
) {
    tokio::select! {
        _ = shutdown.cancelled() => return,
        _ = sleep(task.start_delay) => {}
    }
    loop {
        if let Err(e) = run_once(task.name, &settings, &store, &images, &identity).await {
            warn!(task = task.name, error = %e, "cron task failed");
        }
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(task.interval) => {}
        }
    }
}

async fn run_once(name: &str, settings: &Settings, store: &Store, images: &ImageManager, identity: &ServerIdentity) -> Result<()> {
    match name {
        "check_followers_refresh" => check_followers_refresh(settings, store).await,
        "check_expired_hosted_identities" => check_expired_hosted_identities(store, images).await,
        "check_expired_neighbors" => check_expired_neighbors(settings, store).await,
        "delete_unused_images" => delete_unused_images(settings, images).await,
        "refresh_loc_data" => refresh_loc_data(settings, store, identity).await,
        _ => unreachable!("unknown cron task"),
    }
}

/// Enqueues a `RefreshProfiles` action for every follower whose
/// `last_refresh_time` is older than `follower_refresh_time` (§3, §4.9).
async fn check_followers_refresh(settings: &Settings, store: &Store) -> Result<()> {
    let now = now_unix();
    let threshold = now - settings.follower_refresh_time as i64;
    let followers = store.list_followers().await?;
    let mut enqueued = 0;
    for follower in followers {
        if follower.last_refresh_time.map(|t| t < threshold).unwrap_or(true) {
            store.enqueue_action(follower.network_id, ActionType::RefreshProfiles, now, None, None).await?;
            enqueued += 1;
        }
    }
    if enqueued > 0 {
        info!(enqueued, "cron: queued follower refresh actions");
    }
    Ok(())
}

/// Deletes hosted identities past `ExpirationDate`, releases their image
/// references, and fans out a `RemoveProfile` to every follower (§3, §4.9).
async fn check_expired_hosted_identities(store: &Store, images: &ImageManager) -> Result<()> {
    let now = now_unix();
    let expired = store.expired_hosted_identities(now).await?;
    for identity in expired {
        let Some(removed) = store.delete_hosted_identity(identity.network_id).await? else { continue };
        if let Some(hash) = removed.profile_image {
            images.remove_reference(hash);
        }
        if let Some(hash) = removed.thumbnail_image {
            images.remove_reference(hash);
        }
        let fanned = store.fan_out_to_followers(ActionType::RemoveProfile, removed.network_id, now, None).await?;
        info!(identity = %removed.network_id, fanned, "cron: expired hosted identity");
    }
    Ok(())
}

/// Neighbors that have gone stale beyond `neighbor_profiles_expiration_time`
/// get a `RemoveNeighbor` action queued, unless one is already pending
/// (§3, §4.9).
async fn check_expired_neighbors(settings: &Settings, store: &Store) -> Result<()> {
    let now = now_unix();
    let threshold = now - settings.neighbor_profiles_expiration_time as i64;
    let stale = store.stale_neighbors(threshold).await?;
    for neighbor in stale {
        if store.has_pending_remove_neighbor(neighbor.network_id).await? {
            continue;
        }
        store.enqueue_action(neighbor.network_id, ActionType::RemoveNeighbor, now, None, None).await?;
        info!(neighbor = %neighbor.network_id, "cron: queued stale neighbor removal");
    }
    Ok(())
}

/// Deletes locally unreferenced blobs, then releases the matching CAN pin
/// for each one. A pin_rm failure is logged and otherwise ignored: the
/// local blob is already gone, and a stray remote pin is cleaned up by
/// CAN's own GC, not ours (§4.4, §4.9).
async fn delete_unused_images(settings: &Settings, images: &ImageManager) -> Result<()> {
    let deleted = images.gc(crate::images::GC_BATCH_SIZE);
    if deleted.is_empty() {
        return Ok(());
    }
    let can = crate::external::can::CanClient::new(settings);
    for hash in &deleted {
        if let Err(e) = can.pin_rm(*hash).await {
            warn!(hash = %hash.to_hex_lower(), error = %e, "cron: failed to release CAN pin for deleted image");
        }
    }
    info!(deleted = deleted.len(), "cron: garbage collected unreferenced image blobs");
    Ok(())
}

/// Refreshes the neighbor set from LOC (§4.9, C10).
async fn refresh_loc_data(settings: &Settings, store: &Store, identity: &ServerIdentity) -> Result<()> {
    let loc = crate::external::loc::LocClient::new(settings);
    let neighborhood = loc.get_neighborhood(identity.network_id).await?;
    for neighbor in neighborhood {
        store.upsert_neighbor(neighbor).await?;
    }
    info!("cron: refreshed neighbor set from LOC");
    Ok(())
}
