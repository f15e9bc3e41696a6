//! Authenticated online client registry (§4.6, §5, §8 invariant 3).
//!
//! A process-wide map `network_id -> session`. Inserting a new entry for
//! an id that already has one closes the previous session before the new
//! one becomes observable; on session end the entry is removed only if it
//! still points to the same session (a stale overwrite must not evict a
//! newer session).

use crate::common::NetworkId;
use dashmap::DashMap;
use tokio::sync::Notify;
use std::sync::Arc;

pub struct OnlineEntry {
    pub session_id: u64,
    /// Triggered to force-close the previous session on replacement
    /// (§4.6, §8: "a close notification before the new session is
    /// observable").
    pub close: Arc<Notify>,
}

#[derive(Default)]
pub struct OnlineRegistry {
    entries: DashMap<NetworkId, OnlineEntry>,
}

impl OnlineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session_id` as the live session for `network_id`. If a
    /// previous session is registered, returns its close notifier so the
    /// caller can wait for/trigger its teardown before treating the new
    /// session as live.
    pub fn insert(&self, network_id: NetworkId, session_id: u64, close: Arc<Notify>) -> Option<Arc<Notify>> {
        let previous = self.entries.insert(network_id, OnlineEntry { session_id, close });
        previous.map(|entry| {
            entry.close.notify_waiters();
            entry.close
        })
    }

    /// Removes the entry only if it still points to `session_id` — an
    /// ended session must never evict a session that replaced it.
    pub fn remove_if_current(&self, network_id: NetworkId, session_id: u64) {
        self.entries.remove_if(&network_id, |_, entry| entry.session_id == session_id);
    }

    pub fn lookup(&self, network_id: NetworkId) -> Option<u64> {
        self.entries.get(&network_id).map(|e| e.session_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
