//! Named per-table locks with globally-ordered acquisition (§4.3, §5, §9).
//!
//! Every unit-of-work names the tables it touches; [`LockSet::acquire`]
//! sorts those names lexicographically and takes the locks in that order,
//! then hands back a guard whose `Drop` releases them in the reverse
//! (LIFO) order — encoding the source's `Array.Sort(Locks)` convention
//! declaratively instead of requiring every call site to get it right.

use std::collections::BTreeMap;
use tokio::sync::{Mutex, MutexGuard};

pub const FOLLOWERS: &str = "followers";
pub const HOSTED_IDENTITIES: &str = "hosted_identities";
pub const NEIGHBOR_IDENTITIES: &str = "neighbor_identities";
pub const NEIGHBORHOOD_ACTIONS: &str = "neighborhood_actions";
pub const NEIGHBORS: &str = "neighbors";
pub const RELATED_IDENTITIES: &str = "related_identities";
pub const SETTINGS: &str = "settings";

pub struct LockSet {
    locks: BTreeMap<&'static str, Mutex<()>>,
}

impl LockSet {
    pub fn new() -> Self {
        let mut locks = BTreeMap::new();
        for name in [
            FOLLOWERS,
            HOSTED_IDENTITIES,
            NEIGHBOR_IDENTITIES,
            NEIGHBORHOOD_ACTIONS,
            NEIGHBORS,
            RELATED_IDENTITIES,
            SETTINGS,
        ] {
            locks.insert(name, Mutex::new(()));
        }
        LockSet { locks }
    }

    /// Acquires the named locks in ascending lexicographic order. Panics
    /// if a caller names a table outside the fixed seven — that is a
    /// programming error, not a runtime condition.
    pub async fn acquire<'a>(&'a self, tables: &[&'static str]) -> UnitOfWorkGuard<'a> {
        let mut names: Vec<&'static str> = tables.to_vec();
        names.sort_unstable();
        names.dedup();

        let mut guards = Vec::with_capacity(names.len());
        for name in &names {
            let mutex = self
                .locks
                .get(name)
                .unwrap_or_else(|| panic!("unknown table lock: {name}"));
            guards.push(mutex.lock().await);
        }
        // Reverse so Vec's natural front-to-back Drop order releases the
        // most-recently-acquired lock first (LIFO).
        guards.reverse();
        UnitOfWorkGuard { _guards: guards }
    }
}

impl Default for LockSet {
    fn default() -> Self {
        Self::new()
    }
}

pub struct UnitOfWorkGuard<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}
