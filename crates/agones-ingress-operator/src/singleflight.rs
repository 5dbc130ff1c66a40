//! Per-identity serialization of pipeline runs
//!
//! Two pipeline runs for the same GameServer must never interleave:
//! each run reads cluster state and writes derived objects, and
//! overlapping runs for one identity can clobber each other. Runs for
//! different identities proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::gameserver::NamespacedName;

/// Keyed async mutexes, one per GameServer identity.
///
/// Locks are created lazily on first use and dropped when no task
/// holds or waits on them, keeping the map bounded by the set of
/// identities with in-flight work.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<NamespacedName, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another run holds it.
    ///
    /// The returned guard is owned so it can cross an await point into
    /// a spawned task.
    pub async fn acquire(&self, key: &NamespacedName) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = lock.lock_owned().await;

        // Drop map entries nobody references anymore. A held or
        // awaited lock is kept alive through its guard's Arc, so an
        // idle entry is the one only the map still points at.
        let mut locks = self.locks.lock().await;
        locks.retain(|_, l| Arc::strong_count(l) > 1);
        guard
    }
}
