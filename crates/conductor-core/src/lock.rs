//! File Lock Manager (spec §4.A).
//!
//! Maintains a per-path mutex registry. `acquire(path)` returns a
//! deferred-release handle (a tokio `OwnedMutexGuard`, released on drop);
//! concurrent acquisitions of the same path serialize, different paths
//! proceed in parallel. The registry itself is guarded by an outer lock so
//! creating a missing per-path lock is race-free — the same registry
//! pattern as the teacher's coordination layer, which documents at length
//! why a write guard must never be held across an `.await` that could
//! re-acquire the same lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// A held per-path lock. The path is released automatically when this
/// handle is dropped.
pub struct LockHandle {
    _guard: OwnedMutexGuard<()>,
}

/// Per-path mutex registry. Locks are never destroyed once created — the
/// path set is bounded by plan size, so the registry only grows.
#[derive(Default)]
pub struct FileLockManager {
    registry: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileLockManager {
    pub fn new() -> Self {
        FileLockManager::default()
    }

    /// Acquires the exclusive lock for `path`, blocking until available.
    ///
    /// Never holds the registry's outer lock across the inner mutex's
    /// `.await` — the fast path takes only a read lock; the registry is
    /// only write-locked for the brief window needed to insert a missing
    /// entry, and that write guard is dropped before the inner `.lock()`
    /// await begins.
    pub async fn acquire(&self, path: &str) -> LockHandle {
        let per_path = self.get_or_create(path).await;
        let guard = per_path.lock_owned().await;
        LockHandle { _guard: guard }
    }

    async fn get_or_create(&self, path: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.registry.read().await.get(path) {
            return existing.clone();
        }
        let mut write = self.registry.write().await;
        write
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
