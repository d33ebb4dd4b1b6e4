use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// In-process per-resource locks.
///
/// Every state-machine transition and every restoration step acquires the
/// resource's lock before its first read and holds it through commit, so two
/// concurrent transitions cannot both pass the same precondition check.
/// Correct for a single writer process; a multi-node deployment would use
/// row-level `SELECT ... FOR UPDATE` instead.
#[derive(Debug, Default, Clone)]
pub struct ResourceLockRegistry {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ResourceLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one resource, waiting if another operation
    /// holds it. The guard releases on drop and evicts the registry entry
    /// once no other operation is waiting on it, so the map stays bounded
    /// by the number of in-flight operations.
    pub async fn acquire(&self, resource_id: Uuid) -> ResourceLockGuard {
        let lock = self
            .locks
            .entry(resource_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.lock_owned().await;

        ResourceLockGuard {
            resource_id,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }
}

/// Held lock on one resource. Dropping it releases the lock and removes the
/// registry entry when nothing else references it.
pub struct ResourceLockGuard {
    resource_id: Uuid,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ResourceLockGuard {
    fn drop(&mut self) {
        // Release before the eviction check, or our own guard's clone of the
        // Arc would keep the count above one. remove_if runs under the shard
        // lock, so a concurrent acquire either clones the Arc first (count
        // > 1, entry stays) or inserts a fresh entry after removal.
        self.guard.take();
        self.locks
            .remove_if(&self.resource_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
