//! Per-instance mutual exclusion for load-invoke-persist cycles

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<(String, String), Arc<AsyncMutex<()>>>;

/// Lazily created async mutex per (kind, id)
///
/// An entry lives only while some task holds or waits for it.
#[derive(Clone, Default)]
pub struct InstanceLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Exclusive access to one instance; releasing it prunes the unused entry
pub struct InstanceGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: (String, String),
    locks: Arc<Mutex<LockMap>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one instance
    pub async fn acquire(&self, kind: &str, id: &str) -> InstanceGuard {
        let key = (kind.to_string(), id.to_string());
        let lock = lock_map(&self.locks)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        InstanceGuard {
            guard: Some(lock.lock_owned().await),
            key,
            locks: self.locks.clone(),
        }
    }

    /// Number of instances currently held or waited for
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = lock_map(&self.locks);
        // Waiters hold their own clone, so only the map's reference is left
        // once nobody else wants this instance
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
