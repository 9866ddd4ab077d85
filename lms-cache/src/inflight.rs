//! Per-key refresh guards.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use lms_core::CacheKey;

type Slot = Arc<Mutex<()>>;

/// At most one refresh per key at a time.
///
/// Slots are created on demand and dropped by the last guard to leave.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    slots: DashMap<CacheKey, Slot>,
}

impl InFlight {
    fn slot(&self, key: &CacheKey) -> Slot {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Waits until no other refresh holds `key`.
    pub(crate) async fn acquire(self: &Arc<Self>, key: &CacheKey) -> KeyGuard {
        let held = self.slot(key).lock_owned().await;
        self.guard(key, held)
    }

    /// Claims `key` if nobody holds it.
    pub(crate) fn try_acquire(self: &Arc<Self>, key: &CacheKey) -> Option<KeyGuard> {
        let held = self.slot(key).try_lock_owned().ok()?;
        Some(self.guard(key, held))
    }

    fn guard(self: &Arc<Self>, key: &CacheKey, held: OwnedMutexGuard<()>) -> KeyGuard {
        KeyGuard {
            owner: Arc::clone(self),
            key: key.clone(),
            held: Some(held),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Holds a key's slot; releases it and prunes the slot on drop.
#[derive(Debug)]
pub(crate) struct KeyGuard {
    owner: Arc<InFlight>,
    key: CacheKey,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.held.take());
        // Waiters hold their own clone of the slot, so it survives for them.
        self.owner
            .slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
