//! Keyed Lock
//!
//! Mutual exclusion per string key. Reconciliation of one load balancer
//! must not interleave with another pass on the same name, while passes on
//! different names run freely.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock state for one key. Entries are created on first use and never
/// removed.
struct KeySlot {
    mutex: Arc<Mutex<()>>,
    /// Guard of the current holder, if any
    held: Option<OwnedMutexGuard<()>>,
}

impl KeySlot {
    fn new() -> Self {
        Self {
            mutex: Arc::new(Mutex::new(())),
            held: None,
        }
    }
}

/// Registry of per-key mutexes.
///
/// `lock` and `unlock` are split so the lock can be released from a
/// different call site than the one that took it. Prefer [`KeyedLock::scoped`]
/// where a single scope owns the critical section.
pub struct KeyedLock {
    slots: DashMap<String, KeySlot>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Wait until `key` is free, then hold it.
    pub async fn lock(&self, key: &str) {
        // The map guard is dropped before awaiting
        let mutex = self
            .slots
            .entry(key.to_string())
            .or_insert_with(KeySlot::new)
            .mutex
            .clone();

        let guard = mutex.lock_owned().await;

        self.slots
            .entry(key.to_string())
            .or_insert_with(KeySlot::new)
            .held = Some(guard);
        tracing::trace!("locked key {}", key);
    }

    /// Release `key`.
    ///
    /// # Panics
    ///
    /// Unlocking a key that was never locked, or one that is not currently
    /// held, is a programming error and panics.
    pub fn unlock(&self, key: &str) {
        let guard = match self.slots.get_mut(key) {
            Some(mut slot) => slot.held.take(),
            None => panic!("unlock of unknown key lock {}", key),
        };

        match guard {
            Some(guard) => drop(guard),
            None => panic!("unlock of unlocked key lock {}", key),
        }
        tracing::trace!("unlocked key {}", key);
    }

    /// Lock `key` and release it when the returned guard is dropped.
    pub async fn scoped(&self, key: &str) -> KeyLockGuard<'_> {
        self.lock(key).await;
        KeyLockGuard {
            locks: self,
            key: key.to_string(),
        }
    }

    /// Number of keys ever locked.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for KeyedLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a key until dropped.
pub struct KeyLockGuard<'a> {
    locks: &'a KeyedLock,
    key: String,
}

impl KeyLockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.unlock(&self.key);
    }
}
