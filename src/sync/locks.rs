// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Keyed async mutual exclusion.
//!
//! At most one holder per key. Entries are created on first use and removed
//! when the last interested party lets go, so the map only holds keys that
//! are locked or being waited on.

use std::hash::Hash;
use std::sync::Arc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { locks: DashMap::new() }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it.
    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        // Clone out of the map before awaiting so no shard lock is held.
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            owner: self,
            key,
            guard: Some(guard),
        }
    }

    /// Take `key` only if nobody holds it.
    pub fn try_lock(&self, key: K) -> Option<KeyGuard<'_, K>> {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        match mutex.try_lock_owned() {
            Ok(guard) => Some(KeyGuard {
                owner: self,
                key,
                guard: Some(guard),
            }),
            // The failed attempt consumed our Arc, leaving the holder's and the map's.
            Err(_) => {
                self.prune(&key);
                None
            }
        }
    }

    /// Keys currently held or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn prune(&self, key: &K) {
        self.locks.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Holds one key until dropped.
pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        // Release the mutex (and its Arc) first so the count check sees only the map.
        self.guard.take();
        self.owner.prune(&self.key);
    }
}
