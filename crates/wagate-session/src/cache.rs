// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small TTL maps for per-session ephemeral state.
//!
//! Entries expire lazily on read and can be swept in bulk. This is the
//! only message "history" the gateway keeps; nothing here survives a
//! restart.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, (V, Instant)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, key: K, value: V) {
        self.lock().insert(key, (value, Instant::now() + self.ttl));
    }

    /// Fetch a live entry; expired entries are removed on the way.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Live entry count (sweeps expired entries first).
    pub fn len(&self) -> usize {
        let mut entries = self.lock();
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Snapshot of live values.
    pub fn values(&self) -> Vec<V> {
        let mut entries = self.lock();
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.values().map(|(v, _)| v.clone()).collect()
    }
}
