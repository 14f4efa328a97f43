// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of the [`Kv`] trait.
//!
//! Used by tests and local development without a running KV service.
//! Lists share the Redis orientation: index 0 is the head, pushes go to
//! the head, pops come from the tail.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use wagate_core::{GatewayError, Kv};

#[derive(Default)]
struct Inner {
    strings: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
}

/// A process-local KV store with the same observable semantics as the
/// Redis adapter.
#[derive(Default)]
pub struct MemoryKv {
    inner: Mutex<Inner>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens if a holder panicked; propagating
        // the inner state is still sound for tests.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of a list, head first. Test helper.
    pub fn list_contents(&self, list: &str) -> Vec<String> {
        self.lock()
            .lists
            .get(list)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Match a Redis-style glob pattern (only `*` is supported, which covers
/// every pattern the gateway issues).
fn glob_match(pattern: &str, input: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == input;
    }
    let mut rest = input;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    // Pattern ended with `*`, which matches any remainder.
    true
}

#[async_trait]
impl Kv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        self.lock().strings.insert(key.into(), value.into());
        Ok(())
    }

    async fn set_many(&self, pairs: Vec<(String, Option<String>)>) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        for (key, value) in pairs {
            match value {
                Some(v) => {
                    inner.strings.insert(key, v);
                }
                None => {
                    inner.strings.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, GatewayError> {
        let mut inner = self.lock();
        let mut removed = 0;
        for key in keys {
            if inner.strings.remove(key).is_some() || inner.lists.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, GatewayError> {
        let inner = self.lock();
        Ok(inner
            .strings
            .keys()
            .chain(inner.lists.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    async fn lpush(&self, list: &str, value: &str) -> Result<u64, GatewayError> {
        let mut inner = self.lock();
        let entry = inner.lists.entry(list.into()).or_default();
        entry.push_front(value.into());
        Ok(entry.len() as u64)
    }

    async fn rpop(&self, list: &str) -> Result<Option<String>, GatewayError> {
        Ok(self
            .lock()
            .lists
            .get_mut(list)
            .and_then(|l| l.pop_back()))
    }

    async fn rpoplpush(&self, src: &str, dst: &str) -> Result<Option<String>, GatewayError> {
        let mut inner = self.lock();
        let Some(value) = inner.lists.get_mut(src).and_then(|l| l.pop_back()) else {
            return Ok(None);
        };
        inner
            .lists
            .entry(dst.into())
            .or_default()
            .push_front(value.clone());
        Ok(Some(value))
    }

    async fn lrem(&self, list: &str, value: &str) -> Result<u64, GatewayError> {
        let mut inner = self.lock();
        let Some(entries) = inner.lists.get_mut(list) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|v| v != value);
        Ok((before - entries.len()) as u64)
    }

    async fn llen(&self, list: &str) -> Result<u64, GatewayError> {
        Ok(self.lock().lists.get(list).map_or(0, |l| l.len() as u64))
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_ops() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a").await.unwrap(), None);
        kv.set("a", "1").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(kv.del(&["a".into(), "missing".into()]).await.unwrap(), 1);
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_many_writes_and_deletes() {
        let kv = MemoryKv::new();
        kv.set("drop-me", "x").await.unwrap();
        kv.set_many(vec![
            ("k1".into(), Some("v1".into())),
            ("drop-me".into(), None),
        ])
        .await
        .unwrap();
        assert_eq!(kv.get("k1").await.unwrap().as_deref(), Some("v1"));
        assert_eq!(kv.get("drop-me").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_ops_preserve_fifo_order() {
        let kv = MemoryKv::new();
        kv.lpush("q", "first").await.unwrap();
        kv.lpush("q", "second").await.unwrap();
        kv.lpush("q", "third").await.unwrap();
        assert_eq!(kv.llen("q").await.unwrap(), 3);

        // Oldest push comes off the tail first.
        assert_eq!(kv.rpop("q").await.unwrap().as_deref(), Some("first"));
        assert_eq!(
            kv.rpoplpush("q", "p").await.unwrap().as_deref(),
            Some("second")
        );
        assert_eq!(kv.list_contents("p"), vec!["second"]);
        assert_eq!(kv.lrem("p", "second").await.unwrap(), 1);
        assert_eq!(kv.llen("p").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scan_matches_globs() {
        let kv = MemoryKv::new();
        kv.set("wa:alpha:creds", "{}").await.unwrap();
        kv.set("wa:alpha:pre-key-1", "{}").await.unwrap();
        kv.set("wa:beta:creds", "{}").await.unwrap();
        kv.set("other", "{}").await.unwrap();

        let mut all = kv.scan("wa:*").await.unwrap();
        all.sort();
        assert_eq!(
            all,
            vec!["wa:alpha:creds", "wa:alpha:pre-key-1", "wa:beta:creds"]
        );

        let alpha = kv.scan("wa:alpha:pre-key-*").await.unwrap();
        assert_eq!(alpha, vec!["wa:alpha:pre-key-1"]);
    }

    #[test]
    fn glob_edge_cases() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(glob_match("a*c", "abc"));
        assert!(glob_match("a*c", "ac"));
        assert!(!glob_match("a*c", "ab"));
        assert!(glob_match("*tail", "long-tail"));
    }
}
