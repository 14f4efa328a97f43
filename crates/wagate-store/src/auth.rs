// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable persistence of per-session auth credentials and signal keys.
//!
//! Keyspace: `wa:<sessionId>:creds` holds the identity document;
//! `wa:<sessionId>:<category>-<keyId>` holds one signal key each. All
//! values are JSON with byte buffers in the tagged base64 encoding, so a
//! session can be resurrected bitwise-identical after a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use wagate_core::{GatewayError, Kv};

use crate::codec::{encode_buffers, tag_bytes};

/// Prefix of every persisted auth key.
pub const KEY_PREFIX: &str = "wa:";

/// Credential material loaded for one session.
#[derive(Debug, Clone)]
pub struct AuthState {
    /// The identity document (tagged-buffer encoding).
    pub creds: Value,
    /// True when no persisted document existed and a fresh one was
    /// initialized; the session will need pairing.
    pub is_fresh: bool,
}

/// Initialize a credential document for a never-paired session.
///
/// The transport fills in the full identity during pairing; until then
/// the document deliberately has no `me.id`, which keeps the session in
/// the unauthenticated states.
pub fn init_creds() -> Value {
    let mut rng = rand::thread_rng();
    let registration_id: u32 = rng.gen_range(1..=16_383);
    let mut adv_secret = [0u8; 32];
    rng.fill(&mut adv_secret);
    json!({
        "registrationId": registration_id,
        "advSecretKey": tag_bytes(&adv_secret),
        "registered": false,
    })
}

/// The authenticated identity, if the document carries one.
pub fn me_id(creds: &Value) -> Option<&str> {
    creds
        .get("me")
        .and_then(|me| me.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Whether the document is usable for an authenticated connection.
pub fn credentials_valid(creds: &Value) -> bool {
    me_id(creds).is_some()
}

/// Store for credential documents and signal keys, one keyspace per
/// session under [`KEY_PREFIX`].
#[derive(Clone)]
pub struct AuthStore {
    kv: Arc<dyn Kv>,
}

impl AuthStore {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    fn creds_key(session_id: &str) -> String {
        format!("{KEY_PREFIX}{session_id}:creds")
    }

    /// Load the persisted credential document, or initialize a fresh one
    /// on first use. The fresh document is not persisted until the first
    /// `save_creds`.
    pub async fn load(&self, session_id: &str) -> Result<AuthState, GatewayError> {
        match self.kv.get(&Self::creds_key(session_id)).await? {
            Some(raw) => {
                let creds: Value = serde_json::from_str(&raw).map_err(GatewayError::store)?;
                Ok(AuthState {
                    creds,
                    is_fresh: false,
                })
            }
            None => {
                debug!(session_id, "no persisted credentials, initializing fresh");
                Ok(AuthState {
                    creds: init_creds(),
                    is_fresh: true,
                })
            }
        }
    }

    /// Persist the credential document atomically (single-key write).
    pub async fn save_creds(&self, session_id: &str, creds: &Value) -> Result<(), GatewayError> {
        let encoded = encode_buffers(creds);
        let raw = serde_json::to_string(&encoded).map_err(GatewayError::store)?;
        self.kv.set(&Self::creds_key(session_id), &raw).await
    }

    /// Handle for this session's signal-key operations.
    pub fn keys(&self, session_id: &str) -> SignalKeys {
        SignalKeys {
            kv: Arc::clone(&self.kv),
            prefix: format!("{KEY_PREFIX}{session_id}:"),
        }
    }

    /// Erase everything persisted for this session (`wa:<id>:*`).
    /// Returns the number of keys removed.
    pub async fn wipe(&self, session_id: &str) -> Result<u64, GatewayError> {
        let keys = self
            .kv
            .scan(&format!("{KEY_PREFIX}{session_id}:*"))
            .await?;
        self.kv.del(&keys).await
    }

    /// Distinct session ids that have any persisted key. Used by the
    /// bootstrap resurrector.
    pub async fn session_ids(&self) -> Result<Vec<String>, GatewayError> {
        static SESSION_KEY: OnceLock<Regex> = OnceLock::new();
        let re = SESSION_KEY
            .get_or_init(|| Regex::new(r"^wa:([^:]+):.+$").expect("static pattern compiles"));

        let keys = self.kv.scan(&format!("{KEY_PREFIX}*")).await?;
        let mut ids: Vec<String> = keys
            .iter()
            .filter_map(|key| re.captures(key))
            .map(|caps| caps[1].to_string())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// Per-category signal-key operations for one session.
///
/// Categories ("pre-key", "session", "sender-key", ...) are opaque to the
/// gateway; each key lands in its own slot so bulk writes stay pipelined
/// and clears never block the service.
#[derive(Clone)]
pub struct SignalKeys {
    kv: Arc<dyn Kv>,
    prefix: String,
}

impl SignalKeys {
    fn slot(&self, category: &str, id: &str) -> String {
        format!("{}{category}-{id}", self.prefix)
    }

    /// Fetch keys by id within a category. Missing ids are absent from
    /// the result.
    pub async fn get(
        &self,
        category: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Value>, GatewayError> {
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(raw) = self.kv.get(&self.slot(category, id)).await? {
                let value: Value = serde_json::from_str(&raw).map_err(GatewayError::store)?;
                out.insert(id.clone(), value);
            }
        }
        Ok(out)
    }

    /// Bulk write in a single pipelined batch. A `None` value deletes
    /// that key.
    pub async fn set(
        &self,
        data: HashMap<String, HashMap<String, Option<Value>>>,
    ) -> Result<(), GatewayError> {
        let mut pairs = Vec::new();
        for (category, entries) in data {
            for (id, value) in entries {
                let slot = self.slot(&category, &id);
                match value {
                    Some(v) => {
                        let raw = serde_json::to_string(&encode_buffers(&v))
                            .map_err(GatewayError::store)?;
                        pairs.push((slot, Some(raw)));
                    }
                    None => pairs.push((slot, None)),
                }
            }
        }
        self.kv.set_many(pairs).await
    }

    /// Delete every key in a category via cursor scan.
    pub async fn clear(&self, category: &str) -> Result<u64, GatewayError> {
        let keys = self
            .kv
            .scan(&format!("{}{category}-*", self.prefix))
            .await?;
        self.kv.del(&keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;

    fn store() -> AuthStore {
        AuthStore::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn load_initializes_fresh_creds_once() {
        let store = store();
        let state = store.load("alpha").await.unwrap();
        assert!(state.is_fresh);
        assert!(!credentials_valid(&state.creds));
        assert!(state.creds.get("registrationId").is_some());
    }

    #[tokio::test]
    async fn load_after_save_is_bitwise_identical() {
        let store = store();
        let creds = json!({
            "me": { "id": "4915551234@s.whatsapp.net" },
            "noiseKey": tag_bytes(&[7u8; 32]),
            "registered": true,
        });
        store.save_creds("alpha", &creds).await.unwrap();

        let state = store.load("alpha").await.unwrap();
        assert!(!state.is_fresh);
        assert_eq!(state.creds, creds);
        assert!(credentials_valid(&state.creds));
    }

    #[tokio::test]
    async fn me_id_requires_non_empty_string() {
        assert_eq!(me_id(&json!({"me": {"id": "x@s.whatsapp.net"}})), Some("x@s.whatsapp.net"));
        assert_eq!(me_id(&json!({"me": {"id": ""}})), None);
        assert_eq!(me_id(&json!({"me": {}})), None);
        assert_eq!(me_id(&json!({})), None);
        assert_eq!(me_id(&json!({"me": {"id": 42}})), None);
    }

    #[tokio::test]
    async fn signal_keys_round_trip_and_clear() {
        let store = store();
        let keys = store.keys("alpha");

        let mut batch: HashMap<String, HashMap<String, Option<Value>>> = HashMap::new();
        batch.insert(
            "pre-key".into(),
            HashMap::from([
                ("1".to_string(), Some(json!({"pub": tag_bytes(&[1u8])}))),
                ("2".to_string(), Some(json!({"pub": tag_bytes(&[2u8])}))),
            ]),
        );
        batch.insert(
            "session".into(),
            HashMap::from([("peer".to_string(), Some(json!({"s": 1})))]),
        );
        keys.set(batch).await.unwrap();

        let got = keys
            .get("pre-key", &["1".into(), "2".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got["1"]["pub"], tag_bytes(&[1u8]));

        assert_eq!(keys.clear("pre-key").await.unwrap(), 2);
        assert!(keys.get("pre-key", &["1".into()]).await.unwrap().is_empty());
        // Other categories untouched.
        assert_eq!(keys.get("session", &["peer".into()]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_with_none_deletes_key() {
        let store = store();
        let keys = store.keys("alpha");
        keys.set(HashMap::from([(
            "app-state".to_string(),
            HashMap::from([("k".to_string(), Some(json!(1)))]),
        )]))
        .await
        .unwrap();
        keys.set(HashMap::from([(
            "app-state".to_string(),
            HashMap::from([("k".to_string(), None)]),
        )]))
        .await
        .unwrap();
        assert!(keys.get("app-state", &["k".into()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wipe_erases_only_this_session() {
        let store = store();
        store.save_creds("alpha", &json!({"a": 1})).await.unwrap();
        store.save_creds("beta", &json!({"b": 2})).await.unwrap();
        store
            .keys("alpha")
            .set(HashMap::from([(
                "pre-key".to_string(),
                HashMap::from([("1".to_string(), Some(json!(1)))]),
            )]))
            .await
            .unwrap();

        let removed = store.wipe("alpha").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.load("alpha").await.unwrap().is_fresh);
        assert!(!store.load("beta").await.unwrap().is_fresh);
    }

    #[tokio::test]
    async fn session_ids_are_distinct_and_sorted() {
        let store = store();
        store.save_creds("beta", &json!({})).await.unwrap();
        store.save_creds("alpha", &json!({})).await.unwrap();
        store
            .keys("alpha")
            .set(HashMap::from([(
                "session".to_string(),
                HashMap::from([("p".to_string(), Some(json!(1)))]),
            )]))
            .await
            .unwrap();

        assert_eq!(store.session_ids().await.unwrap(), vec!["alpha", "beta"]);
    }
}
