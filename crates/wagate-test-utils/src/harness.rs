// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness assembling the full gateway stack on mocks.
//!
//! In-memory KV, mock transport factory, webhook engine, and the session
//! registry, wired exactly like the serve path. Tests drive sessions via
//! the registry and transport controls, and assert on queue contents or
//! a wiremock sink.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wagate_config::{FilterConfig, SessionConfig, WagateConfig, WebhookConfig};
use wagate_core::WebhookJob;
use wagate_session::{resurrect_sessions, SessionRegistry, SupervisorContext};
use wagate_store::{AuthStore, MemoryKv};
use wagate_webhook::{EventFilter, EventPublisher, WebhookEngine, QUEUE_KEY};

use crate::mock_transport::MockTransportFactory;

/// Builder for test environments with configurable stack options.
pub struct TestHarnessBuilder {
    config: WagateConfig,
    persisted: Vec<(String, Value)>,
    start_worker: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = WagateConfig::default();
        // Fast enough for tests driven by real time; paused-clock tests
        // can override back to production values.
        config.session.reconnect_base_delay_ms = 20;
        config.session.reconnect_max_delay_ms = 200;
        config.webhook.retry_delay_ms = 10;
        Self {
            config,
            persisted: Vec::new(),
            start_worker: false,
        }
    }

    /// Point deliveries at a sink (usually a wiremock server) and start
    /// the worker on build.
    pub fn with_sink(mut self, url: &str) -> Self {
        self.config.webhook.url = Some(url.to_string());
        self.start_worker = true;
        self
    }

    /// Configure a sink without running the worker, so tests can assert
    /// on raw queue contents.
    pub fn with_queued_sink(mut self) -> Self {
        self.config.webhook.url = Some("http://sink.invalid/webhook".to_string());
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn with_session_config(mut self, f: impl FnOnce(&mut SessionConfig)) -> Self {
        f(&mut self.config.session);
        self
    }

    pub fn with_webhook_config(mut self, f: impl FnOnce(&mut WebhookConfig)) -> Self {
        f(&mut self.config.webhook);
        self
    }

    /// Seed the KV store with credentials, as if the session had paired
    /// in a previous process life.
    pub fn with_persisted_session(mut self, id: &str, creds: Value) -> Self {
        self.persisted.push((id.to_string(), creds));
        self
    }

    pub async fn build(self) -> TestHarness {
        let kv = Arc::new(MemoryKv::new());
        let auth_store = AuthStore::new(kv.clone());
        for (id, creds) in &self.persisted {
            auth_store
                .save_creds(id, creds)
                .await
                .expect("seeding credentials");
        }

        let cancel = CancellationToken::new();
        let engine = Arc::new(
            WebhookEngine::new(kv.clone(), &self.config.webhook, cancel.clone())
                .expect("webhook engine"),
        );
        let worker_handle = if self.start_worker {
            engine.start()
        } else {
            None
        };

        let factory = MockTransportFactory::new();
        let publisher = EventPublisher::new(EventFilter::new(&self.config.filter), engine.queue());
        let registry = SessionRegistry::new(SupervisorContext {
            auth_store: auth_store.clone(),
            factory: factory.clone(),
            publisher,
            config: self.config.session.clone(),
        });

        TestHarness {
            kv,
            auth_store,
            factory,
            engine,
            registry,
            config: self.config,
            cancel,
            worker_handle,
        }
    }
}

/// A complete gateway stack on mocks.
pub struct TestHarness {
    pub kv: Arc<MemoryKv>,
    pub auth_store: AuthStore,
    pub factory: Arc<MockTransportFactory>,
    pub engine: Arc<WebhookEngine>,
    pub registry: Arc<SessionRegistry>,
    pub config: WagateConfig,
    pub cancel: CancellationToken,
    worker_handle: Option<JoinHandle<()>>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A registered credential document for the given user.
    pub fn valid_creds(user: &str) -> Value {
        json!({
            "me": { "id": format!("{user}@s.whatsapp.net") },
            "registrationId": 1024,
            "registered": true,
        })
    }

    /// Run the bootstrap resurrector against the seeded store.
    pub async fn resurrect(&self) -> usize {
        resurrect_sessions(&self.registry, &self.auth_store)
            .await
            .expect("resurrection")
    }

    /// Jobs currently sitting in the pending queue, head first.
    pub fn queued_jobs(&self) -> Vec<WebhookJob> {
        self.kv
            .list_contents(QUEUE_KEY)
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    /// Poll until `check` passes or the timeout elapses. Works with both
    /// the real and the paused tokio clock.
    pub async fn wait_until(&self, timeout: Duration, mut check: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check() {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("condition not reached within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Let queued supervisor work drain; paused-clock friendly.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.registry.disconnect_all().await;
        if let Some(handle) = self.worker_handle {
            let _ = handle.await;
        }
    }
}
