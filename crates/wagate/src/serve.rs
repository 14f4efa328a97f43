// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wagate serve` command implementation.
//!
//! Assembles the full gateway: Redis-backed stores, the webhook delivery
//! engine, the session registry with its transport bridge, the bootstrap
//! resurrector, and the HTTP surface. Supports graceful shutdown via
//! SIGTERM/SIGINT with a hard 10s deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use wagate_config::WagateConfig;
use wagate_core::{GatewayError, Kv};
use wagate_gateway::{start_server, GatewayState};
use wagate_session::{resurrect_sessions, SessionRegistry, SupervisorContext};
use wagate_store::{AuthStore, RedisKv};
use wagate_transport::BridgeTransportFactory;
use wagate_webhook::{EventFilter, EventPublisher, WebhookEngine};

use crate::shutdown;

/// How long shutdown may take before the process force-exits.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// Runs the `wagate serve` command.
pub async fn run_serve(config: WagateConfig) -> Result<(), GatewayError> {
    init_tracing(&config.server.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "starting wagate serve");

    if config.webhook.url.is_none() {
        warn!("WEBHOOK_URL is not set, webhook delivery is disabled");
    }

    // KV service is the only hard dependency; everything session-shaped
    // hangs off it.
    let kv: Arc<dyn Kv> = Arc::new(RedisKv::connect(&config.redis.connection_url()).await?);
    kv.ping().await?;
    let auth_store = AuthStore::new(Arc::clone(&kv));

    let shutdown_token = shutdown::install_signal_handler();

    // Webhook delivery engine; its worker starts once sessions are back.
    let engine = Arc::new(WebhookEngine::new(
        Arc::clone(&kv),
        &config.webhook,
        shutdown_token.child_token(),
    )?);

    // Session machinery.
    let factory = BridgeTransportFactory::new(auth_store.clone(), config.bridge.clone());
    let publisher = EventPublisher::new(EventFilter::new(&config.filter), engine.queue());
    let registry = SessionRegistry::new(SupervisorContext {
        auth_store: auth_store.clone(),
        factory,
        publisher,
        config: config.session.clone(),
    });

    // Re-establish every session with persisted credentials, then start
    // draining the webhook queue.
    resurrect_sessions(&registry, &auth_store).await?;
    let worker_handle = engine.start();

    // HTTP surface; serves until the shutdown token fires.
    let state = GatewayState {
        registry: Arc::clone(&registry),
        engine: Arc::clone(&engine),
        qr_timeout_ms: config.session.qr_timeout_ms,
        start_time: Instant::now(),
    };
    start_server(&config.server, state, shutdown_token.clone()).await?;

    // Drain: stop the worker, disconnect sessions, then let the KV
    // connection drop. Past the deadline the process force-exits.
    info!("shutting down");
    let drain = async {
        engine.stop_processing();
        registry.disconnect_all().await;
        if let Some(handle) = worker_handle {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_DEADLINE, drain).await.is_err() {
        warn!("graceful shutdown exceeded {SHUTDOWN_DEADLINE:?}, forcing exit");
        std::process::exit(1);
    }

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wagate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
