// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use wagate_config::ServerConfig;
use wagate_core::GatewayError;
use wagate_session::SessionRegistry;
use wagate_webhook::WebhookEngine;

use crate::auth::{api_key_middleware, ApiKeyConfig};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub engine: Arc<WebhookEngine>,
    /// Pairing string lifetime, used to compute `expiresAt`.
    pub qr_timeout_ms: u64,
    /// Process start time for uptime reporting.
    pub start_time: Instant,
}

/// Build the full route tree.
pub fn build_router(state: GatewayState, auth: ApiKeyConfig) -> Router {
    // Unauthenticated health endpoint for probes.
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{id}/init", post(handlers::init_session))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/sessions/{id}/qr", get(handlers::get_session_qr))
        .route("/sessions/{id}/restart", post(handlers::restart_session))
        .route("/sessions/{id}/logout", post(handlers::logout_session))
        .route("/sessions/{id}/messages", post(handlers::send_message))
        .route("/sessions/{id}/messages/read", post(handlers::mark_read))
        .route("/sessions/{id}/pairing-code", post(handlers::pairing_code))
        .route("/webhooks/stats", get(handlers::webhook_stats))
        .route("/webhooks/retry", post(handlers::webhook_retry))
        .route_layer(axum_middleware::from_fn_with_state(
            auth,
            api_key_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the shutdown token fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), GatewayError> {
    let auth = ApiKeyConfig {
        api_key: config.api_key.clone(),
    };
    let app = build_router(state, auth);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| GatewayError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
