// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface for the wagate gateway: session lifecycle routes,
//! outbound message routes, and webhook admin, with optional API-key
//! auth and permissive CORS.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::ApiKeyConfig;
pub use server::{build_router, start_server, GatewayState};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use tokio_util::sync::CancellationToken;
    use wagate_test_utils::TestHarness;

    use super::*;

    async fn spawn_gateway(
        harness: &TestHarness,
        api_key: Option<String>,
    ) -> (String, CancellationToken) {
        let state = GatewayState {
            registry: Arc::clone(&harness.registry),
            engine: Arc::clone(&harness.engine),
            qr_timeout_ms: harness.config.session.qr_timeout_ms,
            start_time: Instant::now(),
        };
        let app = build_router(state, ApiKeyConfig { api_key });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
                .unwrap();
        });
        (format!("http://{addr}"), shutdown)
    }

    #[tokio::test]
    async fn empty_registry_lists_zero_sessions() {
        let harness = TestHarness::builder().build().await;
        let (base, shutdown) = spawn_gateway(&harness, None).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/sessions"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["count"], 0);
        assert_eq!(body["sessions"], serde_json::json!([]));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn init_then_get_session_round_trip() {
        let harness = TestHarness::builder().build().await;
        let (base, shutdown) = spawn_gateway(&harness, None).await;
        let client = reqwest::Client::new();

        let init: serde_json::Value = client
            .post(format!("{base}/sessions/alpha/init"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(init["id"], "alpha");
        let status = init["status"].as_str().unwrap();
        assert!(status == "init" || status == "connecting", "got {status}");

        let view: serde_json::Value = client
            .get(format!("{base}/sessions/alpha"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(view["id"], "alpha");
        assert!(view.get("actualStatus").is_some());
        assert!(view.get("wsState").is_some());
        assert!(view.get("baileyStatus").is_some());

        shutdown.cancel();
    }

    #[tokio::test]
    async fn unknown_session_is_404_and_bad_id_is_400() {
        let harness = TestHarness::builder().build().await;
        let (base, shutdown) = spawn_gateway(&harness, None).await;
        let client = reqwest::Client::new();

        let missing = client
            .get(format!("{base}/sessions/ghost"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);

        let invalid = client
            .post(format!("{base}/sessions/bad%20id/init"))
            .send()
            .await
            .unwrap();
        assert_eq!(invalid.status(), 400);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn malformed_id_is_400_on_every_session_route() {
        let harness = TestHarness::builder().build().await;
        let (base, shutdown) = spawn_gateway(&harness, None).await;
        let client = reqwest::Client::new();

        // A malformed id must read as a validation failure, never as a
        // missed lookup.
        let lookup = client
            .get(format!("{base}/sessions/bad%20id"))
            .send()
            .await
            .unwrap();
        assert_eq!(lookup.status(), 400);

        let restart = client
            .post(format!("{base}/sessions/dot.dot/restart"))
            .send()
            .await
            .unwrap();
        assert_eq!(restart.status(), 400);

        let send = client
            .post(format!("{base}/sessions/bad%20id/messages"))
            .json(&serde_json::json!({
                "to": "4915551234",
                "content": {"text": "hello"},
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(send.status(), 400);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn api_key_is_enforced_when_configured() {
        let harness = TestHarness::builder().build().await;
        let (base, shutdown) = spawn_gateway(&harness, Some("gw-key".into())).await;
        let client = reqwest::Client::new();

        let denied = client
            .get(format!("{base}/sessions"))
            .send()
            .await
            .unwrap();
        assert_eq!(denied.status(), 401);

        let allowed = client
            .get(format!("{base}/sessions"))
            .header("x-api-key", "gw-key")
            .send()
            .await
            .unwrap();
        assert_eq!(allowed.status(), 200);

        // Health stays public.
        let health = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(health.status(), 200);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn webhook_stats_reports_queue_depths() {
        let harness = TestHarness::builder().with_queued_sink().build().await;
        harness
            .engine
            .queue()
            .enqueue("alpha", "call", serde_json::json!({}))
            .await
            .unwrap();
        let (base, shutdown) = spawn_gateway(&harness, None).await;

        let stats: serde_json::Value = reqwest::get(format!("{base}/webhooks/stats"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["pending"], 1);
        assert_eq!(stats["isProcessing"], false);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn send_message_without_credentials_is_409() {
        let harness = TestHarness::builder().build().await;
        harness.registry.ensure("alpha").await.unwrap();
        harness.settle().await;
        let (base, shutdown) = spawn_gateway(&harness, None).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/sessions/alpha/messages"))
            .json(&serde_json::json!({
                "to": "4915551234",
                "content": {"text": "hello"},
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 409);

        shutdown.cancel();
    }
}
