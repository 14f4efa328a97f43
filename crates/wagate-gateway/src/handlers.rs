// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wagate_core::{GatewayError, MessageKey};

use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Wrapper mapping [`GatewayError`] kinds onto HTTP statuses.
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::CredentialsInvalid { .. } => StatusCode::CONFLICT,
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Transport { .. } | GatewayError::Store { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Delivery { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Config(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// --- public routes ---

/// GET /health (unauthenticated).
pub async fn get_health(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.start_time.elapsed().as_secs(),
    }))
}

// --- session routes ---

/// GET /sessions
pub async fn list_sessions(State(state): State<GatewayState>) -> Json<Value> {
    let sessions = state.registry.list();
    Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

/// POST /sessions/{id}/init - idempotent create-or-return.
pub async fn init_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.registry.ensure(&id).await?;
    Ok(Json(json!({
        "id": session.id,
        "status": session.status(),
    })))
}

/// GET /sessions/{id} - full computed status view.
pub async fn get_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.registry.get(&id)?;
    let view = session.actual_status();
    let mut body = serde_json::to_value(&view).unwrap_or_else(|_| json!({}));
    if let Some(obj) = body.as_object_mut() {
        obj.insert("id".into(), json!(session.id));
        obj.insert("reconnectAttempts".into(), json!(session.reconnect_attempts()));
        obj.insert("connectedAt".into(), json!(session.connected_at()));
        obj.insert("lastActivity".into(), json!(session.last_activity()));
    }
    Ok(Json(body))
}

/// GET /sessions/{id}/qr - current pairing string, if any.
pub async fn get_session_qr(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.registry.get(&id)?;
    let Some(qr) = session.qr_state() else {
        return Err(GatewayError::SessionNotFound {
            id: format!("{id} has no pending pairing string"),
        }
        .into());
    };
    Ok(Json(json!({
        "qr": qr.qr,
        "generatedAt": qr.generated_at,
        "expiresAt": qr.generated_at + state.qr_timeout_ms as i64,
    })))
}

/// POST /sessions/{id}/restart
pub async fn restart_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.registry.restart(&id).await?;
    Ok(Json(json!({ "id": id, "status": "restarting" })))
}

/// POST /sessions/{id}/logout - deauth and erase persisted credentials.
pub async fn logout_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.registry.logout(&id).await?;
    Ok(Json(json!({ "id": id, "status": "logged_out" })))
}

/// Request body for POST /sessions/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Destination address; a bare number gets the user suffix.
    pub to: String,
    /// Pre-built message envelope, forwarded as-is.
    pub content: Value,
}

/// POST /sessions/{id}/messages
pub async fn send_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.to.trim().is_empty() {
        return Err(GatewayError::Validation("'to' must not be empty".into()).into());
    }
    let key = state.registry.send_message(&id, &body.to, body.content).await?;
    Ok(Json(json!({ "key": key })))
}

/// Request body for POST /sessions/{id}/messages/read.
#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub keys: Vec<MessageKey>,
}

/// POST /sessions/{id}/messages/read - acknowledge messages.
pub async fn mark_read(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.keys.is_empty() {
        return Err(GatewayError::Validation("'keys' must not be empty".into()).into());
    }
    state.registry.mark_read(&id, &body.keys).await?;
    Ok(Json(json!({ "acknowledged": body.keys.len() })))
}

/// Request body for POST /sessions/{id}/pairing-code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodeRequest {
    pub phone_number: String,
}

/// POST /sessions/{id}/pairing-code - phone-number linking.
pub async fn pairing_code(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<PairingCodeRequest>,
) -> Result<Json<Value>, ApiError> {
    let code = state.registry.pairing_code(&id, &body.phone_number).await?;
    Ok(Json(json!({ "code": code })))
}

// --- webhook admin routes ---

/// GET /webhooks/stats
pub async fn webhook_stats(State(state): State<GatewayState>) -> Result<Json<Value>, ApiError> {
    let stats = state.engine.stats().await?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_else(|_| json!({}))))
}

/// Request body for POST /webhooks/retry.
#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    #[serde(default = "default_retry_count")]
    pub count: u64,
}

fn default_retry_count() -> u64 {
    10
}

/// POST /webhooks/retry - move dead-lettered jobs back to the queue.
pub async fn webhook_retry(
    State(state): State<GatewayState>,
    Json(body): Json<RetryRequest>,
) -> Result<Json<Value>, ApiError> {
    let moved = state.engine.retry_failed(body.count).await?;
    Ok(Json(json!({ "moved": moved })))
}
