// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! API-key middleware for the gateway routes.
//!
//! Accepts the key via `X-Api-Key` or `Authorization: Bearer`. With no
//! key configured the check is disabled; the gateway is then expected to
//! sit behind an authenticating proxy.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Authentication configuration for the gateway.
#[derive(Clone)]
pub struct ApiKeyConfig {
    /// Expected API key. `None` disables the check.
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ApiKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Middleware validating the API key on protected routes.
pub async fn api_key_middleware(
    State(auth): State<ApiKeyConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(ref expected) = auth.api_key else {
        return Ok(next.run(request).await);
    };

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());
    if header_key == Some(expected.as_str()) {
        return Ok(next.run(request).await);
    }

    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if bearer == Some(expected.as_str()) {
        return Ok(next.run(request).await);
    }

    tracing::debug!("rejected request with missing or wrong API key");
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_the_key() {
        let config = ApiKeyConfig {
            api_key: Some("super-secret".into()),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[redacted]"));
    }
}
