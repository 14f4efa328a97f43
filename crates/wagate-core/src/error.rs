// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the wagate gateway.

use thiserror::Error;

/// The primary error type used across all wagate crates.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration errors (invalid TOML, unparsable env values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport socket failure; absorbed by the supervisor and converted
    /// into a state transition, never a crash.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Terminal authentication failure (logged out, device removed).
    /// Requires user action; the session must not reconnect.
    #[error("auth error: {0}")]
    Auth(String),

    /// Persisted credentials are missing or malformed for this session.
    /// Outbound operations refuse with this error.
    #[error("credentials invalid for session {session_id}")]
    CredentialsInvalid { session_id: String },

    /// KV service errors (connection, command failure, serialization).
    #[error("store error: {source}")]
    Store {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Webhook sink returned non-2xx or the request timed out. Handled by
    /// the retry ladder; never surfaced to the event producer.
    #[error("delivery error: {message}")]
    Delivery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Lookup on an unknown session id; surfaced as 404 to callers.
    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// Malformed input at the external boundary; surfaced as 400.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Wrap a foreign error as a store failure.
    pub fn store<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        GatewayError::Store {
            source: Box::new(source),
        }
    }

    /// Wrap a foreign error as a transport failure.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        GatewayError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_session_id() {
        let err = GatewayError::CredentialsInvalid {
            session_id: "alpha".into(),
        };
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn store_wraps_source() {
        let err = GatewayError::store(std::io::Error::other("connection refused"));
        assert!(err.to_string().contains("connection refused"));
    }
}
