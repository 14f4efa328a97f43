// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the wagate workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a tenant session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Supervisor created, transport not yet constructed.
    Init,
    /// Transport constructed, handshake/pairing in progress.
    Connecting,
    /// Authenticated and live.
    Open,
    /// Transport closed (may reconnect).
    Close,
    /// Persisted credentials are unusable; user must re-pair.
    InvalidCredentials,
    /// Liveness checks declared the connection dead.
    ConnectionLost,
}

/// Maximum length of a session identifier.
pub const SESSION_ID_MAX_LEN: usize = 128;

/// Validate an opaque session identifier: `[A-Za-z0-9_-]{1,128}`.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= SESSION_ID_MAX_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Disconnect reason derived from the transport's numeric status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// 401 - device was unlinked; terminal for the session.
    LoggedOut,
    /// 408 - socket dropped or the server stopped answering.
    ConnectionLost,
    /// 428 - server closed the connection.
    ConnectionClosed,
    /// 440 - another client took over this session.
    ConnectionReplaced,
    /// 515 - server requests an immediate stream restart.
    RestartRequired,
    /// Any other code.
    Other(u16),
}

impl DisconnectReason {
    pub fn from_code(code: u16) -> Self {
        match code {
            401 => DisconnectReason::LoggedOut,
            408 => DisconnectReason::ConnectionLost,
            428 => DisconnectReason::ConnectionClosed,
            440 => DisconnectReason::ConnectionReplaced,
            515 => DisconnectReason::RestartRequired,
            other => DisconnectReason::Other(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            DisconnectReason::LoggedOut => 401,
            DisconnectReason::ConnectionLost => 408,
            DisconnectReason::ConnectionClosed => 428,
            DisconnectReason::ConnectionReplaced => 440,
            DisconnectReason::RestartRequired => 515,
            DisconnectReason::Other(code) => *code,
        }
    }

    /// What the supervisor should do after a close with this reason.
    pub fn decision(&self) -> ReconnectDecision {
        match self {
            DisconnectReason::LoggedOut => ReconnectDecision::Terminal,
            DisconnectReason::RestartRequired => ReconnectDecision::RestartNow,
            // Lost, timed out, closed, replaced, and unknown codes all take
            // the backoff path; reconnecting is the safe default.
            _ => ReconnectDecision::Backoff,
        }
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::LoggedOut => write!(f, "logged_out"),
            DisconnectReason::ConnectionLost => write!(f, "connection_lost"),
            DisconnectReason::ConnectionClosed => write!(f, "connection_closed"),
            DisconnectReason::ConnectionReplaced => write!(f, "connection_replaced"),
            DisconnectReason::RestartRequired => write!(f, "restart_required"),
            DisconnectReason::Other(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Supervisor action after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Do not reconnect; the session requires user action.
    Terminal,
    /// Reconnect immediately without incrementing the backoff counter.
    RestartNow,
    /// Schedule a reconnect with exponential backoff.
    Backoff,
}

// --- Address (JID) helpers ---

/// Suffix of a private user address.
pub const SUFFIX_USER: &str = "@s.whatsapp.net";
/// Suffix of a group address.
pub const SUFFIX_GROUP: &str = "@g.us";
/// Suffix of a channel address.
pub const SUFFIX_CHANNEL: &str = "@newsletter";
/// Suffix of a status/broadcast address.
pub const SUFFIX_BROADCAST: &str = "@broadcast";

/// Normalize user input into a full address.
///
/// Idempotent: input already containing `@` is returned unchanged;
/// otherwise the private-user suffix is appended.
pub fn to_address(raw: &str) -> String {
    if raw.contains('@') {
        raw.to_string()
    } else {
        format!("{raw}{SUFFIX_USER}")
    }
}

pub fn is_group_address(addr: &str) -> bool {
    addr.ends_with(SUFFIX_GROUP)
}

pub fn is_channel_address(addr: &str) -> bool {
    addr.ends_with(SUFFIX_CHANNEL)
}

pub fn is_status_address(addr: &str) -> bool {
    addr.ends_with(SUFFIX_BROADCAST) || addr.contains("status@broadcast")
}

// --- Message types ---

/// Identifies a message within a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Address of the chat the message belongs to.
    #[serde(default)]
    pub remote_jid: Option<String>,
    /// Whether this client sent the message.
    #[serde(default)]
    pub from_me: bool,
    /// Message id, unique within the chat.
    pub id: String,
    /// Sender address inside group chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// A single protocol message with its envelope metadata. The `message`
/// body is opaque to the gateway and forwarded as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub key: MessageKey,
    /// Display name the sender advertises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Opaque message content.
    #[serde(default)]
    pub message: serde_json::Value,
    /// Seconds since epoch, as delivered by the transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_timestamp: Option<i64>,
}

/// A `messages.upsert` batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBatch {
    pub messages: Vec<ChatMessage>,
    /// "notify" for live messages, "append" for history backfill.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A contact entry from `contacts.upsert`/`contacts.update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
}

/// Group metadata from `groups.upsert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

// --- Webhook job ---

/// A record enqueued for webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookJob {
    /// Locally-unique job id.
    pub id: String,
    pub session_id: String,
    /// Event name from the taxonomy.
    pub event: String,
    pub payload: serde_json::Value,
    /// Enqueue time, ms since epoch.
    pub ts: i64,
    /// Delivery attempts so far; starts at 0.
    #[serde(default)]
    pub attempts: u32,
    /// Last attempt time, ms since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<i64>,
    /// Bounded audit trail of delivery failures.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Current wall-clock time in ms since epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_display_is_snake_case() {
        assert_eq!(SessionStatus::InvalidCredentials.to_string(), "invalid_credentials");
        assert_eq!(SessionStatus::Open.to_string(), "open");
    }

    #[test]
    fn session_id_validation() {
        assert!(is_valid_session_id("alpha"));
        assert!(is_valid_session_id("a-b_C9"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("has space"));
        assert!(!is_valid_session_id("dot.dot"));
        assert!(!is_valid_session_id(&"x".repeat(129)));
        assert!(is_valid_session_id(&"x".repeat(128)));
    }

    #[test]
    fn disconnect_reason_round_trips_known_codes() {
        for code in [401u16, 408, 428, 440, 515, 999] {
            assert_eq!(DisconnectReason::from_code(code).code(), code);
        }
    }

    #[test]
    fn logged_out_is_terminal() {
        assert_eq!(
            DisconnectReason::LoggedOut.decision(),
            ReconnectDecision::Terminal
        );
    }

    #[test]
    fn restart_required_reconnects_immediately() {
        assert_eq!(
            DisconnectReason::RestartRequired.decision(),
            ReconnectDecision::RestartNow
        );
    }

    #[test]
    fn unknown_codes_take_backoff_path() {
        assert_eq!(
            DisconnectReason::Other(503).decision(),
            ReconnectDecision::Backoff
        );
        assert_eq!(
            DisconnectReason::ConnectionClosed.decision(),
            ReconnectDecision::Backoff
        );
    }

    #[test]
    fn to_address_is_idempotent_on_full_addresses() {
        let full = "12345@s.whatsapp.net";
        assert_eq!(to_address(full), full);
        assert_eq!(to_address(&to_address("12345")), to_address("12345"));
        assert_eq!(to_address("group@g.us"), "group@g.us");
    }

    #[test]
    fn address_classifiers() {
        assert!(is_group_address("abc@g.us"));
        assert!(is_channel_address("abc@newsletter"));
        assert!(is_status_address("status@broadcast"));
        assert!(is_status_address("xyz@broadcast"));
        assert!(!is_group_address("abc@s.whatsapp.net"));
    }

    #[test]
    fn message_key_uses_camel_case_wire_names() {
        let key: MessageKey = serde_json::from_value(serde_json::json!({
            "remoteJid": "123@s.whatsapp.net",
            "fromMe": false,
            "id": "ABCDEF",
        }))
        .unwrap();
        assert_eq!(key.remote_jid.as_deref(), Some("123@s.whatsapp.net"));
        let back = serde_json::to_value(&key).unwrap();
        assert!(back.get("remoteJid").is_some());
    }

    #[test]
    fn webhook_job_serializes_camel_case() {
        let job = WebhookJob {
            id: "j1".into(),
            session_id: "alpha".into(),
            event: "messages.upsert".into(),
            payload: serde_json::json!({}),
            ts: 1,
            attempts: 0,
            last_attempt: None,
            errors: vec![],
        };
        let v = serde_json::to_value(&job).unwrap();
        assert!(v.get("sessionId").is_some());
        assert!(v.get("lastAttempt").is_none());
    }
}
