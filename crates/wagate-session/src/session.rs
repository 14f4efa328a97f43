// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observable per-session state.
//!
//! A [`Session`] is the handle HTTP callers read; every mutation happens
//! on the session's supervisor task. The transport reference is the one
//! piece handlers interact with directly (its methods are internally
//! synchronized), matching the invariant that mutable session state has
//! a single owner.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use wagate_core::types::now_ms;
use wagate_core::{Contact, GatewayError, SessionStatus, Transport};
use wagate_store::credentials_valid;

use crate::cache::TtlCache;

const MESSAGE_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const CONTACT_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const GROUP_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Control messages from the public API to a session's supervisor task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Tear the transport down and reconnect with the same credentials.
    Restart,
    /// Deauthenticate, erase persisted keys, and stop the supervisor.
    Logout {
        reply: oneshot::Sender<Result<(), GatewayError>>,
    },
}

/// The current pairing string, if one is outstanding.
#[derive(Debug, Clone)]
pub struct QrState {
    pub qr: String,
    /// ms since epoch.
    pub generated_at: i64,
}

/// Ephemeral per-session caches (messages 6h, contacts 6h, groups 5m).
pub struct SessionCaches {
    pub messages: TtlCache<String, Value>,
    pub contacts: TtlCache<String, Contact>,
    pub groups: TtlCache<String, Value>,
}

impl SessionCaches {
    fn new() -> Self {
        Self {
            messages: TtlCache::new(MESSAGE_CACHE_TTL),
            contacts: TtlCache::new(CONTACT_CACHE_TTL),
            groups: TtlCache::new(GROUP_CACHE_TTL),
        }
    }
}

/// One tenant's connection, as visible outside the supervisor.
pub struct Session {
    pub id: String,
    status: Mutex<SessionStatus>,
    last_qr: Mutex<Option<QrState>>,
    creds: Mutex<Value>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    /// ms since epoch; 0 = never connected.
    connected_at: AtomicI64,
    last_activity: AtomicI64,
    reconnect_attempts: AtomicU32,
    pub caches: SessionCaches,
    commands: mpsc::Sender<SessionCommand>,
    /// Stops the supervisor task and with it every timer it owns.
    pub(crate) cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(
        id: String,
        creds: Value,
        commands: mpsc::Sender<SessionCommand>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            status: Mutex::new(SessionStatus::Init),
            last_qr: Mutex::new(None),
            creds: Mutex::new(creds),
            transport: Mutex::new(None),
            connected_at: AtomicI64::new(0),
            last_activity: AtomicI64::new(now_ms()),
            reconnect_attempts: AtomicU32::new(0),
            caches: SessionCaches::new(),
            commands,
            cancel,
        })
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> SessionStatus {
        *Self::lock(&self.status)
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        *Self::lock(&self.status) = status;
    }

    pub fn qr_state(&self) -> Option<QrState> {
        Self::lock(&self.last_qr).clone()
    }

    pub(crate) fn set_qr(&self, qr: Option<QrState>) {
        *Self::lock(&self.last_qr) = qr;
    }

    pub fn creds_snapshot(&self) -> Value {
        Self::lock(&self.creds).clone()
    }

    pub(crate) fn set_creds(&self, creds: Value) {
        *Self::lock(&self.creds) = creds;
    }

    pub fn credentials_valid(&self) -> bool {
        credentials_valid(&Self::lock(&self.creds))
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        Self::lock(&self.transport).clone()
    }

    pub(crate) fn set_transport(&self, transport: Option<Arc<dyn Transport>>) {
        *Self::lock(&self.transport) = transport;
    }

    /// Whether the underlying socket accepts writes right now.
    pub fn transport_writable(&self) -> bool {
        Self::lock(&self.transport)
            .as_ref()
            .is_some_and(|t| t.is_writable())
    }

    pub fn connected_at(&self) -> Option<i64> {
        match self.connected_at.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }

    pub(crate) fn set_connected_at(&self, ts: i64) {
        self.connected_at.store(ts, Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    pub(crate) fn touch_activity(&self) {
        self.last_activity.store(now_ms(), Ordering::Relaxed);
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Increment within a disconnect streak; returns the new value.
    pub(crate) fn bump_reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn reset_reconnect_attempts(&self) {
        self.reconnect_attempts.store(0, Ordering::Relaxed);
    }

    pub(crate) async fn send_command(&self, command: SessionCommand) -> Result<(), GatewayError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GatewayError::Internal(format!("supervisor for {} is gone", self.id)))
    }

    /// Registry list entry.
    pub fn info(&self) -> SessionInfo {
        let view = self.actual_status();
        SessionInfo {
            id: self.id.clone(),
            status: self.status(),
            is_authenticated: view.is_authenticated,
            has_qr: self.qr_state().is_some(),
            credentials_valid: view.credentials_valid,
            reconnect_attempts: self.reconnect_attempts(),
        }
    }

    /// Consistent computed view of `{status, credentials, transport}`.
    ///
    /// The stored status can momentarily disagree with the socket (e.g.
    /// open with a dead transport); callers always see the reconciled
    /// value.
    pub fn actual_status(&self) -> ActualStatus {
        let stored = self.status();
        let credentials_valid = self.credentials_valid();
        let writable = self.transport_writable();
        let ws_state = if writable {
            "open"
        } else if self.transport().is_some() {
            "closed"
        } else {
            "none"
        };

        let actual = if !credentials_valid
            && matches!(stored, SessionStatus::Open | SessionStatus::Close)
        {
            SessionStatus::InvalidCredentials
        } else if stored == SessionStatus::Open && !writable {
            SessionStatus::Close
        } else {
            stored
        };

        ActualStatus {
            actual_status: actual,
            is_authenticated: actual == SessionStatus::Open && credentials_valid,
            credentials_valid,
            ws_state: ws_state.to_string(),
            transport_status: stored,
        }
    }
}

/// Summary row returned by the registry's `list()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub status: SessionStatus,
    pub is_authenticated: bool,
    #[serde(rename = "hasQR")]
    pub has_qr: bool,
    pub credentials_valid: bool,
    pub reconnect_attempts: u32,
}

/// Computed status view for a single session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualStatus {
    pub actual_status: SessionStatus,
    pub is_authenticated: bool,
    pub credentials_valid: bool,
    pub ws_state: String,
    /// Raw status as tracked from transport events.
    #[serde(rename = "baileyStatus")]
    pub transport_status: SessionStatus,
}
