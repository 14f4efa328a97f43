// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-global session registry.
//!
//! Owns the map from session id to live [`Session`] and spawns one
//! supervisor task per entry. HTTP handlers resolve sessions here and
//! then talk to the session's transport; lifecycle mutations (restart,
//! logout) are forwarded to the supervisor's mailbox so per-session
//! state keeps a single owner.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wagate_core::types::{is_valid_session_id, to_address};
use wagate_core::{GatewayError, MessageKey, SessionStatus};

use crate::session::{ActualStatus, Session, SessionCommand, SessionInfo};
use crate::supervisor::{Supervisor, SupervisorContext};

/// Depth of each supervisor's command mailbox.
const COMMAND_BUFFER: usize = 16;

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    ctx: Arc<SupervisorContext>,
    /// Serializes session creation so each id gets exactly one
    /// supervisor task.
    create_lock: tokio::sync::Mutex<()>,
}

impl SessionRegistry {
    pub fn new(ctx: SupervisorContext) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            ctx: Arc::new(ctx),
            create_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Malformed ids are rejected up front so they surface as 400, not
    /// as a lookup miss.
    fn validate_id(id: &str) -> Result<(), GatewayError> {
        if is_valid_session_id(id) {
            Ok(())
        } else {
            Err(GatewayError::Validation(format!(
                "invalid session id {id:?} (expected [A-Za-z0-9_-]{{1,128}})"
            )))
        }
    }

    /// Idempotent: return the existing session or create one, loading
    /// its persisted credentials and starting its supervisor.
    pub async fn ensure(&self, id: &str) -> Result<Arc<Session>, GatewayError> {
        Self::validate_id(id)?;
        if let Some(existing) = self.sessions.get(id) {
            return Ok(existing.clone());
        }

        let _guard = self.create_lock.lock().await;
        // Double-check after winning the creation lock.
        if let Some(existing) = self.sessions.get(id) {
            return Ok(existing.clone());
        }

        let auth = self.ctx.auth_store.load(id).await?;
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = CancellationToken::new();
        let session = Session::new(id.to_string(), auth.creds, command_tx, cancel);

        let supervisor = Supervisor::new(Arc::clone(&session), Arc::clone(&self.ctx), command_rx);
        tokio::spawn(supervisor.run());

        self.sessions.insert(id.to_string(), Arc::clone(&session));
        info!(session_id = id, fresh = auth.is_fresh, "session created");
        Ok(session)
    }

    /// Lookup; malformed ids are rejected as validation errors, unknown
    /// ids surface as [`GatewayError::SessionNotFound`].
    pub fn get(&self, id: &str) -> Result<Arc<Session>, GatewayError> {
        Self::validate_id(id)?;
        self.sessions
            .get(id)
            .map(|s| s.clone())
            .ok_or_else(|| GatewayError::SessionNotFound { id: id.to_string() })
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.info()).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn actual_status(&self, id: &str) -> Result<ActualStatus, GatewayError> {
        Ok(self.get(id)?.actual_status())
    }

    /// Ask the supervisor to tear down and rebuild the transport.
    pub async fn restart(&self, id: &str) -> Result<(), GatewayError> {
        self.get(id)?.send_command(SessionCommand::Restart).await
    }

    /// Deauth the transport, erase persisted keys, and drop the session.
    pub async fn logout(&self, id: &str) -> Result<(), GatewayError> {
        let session = self.get(id)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        session
            .send_command(SessionCommand::Logout { reply: reply_tx })
            .await?;
        let result = reply_rx
            .await
            .map_err(|_| GatewayError::Internal(format!("supervisor for {id} dropped reply")))?;
        session.cancel.cancel();
        self.sessions.remove(id);
        info!(session_id = id, "session logged out and removed");
        result
    }

    /// Send an already-built message envelope through a session.
    pub async fn send_message(
        &self,
        id: &str,
        to: &str,
        content: Value,
    ) -> Result<MessageKey, GatewayError> {
        let session = self.get(id)?;
        if !session.credentials_valid() {
            return Err(GatewayError::CredentialsInvalid {
                session_id: id.to_string(),
            });
        }
        let transport = session.transport().ok_or_else(|| GatewayError::Transport {
            message: format!("session {id} has no live transport"),
            source: None,
        })?;
        if session.status() != SessionStatus::Open || !transport.is_writable() {
            return Err(GatewayError::Transport {
                message: format!("session {id} is not connected"),
                source: None,
            });
        }
        let key = transport.send_message(&to_address(to), content).await?;
        session.touch_activity();
        Ok(key)
    }

    /// Acknowledge messages as read through a session.
    pub async fn mark_read(&self, id: &str, keys: &[MessageKey]) -> Result<(), GatewayError> {
        let session = self.get(id)?;
        if !session.credentials_valid() {
            return Err(GatewayError::CredentialsInvalid {
                session_id: id.to_string(),
            });
        }
        let transport = session.transport().ok_or_else(|| GatewayError::Transport {
            message: format!("session {id} has no live transport"),
            source: None,
        })?;
        transport.mark_read(keys).await?;
        session.touch_activity();
        Ok(())
    }

    /// Request a pairing code for phone-number linking. The number is
    /// reduced to its E.164 digits first.
    pub async fn pairing_code(&self, id: &str, phone: &str) -> Result<String, GatewayError> {
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(GatewayError::Validation(
                "phone number must contain digits".into(),
            ));
        }
        let session = self.get(id)?;
        let transport = session.transport().ok_or_else(|| GatewayError::Transport {
            message: format!("session {id} has no live transport"),
            source: None,
        })?;
        transport.request_pairing_code(&digits).await
    }

    /// Disconnect every session without wiping credentials. Used at
    /// shutdown; sessions resurrect from the KV store on next boot.
    pub async fn disconnect_all(&self) {
        let sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|entry| entry.clone()).collect();
        for session in sessions {
            session.cancel.cancel();
            if let Some(transport) = session.transport() {
                if let Err(err) = transport.close().await {
                    warn!(session_id = %session.id, error = %err, "close during shutdown failed");
                }
            }
            session.set_status(SessionStatus::Close);
        }
        info!(count = self.sessions.len(), "all sessions disconnected");
    }
}
