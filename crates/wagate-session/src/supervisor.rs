// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-session supervisor task.
//!
//! Owns the transport and the receiving end of its event stream, drives
//! the `init -> connecting -> open -> close` state machine, runs
//! keep-alive and health timers, and self-heals with bounded exponential
//! backoff. Transport errors and disconnects are absorbed into state
//! transitions; nothing in here crashes the process.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use wagate_config::SessionConfig;
use wagate_core::events::names;
use wagate_core::types::now_ms;
use wagate_core::{
    ConnectionState, ConnectionUpdate, Contact, DisconnectReason, GatewayError, ProtocolEvent,
    ReconnectDecision, SessionStatus, TransportEvent, TransportFactory,
};
use wagate_store::AuthStore;
use wagate_webhook::EventPublisher;

use crate::session::{QrState, Session, SessionCommand};

/// Pause between tearing a transport down and building its replacement.
const RESTART_PAUSE: Duration = Duration::from_millis(500);

/// Grace period for a transport to close before it is abandoned.
const GRACEFUL_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Dependencies shared by every supervisor in the process.
pub struct SupervisorContext {
    pub auth_store: AuthStore,
    pub factory: Arc<dyn TransportFactory>,
    pub publisher: EventPublisher,
    pub config: SessionConfig,
}

/// Why the select loop woke up.
enum Wake {
    Cancelled,
    Command(Option<SessionCommand>),
    Transport(Option<TransportEvent>),
    ReconnectDue,
    KeepAliveTick,
    HealthTick,
}

pub(crate) struct Supervisor {
    session: Arc<Session>,
    ctx: Arc<SupervisorContext>,
    commands: mpsc::Receiver<SessionCommand>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    reconnect_at: Option<Instant>,
    /// Keep-alive liveness tracking, reset on every open.
    last_pong_at: Instant,
    missed_pongs: u32,
    /// A creds.update failed to persist; the next open is refused until
    /// a save succeeds.
    creds_save_failed: bool,
    /// Terminal: the server logged this session out.
    logged_out: bool,
}

impl Supervisor {
    pub(crate) fn new(
        session: Arc<Session>,
        ctx: Arc<SupervisorContext>,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        Self {
            session,
            ctx,
            commands,
            events: None,
            reconnect_at: None,
            last_pong_at: Instant::now(),
            missed_pongs: 0,
            creds_save_failed: false,
            logged_out: false,
        }
    }

    /// Run until logout or process shutdown.
    pub(crate) async fn run(mut self) {
        info!(session_id = %self.session.id, "session supervisor started");
        self.connect_transport().await;

        let keepalive_every = Duration::from_millis(self.ctx.config.ping_interval_ms.max(1));
        let health_every = Duration::from_millis(self.ctx.config.health_check_interval_ms.max(1));
        let mut keepalive = interval(keepalive_every);
        let mut health = interval(health_every);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        health.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Intervals fire immediately on the first tick; skip that one.
        keepalive.reset();
        health.reset();

        let cancel = self.session.cancel.clone();
        loop {
            let open = self.session.status() == SessionStatus::Open;
            let reconnect_at = self.reconnect_at;

            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancelled,
                command = self.commands.recv() => Wake::Command(command),
                _ = async {
                    match reconnect_at {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => Wake::ReconnectDue,
                event = async {
                    match self.events.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => Wake::Transport(event),
                _ = keepalive.tick(), if open => Wake::KeepAliveTick,
                _ = health.tick(), if open => Wake::HealthTick,
            };

            match wake {
                Wake::Cancelled => {
                    debug!(session_id = %self.session.id, "supervisor cancelled");
                    break;
                }
                Wake::Command(None) => break,
                Wake::Command(Some(SessionCommand::Restart)) => {
                    self.restart().await;
                }
                Wake::Command(Some(SessionCommand::Logout { reply })) => {
                    let result = self.logout().await;
                    let _ = reply.send(result);
                    break;
                }
                Wake::ReconnectDue => {
                    self.reconnect_at = None;
                    debug!(session_id = %self.session.id, "reconnect timer fired");
                    self.restart().await;
                }
                Wake::Transport(Some(event)) => self.handle_transport_event(event).await,
                Wake::Transport(None) => self.handle_stream_end().await,
                Wake::KeepAliveTick => self.keepalive_tick().await,
                Wake::HealthTick => self.health_tick().await,
            }
        }
        info!(session_id = %self.session.id, "session supervisor stopped");
    }

    // --- transport lifecycle ---

    /// Build a transport from the current credentials. Failures take the
    /// backoff path rather than surfacing.
    async fn connect_transport(&mut self) {
        self.session.set_status(SessionStatus::Init);
        let creds = self.session.creds_snapshot();
        match self.ctx.factory.connect(&self.session.id, creds).await {
            Ok(handle) => {
                self.session.set_transport(Some(handle.transport));
                self.events = Some(handle.events);
                self.session.set_status(SessionStatus::Connecting);
            }
            Err(err) => {
                warn!(session_id = %self.session.id, error = %err, "transport connect failed");
                self.session.set_transport(None);
                self.events = None;
                self.session.set_status(SessionStatus::Close);
                self.schedule_reconnect();
            }
        }
    }

    /// Stop listening, close the old socket (bounded grace), pause, and
    /// reconnect with the same credentials.
    async fn restart(&mut self) {
        if self.logged_out {
            debug!(session_id = %self.session.id, "ignoring restart after logout");
            return;
        }
        debug!(session_id = %self.session.id, "restarting transport");
        self.events = None;
        if let Some(transport) = self.session.transport() {
            match tokio::time::timeout(GRACEFUL_CLOSE_TIMEOUT, transport.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(session_id = %self.session.id, error = %err, "transport close failed");
                }
                Err(_) => {
                    debug!(session_id = %self.session.id, "graceful close timed out");
                }
            }
        }
        self.session.set_transport(None);
        tokio::time::sleep(RESTART_PAUSE).await;
        self.connect_transport().await;
    }

    /// Deauth, erase persisted keys, and leave the registry entry to the
    /// caller.
    async fn logout(&mut self) -> Result<(), GatewayError> {
        info!(session_id = %self.session.id, "logging out session");
        self.events = None;
        self.reconnect_at = None;
        if let Some(transport) = self.session.transport() {
            if let Err(err) = transport.logout().await {
                warn!(session_id = %self.session.id, error = %err, "transport logout failed");
            }
            if let Err(err) = transport.close().await {
                debug!(session_id = %self.session.id, error = %err, "transport close failed");
            }
        }
        self.session.set_transport(None);
        self.session.set_qr(None);
        self.session.set_status(SessionStatus::Close);
        self.ctx.auth_store.wipe(&self.session.id).await?;
        Ok(())
    }

    /// The transport dropped its event stream without a close event.
    async fn handle_stream_end(&mut self) {
        self.events = None;
        if matches!(
            self.session.status(),
            SessionStatus::Open | SessionStatus::Connecting
        ) {
            warn!(session_id = %self.session.id, "transport stream ended unexpectedly");
            self.on_close(Some(DisconnectReason::ConnectionLost.code())).await;
        }
    }

    // --- event handling ---

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionUpdate(update) => {
                self.handle_connection_update(update).await
            }
            TransportEvent::CredsUpdate(creds) => self.handle_creds_update(creds).await,
            TransportEvent::Pong => {
                self.last_pong_at = Instant::now();
                self.missed_pongs = 0;
                self.session.touch_activity();
            }
            TransportEvent::Event(event) => self.handle_protocol_event(event).await,
        }
    }

    async fn handle_connection_update(&mut self, update: ConnectionUpdate) {
        self.publish(
            names::CONNECTION_UPDATE,
            serde_json::to_value(&update).unwrap_or_default(),
        )
        .await;

        if let Some(qr) = update.qr.clone() {
            self.handle_qr(qr).await;
        }

        match update.connection {
            Some(ConnectionState::Connecting) => {
                self.session.set_status(SessionStatus::Connecting);
            }
            Some(ConnectionState::Open) => self.on_open().await,
            Some(ConnectionState::Close) => self.on_close(update.status_code).await,
            None => {}
        }
    }

    async fn handle_qr(&mut self, qr: String) {
        let generated_at = now_ms();
        let expires_at = generated_at + self.ctx.config.qr_timeout_ms as i64;
        self.session.set_qr(Some(QrState {
            qr: qr.clone(),
            generated_at,
        }));
        info!(session_id = %self.session.id, "pairing string updated");
        if self.ctx.config.show_qr_in_terminal {
            println!("[{}] scan to pair: {qr}", self.session.id);
        }
        self.publish(
            names::QR_UPDATED,
            json!({
                "qr": qr,
                "generatedAt": generated_at,
                "expiresAt": expires_at,
            }),
        )
        .await;
    }

    async fn handle_creds_update(&mut self, creds: serde_json::Value) {
        self.session.set_creds(creds.clone());
        match self.ctx.auth_store.save_creds(&self.session.id, &creds).await {
            Ok(()) => {
                self.creds_save_failed = false;
                debug!(session_id = %self.session.id, "credentials persisted");
            }
            Err(err) => {
                // The session must not present as open with unpersisted
                // identity material; force a reconnect cycle.
                error!(session_id = %self.session.id, error = %err, "failed to persist credentials");
                self.creds_save_failed = true;
                self.force_close().await;
            }
        }
    }

    async fn on_open(&mut self) {
        if self.creds_save_failed {
            warn!(
                session_id = %self.session.id,
                "refusing open with unpersisted credentials"
            );
            self.force_close().await;
            return;
        }
        let connected_at = now_ms();
        self.session.set_qr(None);
        self.session.set_status(SessionStatus::Open);
        self.session.set_connected_at(connected_at);
        self.session.touch_activity();
        self.session.reset_reconnect_attempts();
        self.last_pong_at = Instant::now();
        self.missed_pongs = 0;
        self.reconnect_at = None;
        info!(session_id = %self.session.id, "session connected");
        let me = self.session.creds_snapshot().get("me").cloned();
        self.publish(
            names::SESSION_CONNECTED,
            json!({
                "connectedAt": connected_at,
                "me": me,
            }),
        )
        .await;
    }

    async fn on_close(&mut self, status_code: Option<u16>) {
        let reason = status_code.map(DisconnectReason::from_code);
        let is_logged_out = reason.is_some_and(|r| r.is_logged_out());
        self.session.set_status(SessionStatus::Close);
        self.session.set_qr(None);
        info!(
            session_id = %self.session.id,
            status_code,
            reason = reason.map(|r| r.to_string()).unwrap_or_else(|| "unknown".into()),
            "session disconnected"
        );
        self.publish(
            names::SESSION_DISCONNECTED,
            json!({
                "statusCode": status_code,
                "reason": reason.map(|r| r.to_string()),
                "isLoggedOut": is_logged_out,
            }),
        )
        .await;

        match reason.map_or(ReconnectDecision::Backoff, |r| r.decision()) {
            ReconnectDecision::Terminal => {
                warn!(session_id = %self.session.id, "logged out by server, not reconnecting");
                self.logged_out = true;
                self.events = None;
                self.reconnect_at = None;
            }
            ReconnectDecision::RestartNow => {
                self.restart().await;
            }
            ReconnectDecision::Backoff => {
                if self.session.credentials_valid() {
                    self.schedule_reconnect();
                } else {
                    // Unpaired session: reconnect loops cannot help, the
                    // caller has to drive pairing again.
                    debug!(
                        session_id = %self.session.id,
                        "close with invalid credentials, not rescheduling"
                    );
                }
            }
        }
    }

    /// Compute and arm the next backoff delay, or give up after the
    /// configured attempt limit.
    fn schedule_reconnect(&mut self) {
        if !self.ctx.config.auto_reconnect || self.logged_out {
            return;
        }
        let attempts = self.session.bump_reconnect_attempts();
        if attempts > self.ctx.config.max_reconnect_attempts {
            error!(
                session_id = %self.session.id,
                attempts = attempts - 1,
                "reconnect attempts exhausted, giving up"
            );
            return;
        }
        let delay = reconnect_delay(
            attempts,
            self.ctx.config.reconnect_base_delay_ms,
            self.ctx.config.reconnect_max_delay_ms,
        );
        info!(
            session_id = %self.session.id,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    /// Close the socket and let the regular close handling decide what
    /// happens next.
    async fn force_close(&mut self) {
        if let Some(transport) = self.session.transport() {
            if let Err(err) = transport.close().await {
                debug!(session_id = %self.session.id, error = %err, "force close failed");
            }
        }
    }

    // --- periodic probes ---

    /// Keep-alive: ping the socket and count silent intervals; enough of
    /// them and the connection is declared dead.
    async fn keepalive_tick(&mut self) {
        if !self.session.transport_writable() {
            debug!(session_id = %self.session.id, "keep-alive skipped, transport not writable");
            return;
        }
        if let Some(transport) = self.session.transport() {
            if let Err(err) = transport.ping().await {
                warn!(session_id = %self.session.id, error = %err, "keep-alive ping failed");
            }
        }
        let pong_age = self.last_pong_at.elapsed();
        if pong_age > Duration::from_millis(self.ctx.config.pong_timeout_ms) {
            self.missed_pongs += 1;
            debug!(
                session_id = %self.session.id,
                missed = self.missed_pongs,
                pong_age_ms = pong_age.as_millis() as u64,
                "pong overdue"
            );
        }
        if self.missed_pongs >= self.ctx.config.max_missed_pongs {
            warn!(
                session_id = %self.session.id,
                missed = self.missed_pongs,
                "connection declared dead, forcing close"
            );
            self.missed_pongs = 0;
            self.session.set_status(SessionStatus::ConnectionLost);
            self.force_close().await;
        }
    }

    /// Health check: probe idle connections and reconcile status with
    /// the socket.
    async fn health_tick(&mut self) {
        let idle_ms = now_ms() - self.session.last_activity();
        if idle_ms > self.ctx.config.max_idle_time_ms as i64 {
            debug!(session_id = %self.session.id, idle_ms, "idle too long, probing");
            match self.session.transport() {
                Some(transport) => match transport.presence_probe().await {
                    Ok(()) => self.session.touch_activity(),
                    Err(err) => {
                        warn!(
                            session_id = %self.session.id,
                            error = %err,
                            "idle probe failed, forcing close"
                        );
                        self.force_close().await;
                        return;
                    }
                },
                None => {}
            }
        }

        if self.session.status() == SessionStatus::Open && !self.session.transport_writable() {
            warn!(
                session_id = %self.session.id,
                "status open but transport not writable, reconciling"
            );
            self.session.set_status(SessionStatus::Close);
        }
    }

    // --- cache + fan-out ---

    async fn handle_protocol_event(&mut self, event: ProtocolEvent) {
        self.session.touch_activity();
        self.update_caches(&event);
        if let Err(err) = self
            .ctx
            .publisher
            .publish_protocol(&self.session.id, &event)
            .await
        {
            // Webhook failures never flow back into event handling.
            warn!(session_id = %self.session.id, error = %err, "failed to enqueue webhook");
        }
    }

    fn update_caches(&self, event: &ProtocolEvent) {
        match event {
            ProtocolEvent::MessagesUpsert(batch) => {
                for msg in &batch.messages {
                    if let Ok(value) = serde_json::to_value(msg) {
                        self.session.caches.messages.insert(msg.key.id.clone(), value);
                    }
                    // A pushName doubles as a contact-name update.
                    if let (Some(addr), Some(name)) =
                        (msg.key.remote_jid.as_deref(), msg.push_name.as_deref())
                    {
                        if !msg.key.from_me {
                            self.session.caches.contacts.insert(
                                addr.to_string(),
                                Contact {
                                    id: addr.to_string(),
                                    name: None,
                                    notify: Some(name.to_string()),
                                },
                            );
                        }
                    }
                }
            }
            ProtocolEvent::ContactsUpsert(contacts) | ProtocolEvent::ContactsUpdate(contacts) => {
                for contact in contacts {
                    self.session
                        .caches
                        .contacts
                        .insert(contact.id.clone(), contact.clone());
                }
            }
            ProtocolEvent::GroupsUpsert(groups) => {
                for group in groups {
                    if let Ok(value) = serde_json::to_value(group) {
                        self.session.caches.groups.insert(group.id.clone(), value);
                    }
                }
            }
            ProtocolEvent::GroupsUpdate(value) => {
                if let Some(items) = value.as_array() {
                    for item in items {
                        if let Some(id) = item.get("id").and_then(|v| v.as_str()) {
                            self.session.caches.groups.insert(id.to_string(), item.clone());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    async fn publish(&self, event: &str, payload: serde_json::Value) {
        if let Err(err) = self
            .ctx
            .publisher
            .publish(&self.session.id, event, payload)
            .await
        {
            warn!(session_id = %self.session.id, event, error = %err, "failed to enqueue webhook");
        }
    }
}

/// Backoff ladder: `min(base * 1.5^(attempt-1), cap)`.
pub fn reconnect_delay(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let factor = 1.5f64.powi(attempt.saturating_sub(1) as i32);
    let delay = (base_ms as f64 * factor).min(cap_ms as f64);
    Duration::from_millis(delay as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_ladder_matches_documented_values() {
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| reconnect_delay(attempt, 5_000, 60_000).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![5_000, 7_500, 11_250, 16_875, 25_312]);
    }

    #[test]
    fn reconnect_delay_is_capped() {
        assert_eq!(
            reconnect_delay(30, 5_000, 60_000),
            Duration::from_millis(60_000)
        );
    }

    #[test]
    fn first_attempt_uses_base_delay() {
        assert_eq!(
            reconnect_delay(1, 5_000, 60_000),
            Duration::from_millis(5_000)
        );
    }
}
