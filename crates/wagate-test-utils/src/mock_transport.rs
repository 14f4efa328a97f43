// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic supervisor testing.
//!
//! The factory hands each connect a scripted transport plus a
//! [`MockControl`] the test keeps, for injecting protocol events and
//! inspecting what the supervisor sent. Connect behavior mirrors the
//! real library: a `connecting` update always, then `open` when the
//! credential document is already registered.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use wagate_core::events::{ConnectionState, ConnectionUpdate};
use wagate_core::{
    GatewayError, MessageKey, ProtocolEvent, Transport, TransportEvent, TransportFactory,
    TransportHandle,
};
use wagate_store::me_id;

const EVENT_BUFFER: usize = 64;

#[derive(Default)]
struct MockState {
    writable: AtomicBool,
    closed: AtomicBool,
    logged_out: AtomicBool,
    auto_pong: AtomicBool,
    probe_fail: AtomicBool,
    pings: AtomicU32,
    probes: AtomicU32,
    message_counter: AtomicU64,
    close_code: Mutex<Option<u16>>,
    sent: Mutex<Vec<(String, Value)>>,
    read_keys: Mutex<Vec<MessageKey>>,
    pairing_requests: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Test-side handle to one mock transport instance.
#[derive(Clone)]
pub struct MockControl {
    events: mpsc::Sender<TransportEvent>,
    state: Arc<MockState>,
}

impl MockControl {
    /// Inject a raw transport event.
    pub async fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event).await;
    }

    pub async fn emit_qr(&self, qr: &str) {
        self.emit(TransportEvent::ConnectionUpdate(ConnectionUpdate {
            connection: None,
            qr: Some(qr.to_string()),
            status_code: None,
        }))
        .await;
    }

    pub async fn emit_open(&self) {
        self.state.writable.store(true, Ordering::Relaxed);
        self.emit(TransportEvent::ConnectionUpdate(ConnectionUpdate {
            connection: Some(ConnectionState::Open),
            qr: None,
            status_code: None,
        }))
        .await;
    }

    pub async fn emit_close(&self, status_code: Option<u16>) {
        self.state.writable.store(false, Ordering::Relaxed);
        self.emit(TransportEvent::ConnectionUpdate(ConnectionUpdate {
            connection: Some(ConnectionState::Close),
            qr: None,
            status_code,
        }))
        .await;
    }

    pub async fn emit_creds(&self, creds: Value) {
        self.emit(TransportEvent::CredsUpdate(creds)).await;
    }

    pub async fn emit_event(&self, event: ProtocolEvent) {
        self.emit(TransportEvent::Event(event)).await;
    }

    pub async fn emit_pong(&self) {
        self.emit(TransportEvent::Pong).await;
    }

    pub fn set_writable(&self, writable: bool) {
        self.state.writable.store(writable, Ordering::Relaxed);
    }

    /// Whether ping() automatically answers with a pong event.
    pub fn set_auto_pong(&self, enabled: bool) {
        self.state.auto_pong.store(enabled, Ordering::Relaxed);
    }

    pub fn set_probe_fail(&self, fail: bool) {
        self.state.probe_fail.store(fail, Ordering::Relaxed);
    }

    pub fn ping_count(&self) -> u32 {
        self.state.pings.load(Ordering::Relaxed)
    }

    pub fn probe_count(&self) -> u32 {
        self.state.probes.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Relaxed)
    }

    pub fn is_logged_out(&self) -> bool {
        self.state.logged_out.load(Ordering::Relaxed)
    }

    pub fn sent_messages(&self) -> Vec<(String, Value)> {
        lock(&self.state.sent).clone()
    }

    pub fn read_keys(&self) -> Vec<MessageKey> {
        lock(&self.state.read_keys).clone()
    }

    pub fn pairing_requests(&self) -> Vec<String> {
        lock(&self.state.pairing_requests).clone()
    }
}

struct MockTransport {
    events: mpsc::Sender<TransportEvent>,
    state: Arc<MockState>,
}

#[async_trait]
impl Transport for MockTransport {
    fn is_writable(&self) -> bool {
        self.state.writable.load(Ordering::Relaxed)
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        self.state.pings.fetch_add(1, Ordering::Relaxed);
        if self.state.auto_pong.load(Ordering::Relaxed) {
            let _ = self.events.send(TransportEvent::Pong).await;
        }
        Ok(())
    }

    async fn presence_probe(&self) -> Result<(), GatewayError> {
        self.state.probes.fetch_add(1, Ordering::Relaxed);
        if self.state.probe_fail.load(Ordering::Relaxed) {
            return Err(GatewayError::Transport {
                message: "presence probe failed".into(),
                source: None,
            });
        }
        Ok(())
    }

    async fn send_message(&self, to: &str, content: Value) -> Result<MessageKey, GatewayError> {
        if !self.is_writable() {
            return Err(GatewayError::Transport {
                message: "socket not writable".into(),
                source: None,
            });
        }
        lock(&self.state.sent).push((to.to_string(), content));
        let n = self.state.message_counter.fetch_add(1, Ordering::Relaxed);
        Ok(MessageKey {
            remote_jid: Some(to.to_string()),
            from_me: true,
            id: format!("MOCK{n:04}"),
            participant: None,
        })
    }

    async fn mark_read(&self, keys: &[MessageKey]) -> Result<(), GatewayError> {
        lock(&self.state.read_keys).extend(keys.iter().cloned());
        Ok(())
    }

    async fn request_pairing_code(&self, phone: &str) -> Result<String, GatewayError> {
        lock(&self.state.pairing_requests).push(phone.to_string());
        Ok("ABCD-EFGH".to_string())
    }

    async fn logout(&self) -> Result<(), GatewayError> {
        self.state.logged_out.store(true, Ordering::Relaxed);
        self.state.writable.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.state.writable.store(false, Ordering::Relaxed);
        if !self.state.closed.swap(true, Ordering::Relaxed) {
            let status_code = *lock(&self.state.close_code);
            let _ = self
                .events
                .send(TransportEvent::ConnectionUpdate(ConnectionUpdate {
                    connection: Some(ConnectionState::Close),
                    qr: None,
                    status_code,
                }))
                .await;
        }
        Ok(())
    }
}

/// Factory producing scripted mock transports.
pub struct MockTransportFactory {
    connects: AtomicU32,
    fail_next_connects: AtomicU32,
    /// Emit `open` right after `connecting` when the credential document
    /// is already registered. On by default; resurrection and restart
    /// flows then come up without manual scripting.
    auto_open: AtomicBool,
    /// Status code mock transports report when `close()` is called on
    /// them (default 428, the server-closed code).
    close_code: Mutex<Option<u16>>,
    controls: DashMap<String, Vec<MockControl>>,
}

impl Default for MockTransportFactory {
    fn default() -> Self {
        Self {
            connects: AtomicU32::new(0),
            fail_next_connects: AtomicU32::new(0),
            auto_open: AtomicBool::new(true),
            close_code: Mutex::new(Some(428)),
            controls: DashMap::new(),
        }
    }
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Make the next `n` connect calls fail with a transport error.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_next_connects.store(n, Ordering::Relaxed);
    }

    pub fn set_auto_open(&self, enabled: bool) {
        self.auto_open.store(enabled, Ordering::Relaxed);
    }

    pub fn set_close_code(&self, code: Option<u16>) {
        *lock(&self.close_code) = code;
    }

    /// Control handle for the most recent transport of a session.
    pub fn latest(&self, session_id: &str) -> Option<MockControl> {
        self.controls
            .get(session_id)
            .and_then(|list| list.last().cloned())
    }

    /// How many transports were built for a session.
    pub fn transport_count(&self, session_id: &str) -> usize {
        self.controls.get(session_id).map_or(0, |list| list.len())
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn connect(
        &self,
        session_id: &str,
        creds: Value,
    ) -> Result<TransportHandle, GatewayError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        if self.fail_next_connects.load(Ordering::Relaxed) > 0 {
            self.fail_next_connects.fetch_sub(1, Ordering::Relaxed);
            return Err(GatewayError::Transport {
                message: "mock connect failure".into(),
                source: None,
            });
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let state = Arc::new(MockState {
            writable: AtomicBool::new(true),
            auto_pong: AtomicBool::new(true),
            close_code: Mutex::new(*lock(&self.close_code)),
            ..MockState::default()
        });
        let control = MockControl {
            events: events_tx.clone(),
            state: Arc::clone(&state),
        };

        // Scripted connect sequence, buffered before the supervisor
        // starts consuming.
        let _ = events_tx
            .send(TransportEvent::ConnectionUpdate(ConnectionUpdate {
                connection: Some(ConnectionState::Connecting),
                qr: None,
                status_code: None,
            }))
            .await;
        if self.auto_open.load(Ordering::Relaxed) && me_id(&creds).is_some() {
            let _ = events_tx
                .send(TransportEvent::ConnectionUpdate(ConnectionUpdate {
                    connection: Some(ConnectionState::Open),
                    qr: None,
                    status_code: None,
                }))
                .await;
        }

        self.controls
            .entry(session_id.to_string())
            .or_default()
            .push(control);

        Ok(TransportHandle {
            transport: Arc::new(MockTransport {
                events: events_tx,
                state,
            }),
            events: events_rx,
        })
    }
}
