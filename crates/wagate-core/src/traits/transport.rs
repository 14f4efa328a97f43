// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter trait for the underlying chat-protocol library.
//!
//! The supervisor exclusively owns a transport plus the receiving end of
//! its event stream. Commands flow supervisor -> transport through this
//! trait; everything else flows back through [`TransportEvent`]s.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::events::TransportEvent;
use crate::types::MessageKey;

/// A live protocol socket bound to one session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the underlying socket accepts writes right now.
    fn is_writable(&self) -> bool;

    /// Send a transport-level ping. The matching [`TransportEvent::Pong`]
    /// arrives on the event stream.
    async fn ping(&self) -> Result<(), GatewayError>;

    /// Cheap protocol round-trip (presence update) used by the health
    /// prober to distinguish idle from dead.
    async fn presence_probe(&self) -> Result<(), GatewayError>;

    /// Send an already-built message envelope to an address.
    async fn send_message(&self, to: &str, content: Value) -> Result<MessageKey, GatewayError>;

    /// Acknowledge messages as read.
    async fn mark_read(&self, keys: &[MessageKey]) -> Result<(), GatewayError>;

    /// Request a pairing code for the given phone number (E.164 digits,
    /// no `+`). Alternative to QR pairing.
    async fn request_pairing_code(&self, phone: &str) -> Result<String, GatewayError>;

    /// Unlink this device server-side. Terminal.
    async fn logout(&self) -> Result<(), GatewayError>;

    /// Close the socket. A `connection.update` close event follows on the
    /// stream if it is still being consumed.
    async fn close(&self) -> Result<(), GatewayError>;
}

/// A freshly constructed transport and the stream it emits events on.
pub struct TransportHandle {
    pub transport: std::sync::Arc<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Constructs transports. Implementations own connect/QR timeouts
/// (60s each) and emit progress as `connection.update` events.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a new socket for `session_id` using the given credential
    /// document. An empty or unregistered document starts QR pairing.
    async fn connect(
        &self,
        session_id: &str,
        creds: Value,
    ) -> Result<TransportHandle, GatewayError>;
}
