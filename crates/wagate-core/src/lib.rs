// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the wagate gateway.
//!
//! This crate provides the foundational trait definitions, error type, and
//! common types used throughout the wagate workspace: the session lifecycle
//! vocabulary, the typed protocol-event taxonomy, and the seams behind which
//! the chat-protocol transport and the KV service live.

pub mod error;
pub mod events;
pub mod traits;
pub mod types;

pub use error::GatewayError;
pub use events::{ConnectionState, ConnectionUpdate, ProtocolEvent, TransportEvent};
pub use traits::{Kv, Transport, TransportFactory, TransportHandle};
pub use types::{
    ChatMessage, Contact, DisconnectReason, GroupMetadata, MessageBatch, MessageKey,
    ReconnectDecision, SessionStatus, WebhookJob,
};
