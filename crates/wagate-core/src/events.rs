// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed event taxonomy emitted by the transport.
//!
//! The underlying protocol library binds many event-name strings to
//! callbacks; here that surface is a single sum type so the supervisor
//! handles each variant exactly once and the filter operates on the
//! variant tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ChatMessage, Contact, GroupMetadata, MessageBatch};

/// Events synthesized by the gateway itself (not transport variants).
pub mod names {
    pub const CONNECTION_UPDATE: &str = "connection.update";
    pub const QR_UPDATED: &str = "qr.updated";
    pub const SESSION_CONNECTED: &str = "session.connected";
    pub const SESSION_DISCONNECTED: &str = "session.disconnected";
}

/// Connection phase reported by `connection.update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

/// A `connection.update` notification from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionState>,
    /// Pairing string, present while unauthenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    /// Disconnect status code, present on close.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Protocol events forwarded to the webhook sink (after filtering).
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    MessagesUpsert(MessageBatch),
    MessagesUpdate(Value),
    MessagesDelete(Value),
    MessagesReaction(Value),
    MessageReceiptUpdate(Value),
    ChatsUpsert(Value),
    ChatsUpdate(Value),
    ChatsDelete(Value),
    ContactsUpsert(Vec<Contact>),
    ContactsUpdate(Vec<Contact>),
    GroupsUpsert(Vec<GroupMetadata>),
    GroupsUpdate(Value),
    GroupParticipantsUpdate(Value),
    MessagingHistorySet(Value),
    PresenceUpdate(Value),
    Call(Value),
    BlocklistSet(Value),
    BlocklistUpdate(Value),
}

impl ProtocolEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::MessagesUpsert(_) => "messages.upsert",
            ProtocolEvent::MessagesUpdate(_) => "messages.update",
            ProtocolEvent::MessagesDelete(_) => "messages.delete",
            ProtocolEvent::MessagesReaction(_) => "messages.reaction",
            ProtocolEvent::MessageReceiptUpdate(_) => "message-receipt.update",
            ProtocolEvent::ChatsUpsert(_) => "chats.upsert",
            ProtocolEvent::ChatsUpdate(_) => "chats.update",
            ProtocolEvent::ChatsDelete(_) => "chats.delete",
            ProtocolEvent::ContactsUpsert(_) => "contacts.upsert",
            ProtocolEvent::ContactsUpdate(_) => "contacts.update",
            ProtocolEvent::GroupsUpsert(_) => "groups.upsert",
            ProtocolEvent::GroupsUpdate(_) => "groups.update",
            ProtocolEvent::GroupParticipantsUpdate(_) => "group-participants.update",
            ProtocolEvent::MessagingHistorySet(_) => "messaging-history.set",
            ProtocolEvent::PresenceUpdate(_) => "presence.update",
            ProtocolEvent::Call(_) => "call",
            ProtocolEvent::BlocklistSet(_) => "blocklist.set",
            ProtocolEvent::BlocklistUpdate(_) => "blocklist.update",
        }
    }

    /// Serialize the event payload for webhook delivery.
    pub fn payload(&self) -> Value {
        match self {
            ProtocolEvent::MessagesUpsert(batch) => {
                serde_json::to_value(batch).unwrap_or(Value::Null)
            }
            ProtocolEvent::ContactsUpsert(contacts) | ProtocolEvent::ContactsUpdate(contacts) => {
                serde_json::to_value(contacts).unwrap_or(Value::Null)
            }
            ProtocolEvent::GroupsUpsert(groups) => {
                serde_json::to_value(groups).unwrap_or(Value::Null)
            }
            ProtocolEvent::MessagesUpdate(v)
            | ProtocolEvent::MessagesDelete(v)
            | ProtocolEvent::MessagesReaction(v)
            | ProtocolEvent::MessageReceiptUpdate(v)
            | ProtocolEvent::ChatsUpsert(v)
            | ProtocolEvent::ChatsUpdate(v)
            | ProtocolEvent::ChatsDelete(v)
            | ProtocolEvent::GroupsUpdate(v)
            | ProtocolEvent::GroupParticipantsUpdate(v)
            | ProtocolEvent::MessagingHistorySet(v)
            | ProtocolEvent::PresenceUpdate(v)
            | ProtocolEvent::Call(v)
            | ProtocolEvent::BlocklistSet(v)
            | ProtocolEvent::BlocklistUpdate(v) => v.clone(),
        }
    }

    /// Messages carried by this event, if it is a message batch.
    pub fn messages(&self) -> Option<&[ChatMessage]> {
        match self {
            ProtocolEvent::MessagesUpsert(batch) => Some(&batch.messages),
            _ => None,
        }
    }
}

/// Everything a transport can emit to its supervisor.
///
/// The transport never calls back into the supervisor; this stream is the
/// only channel between them.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    ConnectionUpdate(ConnectionUpdate),
    /// Credential material changed and must be persisted before the
    /// session may be considered open. Never forwarded to the sink.
    CredsUpdate(Value),
    /// Reply to a transport-level ping.
    Pong,
    Event(ProtocolEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageKey, MessageBatch};

    #[test]
    fn every_variant_has_a_dotted_or_bare_name() {
        let events = [
            ProtocolEvent::MessagesUpsert(MessageBatch {
                messages: vec![],
                kind: "notify".into(),
            }),
            ProtocolEvent::MessagesUpdate(Value::Null),
            ProtocolEvent::MessagesDelete(Value::Null),
            ProtocolEvent::MessagesReaction(Value::Null),
            ProtocolEvent::MessageReceiptUpdate(Value::Null),
            ProtocolEvent::ChatsUpsert(Value::Null),
            ProtocolEvent::ChatsUpdate(Value::Null),
            ProtocolEvent::ChatsDelete(Value::Null),
            ProtocolEvent::ContactsUpsert(vec![]),
            ProtocolEvent::ContactsUpdate(vec![]),
            ProtocolEvent::GroupsUpsert(vec![]),
            ProtocolEvent::GroupsUpdate(Value::Null),
            ProtocolEvent::GroupParticipantsUpdate(Value::Null),
            ProtocolEvent::MessagingHistorySet(Value::Null),
            ProtocolEvent::PresenceUpdate(Value::Null),
            ProtocolEvent::Call(Value::Null),
            ProtocolEvent::BlocklistSet(Value::Null),
            ProtocolEvent::BlocklistUpdate(Value::Null),
        ];
        assert_eq!(events.len(), 18);
        for ev in &events {
            assert!(!ev.name().is_empty());
            assert!(ev.name().chars().all(|c| c.is_ascii_lowercase()
                || c == '.'
                || c == '-'));
        }
    }

    #[test]
    fn upsert_payload_includes_messages() {
        let batch = MessageBatch {
            messages: vec![ChatMessage {
                key: MessageKey {
                    remote_jid: Some("1@s.whatsapp.net".into()),
                    from_me: false,
                    id: "M1".into(),
                    participant: None,
                },
                push_name: Some("Ada".into()),
                message: serde_json::json!({"conversation": "hi"}),
                message_timestamp: Some(1_700_000_000),
            }],
            kind: "notify".into(),
        };
        let payload = ProtocolEvent::MessagesUpsert(batch).payload();
        assert_eq!(payload["messages"][0]["pushName"], "Ada");
        assert_eq!(payload["type"], "notify");
    }
}
