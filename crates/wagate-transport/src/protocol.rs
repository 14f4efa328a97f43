// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire mapping between runner messages and typed transport events.
//!
//! The runner emits JSON lines. Three shapes matter: request responses
//! (`{"id":n,...}`), signal-key requests (`{"keyreq":n,...}`), and
//! protocol events (`{"event":name,"payload":...}`). This module maps
//! the event shape onto [`TransportEvent`]; the socket plumbing lives in
//! `bridge.rs`.

use serde_json::Value;
use tracing::warn;
use wagate_core::events::{ConnectionState, ConnectionUpdate};
use wagate_core::{ProtocolEvent, TransportEvent};

/// Map a runner event line to a typed transport event. Unknown names and
/// unparsable payloads are dropped with a warning rather than breaking
/// the stream.
pub fn map_event(name: &str, payload: Value) -> Option<TransportEvent> {
    match name {
        "connection.update" => Some(TransportEvent::ConnectionUpdate(parse_connection_update(
            &payload,
        ))),
        "creds.update" => Some(TransportEvent::CredsUpdate(payload)),
        "pong" => Some(TransportEvent::Pong),
        "messages.upsert" => parse_typed(name, payload).map(|batch| {
            TransportEvent::Event(ProtocolEvent::MessagesUpsert(batch))
        }),
        "messages.update" => Some(TransportEvent::Event(ProtocolEvent::MessagesUpdate(payload))),
        "messages.delete" => Some(TransportEvent::Event(ProtocolEvent::MessagesDelete(payload))),
        "messages.reaction" => Some(TransportEvent::Event(ProtocolEvent::MessagesReaction(
            payload,
        ))),
        "message-receipt.update" => Some(TransportEvent::Event(
            ProtocolEvent::MessageReceiptUpdate(payload),
        )),
        "chats.upsert" => Some(TransportEvent::Event(ProtocolEvent::ChatsUpsert(payload))),
        "chats.update" => Some(TransportEvent::Event(ProtocolEvent::ChatsUpdate(payload))),
        "chats.delete" => Some(TransportEvent::Event(ProtocolEvent::ChatsDelete(payload))),
        "contacts.upsert" => parse_typed(name, payload)
            .map(|contacts| TransportEvent::Event(ProtocolEvent::ContactsUpsert(contacts))),
        "contacts.update" => parse_typed(name, payload)
            .map(|contacts| TransportEvent::Event(ProtocolEvent::ContactsUpdate(contacts))),
        "groups.upsert" => parse_typed(name, payload)
            .map(|groups| TransportEvent::Event(ProtocolEvent::GroupsUpsert(groups))),
        "groups.update" => Some(TransportEvent::Event(ProtocolEvent::GroupsUpdate(payload))),
        "group-participants.update" => Some(TransportEvent::Event(
            ProtocolEvent::GroupParticipantsUpdate(payload),
        )),
        "messaging-history.set" => Some(TransportEvent::Event(
            ProtocolEvent::MessagingHistorySet(payload),
        )),
        "presence.update" => Some(TransportEvent::Event(ProtocolEvent::PresenceUpdate(payload))),
        "call" => Some(TransportEvent::Event(ProtocolEvent::Call(payload))),
        "blocklist.set" => Some(TransportEvent::Event(ProtocolEvent::BlocklistSet(payload))),
        "blocklist.update" => Some(TransportEvent::Event(ProtocolEvent::BlocklistUpdate(
            payload,
        ))),
        other => {
            warn!(event = other, "dropping unknown runner event");
            None
        }
    }
}

fn parse_typed<T: serde::de::DeserializeOwned>(name: &str, payload: Value) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(event = name, error = %err, "dropping unparsable runner event");
            None
        }
    }
}

/// Parse the library's `connection.update` shape, including the nested
/// disconnect code at `lastDisconnect.error.output.statusCode`.
fn parse_connection_update(payload: &Value) -> ConnectionUpdate {
    let connection = match payload.get("connection").and_then(Value::as_str) {
        Some("connecting") => Some(ConnectionState::Connecting),
        Some("open") => Some(ConnectionState::Open),
        Some("close") => Some(ConnectionState::Close),
        _ => None,
    };
    let qr = payload
        .get("qr")
        .and_then(Value::as_str)
        .map(str::to_string);
    let status_code = payload
        .pointer("/lastDisconnect/error/output/statusCode")
        .or_else(|| payload.get("statusCode"))
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());
    ConnectionUpdate {
        connection,
        qr,
        status_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connection_update_with_nested_disconnect_code() {
        let event = map_event(
            "connection.update",
            json!({
                "connection": "close",
                "lastDisconnect": { "error": { "output": { "statusCode": 401 } } },
            }),
        );
        let Some(TransportEvent::ConnectionUpdate(update)) = event else {
            panic!("expected connection update");
        };
        assert_eq!(update.connection, Some(ConnectionState::Close));
        assert_eq!(update.status_code, Some(401));
    }

    #[test]
    fn connection_update_with_flat_code_and_qr() {
        let event = map_event(
            "connection.update",
            json!({ "qr": "2@pairing-payload", "statusCode": 515 }),
        );
        let Some(TransportEvent::ConnectionUpdate(update)) = event else {
            panic!("expected connection update");
        };
        assert_eq!(update.connection, None);
        assert_eq!(update.qr.as_deref(), Some("2@pairing-payload"));
        assert_eq!(update.status_code, Some(515));
    }

    #[test]
    fn creds_update_is_internal() {
        let event = map_event("creds.update", json!({"me": {"id": "1@s.whatsapp.net"}}));
        assert!(matches!(event, Some(TransportEvent::CredsUpdate(_))));
    }

    #[test]
    fn messages_upsert_parses_typed_batch() {
        let event = map_event(
            "messages.upsert",
            json!({
                "type": "notify",
                "messages": [{
                    "key": { "remoteJid": "123@s.whatsapp.net", "fromMe": false, "id": "A1" },
                    "pushName": "Ada",
                    "message": { "conversation": "hi" },
                    "messageTimestamp": 1_700_000_000,
                }],
            }),
        );
        let Some(TransportEvent::Event(ProtocolEvent::MessagesUpsert(batch))) = event else {
            panic!("expected typed batch");
        };
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(batch.messages[0].push_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn malformed_upsert_is_dropped_not_propagated() {
        let event = map_event("messages.upsert", json!({"messages": "not-an-array"}));
        assert!(event.is_none());
    }

    #[test]
    fn unknown_event_is_dropped() {
        assert!(map_event("labs.experimental", json!({})).is_none());
    }

    #[test]
    fn every_taxonomy_name_maps() {
        for name in [
            "messages.upsert",
            "messages.update",
            "messages.delete",
            "messages.reaction",
            "message-receipt.update",
            "chats.upsert",
            "chats.update",
            "chats.delete",
            "contacts.upsert",
            "contacts.update",
            "groups.upsert",
            "groups.update",
            "group-participants.update",
            "messaging-history.set",
            "presence.update",
            "call",
            "blocklist.set",
            "blocklist.update",
        ] {
            let payload = match name {
                "messages.upsert" => json!({"type": "notify", "messages": []}),
                "contacts.upsert" | "contacts.update" | "groups.upsert" => json!([]),
                _ => json!({}),
            };
            assert!(map_event(name, payload).is_some(), "{name} should map");
        }
    }
}
