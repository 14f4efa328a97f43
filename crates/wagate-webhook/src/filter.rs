// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decides which events and messages are forwarded to the webhook sink.
//!
//! Two layers: an event-name whitelist/blacklist, and per-message
//! address-class rules for `messages.upsert` batches. A batch whose
//! messages are all filtered out is suppressed entirely.

use std::collections::HashSet;

use serde_json::Value;
use wagate_config::FilterConfig;
use wagate_core::types::{is_channel_address, is_group_address, is_status_address};
use wagate_core::{ChatMessage, MessageBatch, ProtocolEvent};

/// Admission filter built from [`FilterConfig`].
#[derive(Debug, Clone)]
pub struct EventFilter {
    skip_status: bool,
    skip_groups: bool,
    skip_channels: bool,
    allowed_events: HashSet<String>,
    denied_events: HashSet<String>,
}

impl EventFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            skip_status: config.skip_status,
            skip_groups: config.skip_groups,
            skip_channels: config.skip_channels,
            // skip_blocked is reserved and intentionally not read here.
            allowed_events: config.allowed_events.iter().cloned().collect(),
            denied_events: config.denied_events.iter().cloned().collect(),
        }
    }

    /// Event-name rule: denied wins, then the whitelist when non-empty,
    /// otherwise admit.
    pub fn should_send_event(&self, name: &str) -> bool {
        if self.denied_events.contains(name) {
            return false;
        }
        if !self.allowed_events.is_empty() {
            return self.allowed_events.contains(name);
        }
        true
    }

    /// Per-message rule: requires an address, then applies the
    /// address-class toggles by suffix.
    pub fn should_send_message(&self, msg: &ChatMessage) -> bool {
        let Some(addr) = msg.key.remote_jid.as_deref() else {
            return false;
        };
        if self.skip_status && is_status_address(addr) {
            return false;
        }
        if self.skip_groups && is_group_address(addr) {
            return false;
        }
        if self.skip_channels && is_channel_address(addr) {
            return false;
        }
        true
    }

    /// Apply the per-message rules to a batch. `None` means nothing
    /// survived and the batch must not be delivered.
    pub fn filter_batch(&self, batch: &MessageBatch) -> Option<MessageBatch> {
        let messages: Vec<ChatMessage> = batch
            .messages
            .iter()
            .filter(|m| self.should_send_message(m))
            .cloned()
            .collect();
        if messages.is_empty() {
            return None;
        }
        Some(MessageBatch {
            messages,
            kind: batch.kind.clone(),
        })
    }

    /// Full admission decision for a protocol event. Returns the payload
    /// to deliver, with message batches already filtered down.
    pub fn admit(&self, event: &ProtocolEvent) -> Option<Value> {
        if !self.should_send_event(event.name()) {
            return None;
        }
        match event {
            ProtocolEvent::MessagesUpsert(batch) => self
                .filter_batch(batch)
                .and_then(|kept| serde_json::to_value(kept).ok()),
            other => Some(other.payload()),
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagate_core::MessageKey;

    fn message(addr: &str) -> ChatMessage {
        ChatMessage {
            key: MessageKey {
                remote_jid: Some(addr.to_string()),
                from_me: false,
                id: "M1".into(),
                participant: None,
            },
            push_name: None,
            message: serde_json::json!({"conversation": "hi"}),
            message_timestamp: None,
        }
    }

    fn batch(addrs: &[&str]) -> MessageBatch {
        MessageBatch {
            messages: addrs.iter().map(|a| message(a)).collect(),
            kind: "notify".into(),
        }
    }

    #[test]
    fn empty_sets_admit_all_events() {
        let filter = EventFilter::default();
        assert!(filter.should_send_event("messages.upsert"));
        assert!(filter.should_send_event("qr.updated"));
        assert!(filter.should_send_event("anything.else"));
    }

    #[test]
    fn denied_wins_over_allowed() {
        let filter = EventFilter::new(&FilterConfig {
            allowed_events: vec!["call".into()],
            denied_events: vec!["call".into()],
            ..FilterConfig::default()
        });
        assert!(!filter.should_send_event("call"));
    }

    #[test]
    fn whitelist_excludes_unlisted_events() {
        let filter = EventFilter::new(&FilterConfig {
            allowed_events: vec!["messages.upsert".into()],
            ..FilterConfig::default()
        });
        assert!(filter.should_send_event("messages.upsert"));
        assert!(!filter.should_send_event("presence.update"));
    }

    #[test]
    fn default_toggles_drop_status_and_channels_but_keep_groups() {
        let filter = EventFilter::default();
        assert!(!filter.should_send_message(&message("status@broadcast")));
        assert!(!filter.should_send_message(&message("xyz@broadcast")));
        assert!(!filter.should_send_message(&message("news@newsletter")));
        assert!(filter.should_send_message(&message("team@g.us")));
        assert!(filter.should_send_message(&message("123@s.whatsapp.net")));
    }

    #[test]
    fn skip_status_false_admits_broadcast() {
        let filter = EventFilter::new(&FilterConfig {
            skip_status: false,
            ..FilterConfig::default()
        });
        assert!(filter.should_send_message(&message("status@broadcast")));
    }

    #[test]
    fn message_without_address_is_dropped() {
        let filter = EventFilter::default();
        let mut msg = message("123@s.whatsapp.net");
        msg.key.remote_jid = None;
        assert!(!filter.should_send_message(&msg));
    }

    #[test]
    fn fully_filtered_batch_is_suppressed() {
        let filter = EventFilter::new(&FilterConfig {
            skip_groups: true,
            ..FilterConfig::default()
        });
        let event = ProtocolEvent::MessagesUpsert(batch(&["a@g.us", "status@broadcast"]));
        assert_eq!(filter.admit(&event), None);
    }

    #[test]
    fn partially_filtered_batch_keeps_survivors_only() {
        let filter = EventFilter::new(&FilterConfig {
            skip_groups: true,
            ..FilterConfig::default()
        });
        let event =
            ProtocolEvent::MessagesUpsert(batch(&["a@g.us", "123@s.whatsapp.net"]));
        let payload = filter.admit(&event).unwrap();
        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["key"]["remoteJid"], "123@s.whatsapp.net");
    }

    #[test]
    fn non_message_events_pass_payload_through() {
        let filter = EventFilter::default();
        let event = ProtocolEvent::PresenceUpdate(serde_json::json!({"id": "1@s.whatsapp.net"}));
        assert_eq!(
            filter.admit(&event),
            Some(serde_json::json!({"id": "1@s.whatsapp.net"}))
        );
    }
}
