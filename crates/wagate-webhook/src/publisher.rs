// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtered fan-out from session supervisors into the delivery queue.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use wagate_core::{GatewayError, ProtocolEvent};

use crate::filter::EventFilter;
use crate::queue::{EnqueueOutcome, WebhookQueue};

/// What the supervisors hold: the admission filter plus the queue handle.
/// Enqueue failures never propagate back into event handling.
#[derive(Clone)]
pub struct EventPublisher {
    filter: Arc<EventFilter>,
    queue: Arc<WebhookQueue>,
}

impl EventPublisher {
    pub fn new(filter: EventFilter, queue: Arc<WebhookQueue>) -> Self {
        Self {
            filter: Arc::new(filter),
            queue,
        }
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Publish a transport event. Returns true when a job was enqueued.
    pub async fn publish_protocol(
        &self,
        session_id: &str,
        event: &ProtocolEvent,
    ) -> Result<bool, GatewayError> {
        let Some(payload) = self.filter.admit(event) else {
            debug!(session_id, event = event.name(), "event filtered, not delivered");
            return Ok(false);
        };
        self.publish_admitted(session_id, event.name(), payload).await
    }

    /// Publish a gateway-synthesized event (`qr.updated`,
    /// `session.connected`, ...). Subject to the event-name rules only.
    pub async fn publish(
        &self,
        session_id: &str,
        event: &str,
        payload: Value,
    ) -> Result<bool, GatewayError> {
        if !self.filter.should_send_event(event) {
            debug!(session_id, event, "event filtered, not delivered");
            return Ok(false);
        }
        self.publish_admitted(session_id, event, payload).await
    }

    async fn publish_admitted(
        &self,
        session_id: &str,
        event: &str,
        payload: Value,
    ) -> Result<bool, GatewayError> {
        match self.queue.enqueue(session_id, event, payload).await? {
            EnqueueOutcome::Enqueued { .. } => Ok(true),
            EnqueueOutcome::Disabled => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagate_config::FilterConfig;
    use wagate_core::types::{MessageBatch, MessageKey};
    use wagate_core::ChatMessage;
    use wagate_store::MemoryKv;

    fn publisher(filter: FilterConfig, enabled: bool) -> (EventPublisher, Arc<WebhookQueue>) {
        let queue = Arc::new(WebhookQueue::new(Arc::new(MemoryKv::new()), enabled));
        (
            EventPublisher::new(EventFilter::new(&filter), Arc::clone(&queue)),
            queue,
        )
    }

    fn group_only_batch() -> ProtocolEvent {
        ProtocolEvent::MessagesUpsert(MessageBatch {
            messages: vec![ChatMessage {
                key: MessageKey {
                    remote_jid: Some("team@g.us".into()),
                    from_me: false,
                    id: "M1".into(),
                    participant: None,
                },
                push_name: None,
                message: serde_json::json!({}),
                message_timestamp: None,
            }],
            kind: "notify".into(),
        })
    }

    #[tokio::test]
    async fn admitted_events_are_enqueued() {
        let (publisher, queue) = publisher(FilterConfig::default(), true);
        let sent = publisher
            .publish_protocol("alpha", &group_only_batch())
            .await
            .unwrap();
        assert!(sent);
        assert_eq!(queue.depths().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn filtered_batches_produce_no_jobs() {
        let config = FilterConfig {
            skip_groups: true,
            ..FilterConfig::default()
        };
        let (publisher, queue) = publisher(config, true);
        let sent = publisher
            .publish_protocol("alpha", &group_only_batch())
            .await
            .unwrap();
        assert!(!sent);
        assert_eq!(queue.depths().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn synthesized_events_respect_denied_set() {
        let config = FilterConfig {
            denied_events: vec!["qr.updated".into()],
            ..FilterConfig::default()
        };
        let (publisher, queue) = publisher(config, true);
        let sent = publisher
            .publish("alpha", "qr.updated", serde_json::json!({"qr": "abc"}))
            .await
            .unwrap();
        assert!(!sent);
        assert_eq!(queue.depths().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn disabled_queue_reports_not_sent() {
        let (publisher, _queue) = publisher(FilterConfig::default(), false);
        let sent = publisher
            .publish("alpha", "session.connected", serde_json::json!({}))
            .await
            .unwrap();
        assert!(!sent);
    }
}
