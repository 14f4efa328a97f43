// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook fan-out for the wagate gateway: event/message admission
//! filtering, a KV-durable FIFO queue, and the single delivery worker
//! with retry ladder and dead-letter list.

pub mod engine;
pub mod filter;
pub mod publisher;
pub mod queue;
pub mod worker;

pub use engine::{WebhookEngine, WebhookStats};
pub use filter::EventFilter;
pub use publisher::EventPublisher;
pub use queue::{
    ClaimedJob, EnqueueOutcome, QueueDepths, WebhookQueue, FAILED_KEY, PROCESSING_KEY, QUEUE_KEY,
};
pub use worker::{DeliveryWorker, SinkAuth, SinkConfig};
