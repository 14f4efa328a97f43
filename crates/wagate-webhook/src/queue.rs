// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable FIFO queue for webhook jobs, layered on KV list primitives.
//!
//! Three lists: `webhook:queue` (pending), `webhook:processing`
//! (in-flight), `webhook:failed` (dead-letter). Pushes are head-side; the
//! worker claims the oldest job by atomically moving the tail of the
//! pending list onto the processing list, so a crash between claim and
//! acknowledge leaves the job recoverable rather than lost.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;
use wagate_core::types::now_ms;
use wagate_core::{GatewayError, Kv, WebhookJob};
use wagate_store::encode_buffers;

pub const QUEUE_KEY: &str = "webhook:queue";
pub const PROCESSING_KEY: &str = "webhook:processing";
pub const FAILED_KEY: &str = "webhook:failed";

/// Bound on the per-job failure audit trail.
const MAX_JOB_ERRORS: usize = 10;

/// Result of an enqueue request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued { id: String },
    /// No sink URL is configured; the event is dropped by design.
    Disabled,
}

/// Queue depths as seen by operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDepths {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
}

/// A claimed job together with its raw list entry. The raw string is the
/// removal token: list removal must match the exact bytes that were
/// claimed, not a re-serialization.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: WebhookJob,
    pub raw: String,
}

/// Handle to the three webhook lists.
#[derive(Clone)]
pub struct WebhookQueue {
    kv: Arc<dyn Kv>,
    enabled: bool,
}

impl WebhookQueue {
    /// `enabled` is false when no sink URL is configured; enqueues then
    /// report [`EnqueueOutcome::Disabled`] without touching the store.
    pub fn new(kv: Arc<dyn Kv>, enabled: bool) -> Self {
        Self { kv, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a job for delivery. Binary fields in the payload are
    /// normalized to the tagged-buffer encoding first.
    pub async fn enqueue(
        &self,
        session_id: &str,
        event: &str,
        payload: Value,
    ) -> Result<EnqueueOutcome, GatewayError> {
        if !self.enabled {
            return Ok(EnqueueOutcome::Disabled);
        }
        let job = WebhookJob {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            event: event.to_string(),
            payload: encode_buffers(&payload),
            ts: now_ms(),
            attempts: 0,
            last_attempt: None,
            errors: Vec::new(),
        };
        let raw = serde_json::to_string(&job).map_err(GatewayError::store)?;
        self.kv.lpush(QUEUE_KEY, &raw).await?;
        debug!(session_id, event, job_id = %job.id, "webhook job enqueued");
        Ok(EnqueueOutcome::Enqueued { id: job.id })
    }

    /// Atomically claim the oldest pending job into the processing list.
    /// Entries that fail to parse are dropped from processing and
    /// skipped.
    pub async fn claim(&self) -> Result<Option<ClaimedJob>, GatewayError> {
        loop {
            let Some(raw) = self.kv.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await? else {
                return Ok(None);
            };
            match serde_json::from_str::<WebhookJob>(&raw) {
                Ok(job) => return Ok(Some(ClaimedJob { job, raw })),
                Err(err) => {
                    tracing::warn!(error = %err, "dropping unparsable queue entry");
                    self.kv.lrem(PROCESSING_KEY, &raw).await?;
                }
            }
        }
    }

    /// Remove a delivered (or re-routed) job from the processing list.
    pub async fn ack(&self, claimed_raw: &str) -> Result<(), GatewayError> {
        self.kv.lrem(PROCESSING_KEY, claimed_raw).await?;
        Ok(())
    }

    /// Record a failed attempt on a claimed job and return the updated
    /// job, removed from processing. The caller decides between re-push
    /// and dead-letter based on [`WebhookJob::attempts`].
    pub async fn register_failure(
        &self,
        claimed: &ClaimedJob,
        error: String,
    ) -> Result<WebhookJob, GatewayError> {
        self.ack(&claimed.raw).await?;
        let mut job = claimed.job.clone();
        job.attempts += 1;
        job.last_attempt = Some(now_ms());
        job.errors.push(error);
        if job.errors.len() > MAX_JOB_ERRORS {
            let excess = job.errors.len() - MAX_JOB_ERRORS;
            job.errors.drain(..excess);
        }
        Ok(job)
    }

    /// Re-push a job for another delivery round.
    pub async fn requeue(&self, job: &WebhookJob) -> Result<(), GatewayError> {
        let raw = serde_json::to_string(job).map_err(GatewayError::store)?;
        self.kv.lpush(QUEUE_KEY, &raw).await?;
        Ok(())
    }

    /// Park a job on the dead-letter list.
    pub async fn dead_letter(&self, job: &WebhookJob) -> Result<(), GatewayError> {
        let raw = serde_json::to_string(job).map_err(GatewayError::store)?;
        self.kv.lpush(FAILED_KEY, &raw).await?;
        debug!(job_id = %job.id, attempts = job.attempts, "webhook job dead-lettered");
        Ok(())
    }

    /// Move up to `limit` dead-lettered jobs back onto the pending list
    /// with their attempt history reset. Returns how many moved.
    pub async fn retry_failed(&self, limit: u64) -> Result<u64, GatewayError> {
        let mut moved = 0;
        while moved < limit {
            let Some(raw) = self.kv.rpop(FAILED_KEY).await? else {
                break;
            };
            let mut job: WebhookJob = match serde_json::from_str(&raw) {
                Ok(job) => job,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping unparsable dead-letter entry");
                    continue;
                }
            };
            job.attempts = 0;
            job.last_attempt = None;
            job.errors.clear();
            self.requeue(&job).await?;
            moved += 1;
        }
        Ok(moved)
    }

    pub async fn depths(&self) -> Result<QueueDepths, GatewayError> {
        Ok(QueueDepths {
            pending: self.kv.llen(QUEUE_KEY).await?,
            processing: self.kv.llen(PROCESSING_KEY).await?,
            failed: self.kv.llen(FAILED_KEY).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wagate_store::MemoryKv;

    fn queue() -> (WebhookQueue, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        (WebhookQueue::new(kv.clone(), true), kv)
    }

    #[tokio::test]
    async fn enqueue_disabled_without_sink() {
        let kv = Arc::new(MemoryKv::new());
        let q = WebhookQueue::new(kv.clone(), false);
        let outcome = q.enqueue("alpha", "call", json!({})).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::Disabled);
        assert_eq!(q.depths().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn claim_moves_oldest_job_to_processing() {
        let (q, _kv) = queue();
        q.enqueue("alpha", "first.event", json!({"n": 1})).await.unwrap();
        q.enqueue("alpha", "second.event", json!({"n": 2})).await.unwrap();

        let claimed = q.claim().await.unwrap().unwrap();
        assert_eq!(claimed.job.event, "first.event");
        let depths = q.depths().await.unwrap();
        assert_eq!((depths.pending, depths.processing), (1, 1));

        q.ack(&claimed.raw).await.unwrap();
        assert_eq!(q.depths().await.unwrap().processing, 0);
    }

    #[tokio::test]
    async fn enqueue_normalizes_buffer_payloads() {
        let (q, _kv) = queue();
        q.enqueue(
            "alpha",
            "messages.upsert",
            json!({"media": {"type": "Buffer", "data": [1, 2, 3]}}),
        )
        .await
        .unwrap();
        let claimed = q.claim().await.unwrap().unwrap();
        assert!(claimed.job.payload["media"]["data"].is_string());
    }

    #[tokio::test]
    async fn failure_ladder_ends_in_dead_letter() {
        let (q, _kv) = queue();
        q.enqueue("alpha", "call", json!({})).await.unwrap();

        let mut job = {
            let claimed = q.claim().await.unwrap().unwrap();
            q.register_failure(&claimed, "HTTP 500".into()).await.unwrap()
        };
        assert_eq!(job.attempts, 1);
        assert_eq!(job.errors, vec!["HTTP 500"]);

        // Two more rounds through the ladder.
        for attempt in 2..=3u32 {
            q.requeue(&job).await.unwrap();
            let claimed = q.claim().await.unwrap().unwrap();
            job = q
                .register_failure(&claimed, format!("HTTP 500 #{attempt}"))
                .await
                .unwrap();
            assert_eq!(job.attempts, attempt);
        }
        q.dead_letter(&job).await.unwrap();

        let depths = q.depths().await.unwrap();
        assert_eq!((depths.pending, depths.processing, depths.failed), (0, 0, 1));
        assert_eq!(job.errors.len(), 3);
    }

    #[tokio::test]
    async fn retry_failed_resets_history() {
        let (q, _kv) = queue();
        q.enqueue("alpha", "call", json!({})).await.unwrap();
        let claimed = q.claim().await.unwrap().unwrap();
        let job = q.register_failure(&claimed, "boom".into()).await.unwrap();
        q.dead_letter(&job).await.unwrap();

        assert_eq!(q.retry_failed(5).await.unwrap(), 1);
        assert_eq!(q.retry_failed(5).await.unwrap(), 0);

        let retried = q.claim().await.unwrap().unwrap();
        assert_eq!(retried.job.id, job.id);
        assert_eq!(retried.job.attempts, 0);
        assert!(retried.job.errors.is_empty());
    }

    #[tokio::test]
    async fn error_trail_is_bounded() {
        let (q, _kv) = queue();
        q.enqueue("alpha", "call", json!({})).await.unwrap();
        let mut job = {
            let claimed = q.claim().await.unwrap().unwrap();
            q.register_failure(&claimed, "e0".into()).await.unwrap()
        };
        for i in 1..20 {
            q.requeue(&job).await.unwrap();
            let claimed = q.claim().await.unwrap().unwrap();
            job = q.register_failure(&claimed, format!("e{i}")).await.unwrap();
        }
        assert_eq!(job.errors.len(), 10);
        assert_eq!(job.errors.last().unwrap(), "e19");
    }
}
