// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The delivery worker: the queue's only consumer.
//!
//! One worker per process. Each tick claims up to a batch of jobs,
//! dispatches them in parallel, and routes failures through the retry
//! ladder into the dead-letter list. Delivery is at-least-once and batch
//! dispatch is parallel, so the sink must tolerate reorder and
//! duplicates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wagate_config::WebhookConfig;
use wagate_core::GatewayError;

use crate::queue::{ClaimedJob, WebhookQueue};

/// Idle sleep between empty ticks.
const IDLE_SLEEP: Duration = Duration::from_millis(1000);

/// Authentication scheme for outbound POSTs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkAuth {
    None,
    Basic { user: String, password: String },
    Token(String),
    Bearer(String),
}

impl SinkAuth {
    pub fn from_config(config: &WebhookConfig) -> Self {
        match config.auth_type.as_str() {
            "basic" => SinkAuth::Basic {
                user: config.auth_user.clone().unwrap_or_default(),
                password: config.auth_password.clone().unwrap_or_default(),
            },
            "token" => SinkAuth::Token(config.auth_token.clone().unwrap_or_default()),
            "bearer" => SinkAuth::Bearer(config.auth_token.clone().unwrap_or_default()),
            _ => SinkAuth::None,
        }
    }

    /// Value for the `Authorization` header, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            SinkAuth::None => None,
            SinkAuth::Basic { user, password } => Some(format!(
                "Basic {}",
                BASE64.encode(format!("{user}:{password}"))
            )),
            SinkAuth::Token(token) => Some(format!("Token {token}")),
            SinkAuth::Bearer(token) => Some(format!("Bearer {token}")),
        }
    }
}

/// Resolved delivery settings; only exists when a sink URL is configured.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub url: String,
    pub auth: SinkAuth,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl SinkConfig {
    pub fn from_config(config: &WebhookConfig) -> Option<Self> {
        let url = config.url.clone()?;
        Some(Self {
            url,
            auth: SinkAuth::from_config(config),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            request_timeout_ms: config.request_timeout_ms,
        })
    }
}

/// Single consumer of the webhook queue.
pub struct DeliveryWorker {
    queue: Arc<WebhookQueue>,
    config: SinkConfig,
    client: reqwest::Client,
    cancel: CancellationToken,
    processing: AtomicBool,
}

impl DeliveryWorker {
    pub fn new(
        queue: Arc<WebhookQueue>,
        config: SinkConfig,
        cancel: CancellationToken,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| GatewayError::Delivery {
                message: "failed to build HTTP client".into(),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            queue,
            config,
            client,
            cancel,
            processing: AtomicBool::new(false),
        })
    }

    /// Whether a batch is being dispatched right now.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Relaxed)
    }

    /// Ask the worker loop to exit after the current tick.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Run until cancelled. Spawn exactly one of these per process.
    pub async fn run(self: Arc<Self>) {
        info!(sink = %self.config.url, "webhook worker started");
        while !self.cancel.is_cancelled() {
            let worked = match self.tick().await {
                Ok(worked) => worked,
                Err(err) => {
                    warn!(error = %err, "webhook worker tick failed");
                    false
                }
            };
            if !worked {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    _ = self.cancel.cancelled() => break,
                }
            }
        }
        info!("webhook worker stopped");
    }

    /// Claim and dispatch one batch. Returns false when the queue was
    /// empty.
    async fn tick(&self) -> Result<bool, GatewayError> {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        for _ in 0..self.config.batch_size {
            match self.queue.claim().await? {
                Some(claimed) => batch.push(claimed),
                None => break,
            }
        }
        if batch.is_empty() {
            return Ok(false);
        }

        self.processing.store(true, Ordering::Relaxed);
        futures::future::join_all(batch.into_iter().map(|claimed| self.deliver(claimed))).await;
        self.processing.store(false, Ordering::Relaxed);
        Ok(true)
    }

    async fn deliver(&self, claimed: ClaimedJob) {
        let body = json!({
            "sessionId": claimed.job.session_id,
            "event": claimed.job.event,
            "payload": claimed.job.payload,
            "ts": claimed.job.ts,
        });

        let mut request = self.client.post(&self.config.url).json(&body);
        if let Some(auth) = self.config.auth.header_value() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(job_id = %claimed.job.id, "webhook delivered");
                if let Err(err) = self.queue.ack(&claimed.raw).await {
                    warn!(job_id = %claimed.job.id, error = %err, "failed to ack delivered job");
                }
            }
            Ok(response) => {
                self.handle_failure(claimed, format!("HTTP {}", response.status().as_u16()))
                    .await;
            }
            Err(err) => {
                let desc = if err.is_timeout() {
                    "request timed out".to_string()
                } else {
                    err.to_string()
                };
                self.handle_failure(claimed, desc).await;
            }
        }
    }

    /// Retry ladder: re-push with exponential delay while attempts
    /// remain, otherwise dead-letter.
    async fn handle_failure(&self, claimed: ClaimedJob, error: String) {
        let job = match self.queue.register_failure(&claimed, error.clone()).await {
            Ok(job) => job,
            Err(err) => {
                warn!(job_id = %claimed.job.id, error = %err, "failed to record delivery failure");
                return;
            }
        };

        if job.attempts < self.config.max_retries {
            let delay = Duration::from_millis(
                self.config.retry_delay_ms * 2u64.pow(job.attempts.saturating_sub(1)),
            );
            debug!(
                job_id = %job.id,
                attempts = job.attempts,
                delay_ms = delay.as_millis() as u64,
                error,
                "webhook delivery failed, scheduling retry"
            );
            let queue = Arc::clone(&self.queue);
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                // On shutdown the delay is skipped so the job is back in
                // the durable queue before the process exits.
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
                if let Err(err) = queue.requeue(&job).await {
                    warn!(job_id = %job.id, error = %err, "failed to requeue webhook job");
                }
            });
        } else {
            warn!(
                job_id = %job.id,
                attempts = job.attempts,
                error,
                "webhook delivery exhausted retries, dead-lettering"
            );
            if let Err(err) = self.queue.dead_letter(&job).await {
                warn!(job_id = %job.id, error = %err, "failed to dead-letter webhook job");
            }
        }
    }
}
