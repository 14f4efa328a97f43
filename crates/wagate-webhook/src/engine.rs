// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembles the queue and the worker into one service with the
//! operator-facing surface: stats, manual retry, stop.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wagate_config::WebhookConfig;
use wagate_core::{GatewayError, Kv};

use crate::queue::WebhookQueue;
use crate::worker::{DeliveryWorker, SinkConfig};

/// Operator view of the delivery engine.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStats {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
    pub is_processing: bool,
}

/// The webhook delivery engine: durable queue plus its single worker.
pub struct WebhookEngine {
    queue: Arc<WebhookQueue>,
    worker: Option<Arc<DeliveryWorker>>,
    cancel: CancellationToken,
}

impl WebhookEngine {
    /// Build the engine. Without a sink URL the queue reports enqueues as
    /// disabled and no worker is created.
    pub fn new(
        kv: Arc<dyn Kv>,
        config: &WebhookConfig,
        cancel: CancellationToken,
    ) -> Result<Self, GatewayError> {
        let sink = SinkConfig::from_config(config);
        if sink.is_none() {
            info!("no webhook sink configured, delivery disabled");
        }
        let queue = Arc::new(WebhookQueue::new(kv, sink.is_some()));
        let worker = sink
            .map(|sink| {
                DeliveryWorker::new(Arc::clone(&queue), sink, cancel.clone()).map(Arc::new)
            })
            .transpose()?;
        Ok(Self {
            queue,
            worker,
            cancel,
        })
    }

    /// Spawn the worker loop, if delivery is enabled.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        self.worker
            .as_ref()
            .map(|worker| tokio::spawn(Arc::clone(worker).run()))
    }

    /// Shared handle used by publishers to enqueue jobs.
    pub fn queue(&self) -> Arc<WebhookQueue> {
        Arc::clone(&self.queue)
    }

    pub async fn stats(&self) -> Result<WebhookStats, GatewayError> {
        let depths = self.queue.depths().await?;
        Ok(WebhookStats {
            pending: depths.pending,
            processing: depths.processing,
            failed: depths.failed,
            is_processing: self
                .worker
                .as_ref()
                .is_some_and(|worker| worker.is_processing()),
        })
    }

    /// Move up to `limit` dead-lettered jobs back onto the queue.
    pub async fn retry_failed(&self, limit: u64) -> Result<u64, GatewayError> {
        self.queue.retry_failed(limit).await
    }

    /// Stop the worker after its current tick.
    pub fn stop_processing(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagate_store::MemoryKv;

    #[tokio::test]
    async fn disabled_engine_reports_empty_stats_and_no_worker() {
        let engine = WebhookEngine::new(
            Arc::new(MemoryKv::new()),
            &WebhookConfig::default(),
            CancellationToken::new(),
        )
        .unwrap();
        assert!(engine.start().is_none());
        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert!(!stats.is_processing);
        assert!(!engine.queue().is_enabled());
    }

    #[tokio::test]
    async fn enabled_engine_exposes_queue() {
        let config = WebhookConfig {
            url: Some("http://sink.example/hook".into()),
            ..WebhookConfig::default()
        };
        let engine = WebhookEngine::new(
            Arc::new(MemoryKv::new()),
            &config,
            CancellationToken::new(),
        )
        .unwrap();
        engine
            .queue()
            .enqueue("alpha", "call", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(engine.stats().await.unwrap().pending, 1);
    }
}
