// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value service adapter trait.
//!
//! Narrow surface over the external KV store: string slots for credential
//! documents and list primitives for the webhook queues. The only
//! multi-key requirement is `rpoplpush`, the atomic claim that preserves
//! at-least-once delivery across crashes; there are no cross-key
//! transactions.

use async_trait::async_trait;

use crate::error::GatewayError;

#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), GatewayError>;

    /// Bulk write in a single pipelined batch. A `None` value deletes the
    /// key.
    async fn set_many(&self, pairs: Vec<(String, Option<String>)>) -> Result<(), GatewayError>;

    /// Delete keys; returns how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, GatewayError>;

    /// Enumerate keys matching a glob pattern with a cursor scan
    /// (page size 1000). Never a blocking enumerate-all.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, GatewayError>;

    /// Push to the head of a list; returns the new length.
    async fn lpush(&self, list: &str, value: &str) -> Result<u64, GatewayError>;

    /// Pop from the tail of a list.
    async fn rpop(&self, list: &str) -> Result<Option<String>, GatewayError>;

    /// Atomically move the tail of `src` to the head of `dst`.
    async fn rpoplpush(&self, src: &str, dst: &str) -> Result<Option<String>, GatewayError>;

    /// Remove all occurrences of `value` from a list; returns the count
    /// removed.
    async fn lrem(&self, list: &str, value: &str) -> Result<u64, GatewayError>;

    async fn llen(&self, list: &str) -> Result<u64, GatewayError>;

    /// Liveness probe against the KV service.
    async fn ping(&self) -> Result<(), GatewayError>;
}
