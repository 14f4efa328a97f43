// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis-backed implementation of the [`Kv`] trait.
//!
//! One process-wide `ConnectionManager` multiplexes all commands and
//! recovers the connection internally. Initial connection tolerates a
//! slow-starting service with bounded backoff.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tracing::{debug, warn};
use wagate_core::{GatewayError, Kv};

/// SCAN page size; keeps each round-trip bounded regardless of keyspace
/// size.
const SCAN_PAGE_SIZE: usize = 1000;

/// Initial-connect backoff: `min(attempts * STEP, CAP)`.
const CONNECT_BACKOFF_STEP_MS: u64 = 200;
const CONNECT_BACKOFF_CAP_MS: u64 = 5_000;
const CONNECT_MAX_ATTEMPTS: u32 = 30;

/// Shared handle to the Redis service.
#[derive(Clone)]
pub struct RedisKv {
    manager: ConnectionManager,
}

impl RedisKv {
    /// Connect to the given URL, retrying with bounded backoff while the
    /// service starts up. Later outages are recovered internally by the
    /// connection manager.
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(url).map_err(GatewayError::store)?;
        let config = ConnectionManagerConfig::new()
            .set_factor(CONNECT_BACKOFF_STEP_MS)
            .set_max_delay(CONNECT_BACKOFF_CAP_MS);

        let mut attempts: u32 = 0;
        loop {
            match client
                .get_connection_manager_with_config(config.clone())
                .await
            {
                Ok(manager) => {
                    debug!("connected to KV service");
                    return Ok(Self { manager });
                }
                Err(err) if attempts < CONNECT_MAX_ATTEMPTS => {
                    attempts += 1;
                    let delay = (u64::from(attempts) * CONNECT_BACKOFF_STEP_MS)
                        .min(CONNECT_BACKOFF_CAP_MS);
                    warn!(
                        attempt = attempts,
                        delay_ms = delay,
                        error = %err,
                        "KV service not ready, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
                Err(err) => return Err(GatewayError::store(err)),
            }
        }
    }
}

#[async_trait]
impl Kv for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        let mut con = self.manager.clone();
        con.get(key).await.map_err(GatewayError::store)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        let mut con = self.manager.clone();
        con.set(key, value).await.map_err(GatewayError::store)
    }

    async fn set_many(&self, pairs: Vec<(String, Option<String>)>) -> Result<(), GatewayError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (key, value) in &pairs {
            match value {
                Some(v) => {
                    pipe.set(key, v).ignore();
                }
                None => {
                    pipe.del(key).ignore();
                }
            }
        }
        let mut con = self.manager.clone();
        pipe.query_async::<()>(&mut con)
            .await
            .map_err(GatewayError::store)
    }

    async fn del(&self, keys: &[String]) -> Result<u64, GatewayError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut con = self.manager.clone();
        con.del(keys).await.map_err(GatewayError::store)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, GatewayError> {
        let mut con = self.manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE_SIZE)
                .query_async(&mut con)
                .await
                .map_err(GatewayError::store)?;
            keys.extend(page);
            cursor = next;
            if cursor == 0 {
                return Ok(keys);
            }
        }
    }

    async fn lpush(&self, list: &str, value: &str) -> Result<u64, GatewayError> {
        let mut con = self.manager.clone();
        con.lpush(list, value).await.map_err(GatewayError::store)
    }

    async fn rpop(&self, list: &str) -> Result<Option<String>, GatewayError> {
        let mut con = self.manager.clone();
        con.rpop(list, None).await.map_err(GatewayError::store)
    }

    async fn rpoplpush(&self, src: &str, dst: &str) -> Result<Option<String>, GatewayError> {
        let mut con = self.manager.clone();
        con.rpoplpush(src, dst).await.map_err(GatewayError::store)
    }

    async fn lrem(&self, list: &str, value: &str) -> Result<u64, GatewayError> {
        let mut con = self.manager.clone();
        con.lrem(list, 0, value).await.map_err(GatewayError::store)
    }

    async fn llen(&self, list: &str) -> Result<u64, GatewayError> {
        let mut con = self.manager.clone();
        con.llen(list).await.map_err(GatewayError::store)
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        let mut con = self.manager.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut con)
            .await
            .map_err(GatewayError::store)
    }
}
