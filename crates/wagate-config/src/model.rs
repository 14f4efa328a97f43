// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the wagate gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Every duration is in milliseconds, matching the
//! wire timestamps.

use serde::{Deserialize, Deserializer, Serialize};

/// Top-level wagate configuration.
///
/// Loaded from `wagate.toml` with documented environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WagateConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Webhook sink and delivery settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Event/message admission settings.
    #[serde(default)]
    pub filter: FilterConfig,

    /// KV service connection settings.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Session supervisor timing and reconnect policy.
    #[serde(default)]
    pub session: SessionConfig,

    /// Protocol-runner bridge settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Reserved: file-backed auth storage location.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// API key required on gateway routes. `None` disables the check.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Webhook sink and retry-ladder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Sink URL for deliveries. Empty or absent disables delivery.
    #[serde(default, deserialize_with = "de_opt_nonempty")]
    pub url: Option<String>,

    /// Outbound auth scheme: "basic", "token", "bearer", or "".
    #[serde(default)]
    pub auth_type: String,

    #[serde(default)]
    pub auth_user: Option<String>,

    #[serde(default)]
    pub auth_password: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    /// Jobs claimed per worker tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts before a job dead-letters.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay; doubles per attempt.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Hard timeout per delivery request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_type: String::new(),
            auth_user: None,
            auth_password: None,
            auth_token: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Event/message admission configuration.
///
/// Defaults are the conservative set: status and channel chatter dropped,
/// group messages admitted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Drop status/broadcast messages.
    #[serde(default = "default_true")]
    pub skip_status: bool,

    /// Drop group messages.
    #[serde(default)]
    pub skip_groups: bool,

    /// Drop channel (newsletter) messages.
    #[serde(default = "default_true")]
    pub skip_channels: bool,

    /// Reserved; parsed but not enforced.
    #[serde(default)]
    pub skip_blocked: bool,

    /// Event-name whitelist; empty admits all.
    #[serde(default, deserialize_with = "de_string_list")]
    pub allowed_events: Vec<String>,

    /// Event-name blacklist; wins over the whitelist.
    #[serde(default, deserialize_with = "de_string_list")]
    pub denied_events: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            skip_status: true,
            skip_groups: false,
            skip_channels: true,
            skip_blocked: false,
            allowed_events: Vec::new(),
            denied_events: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// KV service connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Full connection URL; overrides the discrete fields when set.
    #[serde(default, deserialize_with = "de_opt_nonempty")]
    pub url: Option<String>,

    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub db: i64,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: None,
        }
    }
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

impl RedisConfig {
    /// Resolve the connection URL from either `url` or the discrete fields.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let auth = self
            .password
            .as_deref()
            .map(|p| format!(":{p}@"))
            .unwrap_or_default();
        format!("redis://{}{}:{}/{}", auth, self.host, self.port, self.db)
    }
}

/// Session supervisor timing and reconnect policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Keep-alive ping cadence while open.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// How long a pong may lag before it counts as missed.
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,

    /// Missed pongs before the connection is declared dead.
    #[serde(default = "default_max_missed_pongs")]
    pub max_missed_pongs: u32,

    /// Health prober cadence while open.
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// Idle span that triggers a presence probe.
    #[serde(default = "default_max_idle_time_ms")]
    pub max_idle_time_ms: u64,

    /// Whether eligible disconnects schedule a reconnect.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Reconnects per disconnect streak before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// First reconnect delay; grows by 1.5x per attempt.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Reconnect delay ceiling.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Render pairing strings to stdout.
    #[serde(default)]
    pub show_qr_in_terminal: bool,

    /// Pairing string lifetime.
    #[serde(default = "default_qr_timeout_ms")]
    pub qr_timeout_ms: u64,

    /// Transport establishment timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            max_missed_pongs: default_max_missed_pongs(),
            health_check_interval_ms: default_health_check_interval_ms(),
            max_idle_time_ms: default_max_idle_time_ms(),
            auto_reconnect: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            show_qr_in_terminal: false,
            qr_timeout_ms: default_qr_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_ping_interval_ms() -> u64 {
    30_000
}

fn default_pong_timeout_ms() -> u64 {
    10_000
}

fn default_max_missed_pongs() -> u32 {
    3
}

fn default_health_check_interval_ms() -> u64 {
    60_000
}

fn default_max_idle_time_ms() -> u64 {
    300_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_base_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_qr_timeout_ms() -> u64 {
    60_000
}

fn default_connect_timeout_ms() -> u64 {
    60_000
}

/// Protocol-runner bridge configuration.
///
/// The chat protocol is spoken by an external runner process; the
/// gateway spawns one per session.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Node binary used to launch the runner.
    #[serde(default = "default_node_bin")]
    pub node_bin: String,

    /// Path to the runner script.
    #[serde(default = "default_runner_path")]
    pub runner_path: String,

    /// How long a runner may take to acknowledge startup.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node_bin: default_node_bin(),
            runner_path: default_runner_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_node_bin() -> String {
    "node".to_string()
}

fn default_runner_path() -> String {
    "./bridge/runner.mjs".to_string()
}

/// Reserved file-backed auth settings. The core persists credentials in
/// the KV service; `base_dir` is recognized but unused.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub base_dir: Option<String>,
}

/// Accept either a sequence or a comma-separated string (env form).
fn de_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match ListOrString::deserialize(deserializer)? {
        ListOrString::List(list) => list,
        ListOrString::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// Treat an empty string as absent (env vars set to "" disable features).
fn de_opt_nonempty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = WagateConfig::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.webhook.batch_size, 10);
        assert_eq!(config.webhook.max_retries, 3);
        assert_eq!(config.webhook.retry_delay_ms, 5_000);
        assert!(config.filter.skip_status);
        assert!(!config.filter.skip_groups);
        assert!(config.filter.skip_channels);
        assert_eq!(config.session.ping_interval_ms, 30_000);
        assert_eq!(config.session.pong_timeout_ms, 10_000);
        assert_eq!(config.session.max_missed_pongs, 3);
        assert_eq!(config.session.max_idle_time_ms, 300_000);
        assert_eq!(config.session.max_reconnect_attempts, 10);
        assert_eq!(config.session.reconnect_max_delay_ms, 60_000);
    }

    #[test]
    fn filter_lists_accept_comma_strings() {
        let config: FilterConfig = serde_json::from_value(serde_json::json!({
            "allowed_events": "messages.upsert, messages.update",
            "denied_events": ["call"],
        }))
        .unwrap();
        assert_eq!(config.allowed_events, vec!["messages.upsert", "messages.update"]);
        assert_eq!(config.denied_events, vec!["call"]);
    }

    #[test]
    fn empty_webhook_url_reads_as_disabled() {
        let config: WebhookConfig =
            serde_json::from_value(serde_json::json!({ "url": "" })).unwrap();
        assert!(config.url.is_none());
    }

    #[test]
    fn redis_url_built_from_parts() {
        let config = RedisConfig {
            password: Some("hunter2".into()),
            db: 3,
            ..RedisConfig::default()
        };
        assert_eq!(config.connection_url(), "redis://:hunter2@127.0.0.1:6379/3");

        let with_url = RedisConfig {
            url: Some("redis://example:6380/1".into()),
            ..RedisConfig::default()
        };
        assert_eq!(with_url.connection_url(), "redis://example:6380/1");
    }
}
