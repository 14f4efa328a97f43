// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier): compiled defaults, `wagate.toml`
//! in the working directory, then the documented environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::WagateConfig;

/// Environment variables recognized by the gateway, mapped onto dotted
/// config keys.
///
/// These are raw (unprefixed) names; `Env::split` would mis-handle the
/// underscores inside them, so each one is mapped explicitly.
const ENV_KEYS: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("HOST", "server.host"),
    ("API_KEY", "server.api_key"),
    ("LOG_LEVEL", "server.log_level"),
    ("WEBHOOK_URL", "webhook.url"),
    ("WEBHOOK_AUTH_TYPE", "webhook.auth_type"),
    ("WEBHOOK_AUTH_USER", "webhook.auth_user"),
    ("WEBHOOK_AUTH_PASSWORD", "webhook.auth_password"),
    ("WEBHOOK_AUTH_TOKEN", "webhook.auth_token"),
    ("WEBHOOK_SKIP_STATUS", "filter.skip_status"),
    ("WEBHOOK_SKIP_GROUPS", "filter.skip_groups"),
    ("WEBHOOK_SKIP_CHANNELS", "filter.skip_channels"),
    ("WEBHOOK_SKIP_BLOCKED", "filter.skip_blocked"),
    ("WEBHOOK_ALLOWED_EVENTS", "filter.allowed_events"),
    ("WEBHOOK_DENIED_EVENTS", "filter.denied_events"),
    ("AUTH_BASE_DIR", "auth.base_dir"),
    ("BRIDGE_NODE_BIN", "bridge.node_bin"),
    ("BRIDGE_RUNNER_PATH", "bridge.runner_path"),
    ("SHOW_QR_IN_TERMINAL", "session.show_qr_in_terminal"),
    ("REDIS_URL", "redis.url"),
    ("REDIS_HOST", "redis.host"),
    ("REDIS_PORT", "redis.port"),
    ("REDIS_DB", "redis.db"),
    ("REDIS_PASSWORD", "redis.password"),
    ("KEEP_ALIVE_PING_INTERVAL", "session.ping_interval_ms"),
    ("KEEP_ALIVE_PONG_TIMEOUT", "session.pong_timeout_ms"),
    ("KEEP_ALIVE_MAX_MISSED_PONGS", "session.max_missed_pongs"),
    ("HEALTH_CHECK_INTERVAL", "session.health_check_interval_ms"),
    ("MAX_IDLE_TIME", "session.max_idle_time_ms"),
    ("AUTO_RECONNECT", "session.auto_reconnect"),
    ("MAX_RECONNECT_ATTEMPTS", "session.max_reconnect_attempts"),
];

/// Load configuration from `wagate.toml` with env var overrides.
pub fn load_config() -> Result<WagateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WagateConfig::default()))
        .merge(Toml::file("wagate.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no env lookup). Used by
/// tests and diagnostics.
pub fn load_config_from_str(toml_content: &str) -> Result<WagateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WagateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WagateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WagateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

fn env_provider() -> Env {
    Env::raw().filter_map(|key| {
        ENV_KEYS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, dotted)| (*dotted).into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_extract_without_any_sources() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.port, 3001);
        assert!(config.webhook.url.is_none());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [server]
            port = 8080

            [webhook]
            url = "http://sink.example/hook"
            auth_type = "bearer"
            auth_token = "s3cret"

            [filter]
            skip_groups = true
            allowed_events = ["messages.upsert"]
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.webhook.url.as_deref(), Some("http://sink.example/hook"));
        assert_eq!(config.webhook.auth_type, "bearer");
        assert!(config.filter.skip_groups);
        assert_eq!(config.filter.allowed_events, vec!["messages.upsert"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str(
            r#"
            [server]
            prot = 8080
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn env_vars_override_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "wagate.toml",
                r#"
                [server]
                port = 9000
                "#,
            )?;
            jail.set_env("PORT", "3002");
            jail.set_env("WEBHOOK_URL", "http://sink.example/env");
            jail.set_env("WEBHOOK_DENIED_EVENTS", "call,presence.update");
            jail.set_env("MAX_RECONNECT_ATTEMPTS", "4");

            let config = load_config().expect("config should load");
            assert_eq!(config.server.port, 3002);
            assert_eq!(config.webhook.url.as_deref(), Some("http://sink.example/env"));
            assert_eq!(
                config.filter.denied_events,
                vec!["call".to_string(), "presence.update".to_string()]
            );
            assert_eq!(config.session.max_reconnect_attempts, 4);
            Ok(())
        });
    }
}
