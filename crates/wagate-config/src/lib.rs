// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the wagate gateway: serde model structs plus a
//! Figment-based layered loader (defaults, `wagate.toml`, documented
//! environment variables).

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AuthConfig, BridgeConfig, FilterConfig, RedisConfig, ServerConfig, SessionConfig,
    WagateConfig, WebhookConfig,
};
