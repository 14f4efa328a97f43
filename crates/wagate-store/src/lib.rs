// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! KV persistence for the wagate gateway: the Redis adapter, an
//! in-memory stand-in with identical semantics, the binary-preserving
//! JSON codec, and the auth credential store built on top of them.

pub mod auth;
pub mod codec;
pub mod memory;
pub mod redis;

pub use auth::{credentials_valid, init_creds, me_id, AuthState, AuthStore, SignalKeys, KEY_PREFIX};
pub use codec::{decode_buffers, encode_buffers, tag_bytes, untag_bytes};
pub use memory::MemoryKv;
pub use redis::RedisKv;
