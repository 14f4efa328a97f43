// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle for the wagate gateway: per-session supervisor
//! tasks over an owned transport, the process-global registry, TTL
//! caches, and bootstrap resurrection of persisted sessions.

pub mod cache;
pub mod registry;
pub mod resurrect;
pub mod session;
pub mod supervisor;

pub use cache::TtlCache;
pub use registry::SessionRegistry;
pub use resurrect::resurrect_sessions;
pub use session::{ActualStatus, QrState, Session, SessionCommand, SessionInfo};
pub use supervisor::{reconnect_delay, SupervisorContext};
