// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter for the wagate gateway: spawns the chat-protocol
//! runner as a child process per session and adapts its stdio JSON
//! stream to the typed [`wagate_core::Transport`] seam.

pub mod bridge;
pub mod protocol;

pub use bridge::BridgeTransportFactory;
pub use protocol::map_event;
