// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits implemented by the store and transport crates.

pub mod kv;
pub mod transport;

pub use kv::Kv;
pub use transport::{Transport, TransportFactory, TransportHandle};
