// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the wagate workspace: a scripted mock transport
//! and a harness that assembles the full gateway stack on mocks.

pub mod harness;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_transport::{MockControl, MockTransportFactory};
