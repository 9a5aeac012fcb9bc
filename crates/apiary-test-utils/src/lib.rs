// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end runtime testing.
//!
//! `TestHarness` assembles a complete runtime around an in-memory
//! database: one bot with a published spec, the engine, a broadcast
//! engine wired to a recording mock deliverer, and optionally a mock
//! LLM upstream (wiremock) the test mounts responses on.

pub mod harness;
pub mod mock_delivery;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_delivery::MockDeliverer;
