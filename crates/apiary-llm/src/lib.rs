// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM text improvement for bot replies.
//!
//! Improvement is always optional: whatever goes wrong (open breaker,
//! rate limit, spent budget, timeout, upstream error) the caller gets
//! the unchanged text back and the reply still goes out. The subsystem
//! layers, in request order: per-(bot, user) rate limit, per-bot daily
//! token budget, shared prompt cache, per-bot circuit breaker, and
//! finally the HTTP client.

pub mod breaker;
pub mod budget;
pub mod client;
pub mod presets;
pub mod ratelimit;
pub mod service;

pub use breaker::{BreakerState, CircuitBreaker};
pub use budget::BudgetTracker;
pub use client::{Completion, ImproveClient, LlmCallError};
pub use presets::Preset;
pub use ratelimit::RateLimiter;
pub use service::{ImproveResult, LlmService};
