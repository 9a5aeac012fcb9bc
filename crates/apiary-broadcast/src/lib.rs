// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The broadcast subsystem: audience fan-out with a per-second
//! throttle, bounded retries, a per-recipient delivery log, and
//! crash-safe resumption.
//!
//! The `broadcasts` table is the work queue. A campaign moves
//! `pending -> running -> completed | failed`; rows left `running` by a
//! dead process are picked up again at worker startup, and the
//! per-recipient log makes re-delivery idempotent.

pub mod engine;
pub mod throttle;
pub mod worker;

pub use engine::BroadcastEngine;
pub use worker::BroadcastWorker;
