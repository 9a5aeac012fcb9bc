// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Apiary bot runtime.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer
//! concurrency model via `tokio-rusqlite`: the [`Database`] struct IS
//! the single writer, and every query module accepts `&Database` and
//! funnels through `connection().call()`. Do not create additional
//! connections for writes.
//!
//! The same database doubles as the shared TTL key/value store: wizard
//! state (compare-and-set on the step counter) and the LLM prompt
//! cache both live here.

pub mod database;
pub mod dynamic;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::{map_tr_err, Database};
pub use models::*;
