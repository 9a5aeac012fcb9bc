// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The HTTP gateway built on axum.
//!
//! Public surface: health probes, `/metrics`, webhook ingest (always
//! 200, errors are internalised), the synchronous preview tester, and
//! the bot management API (CRUD, spec publish/validate/reload, data
//! purge, broadcasts).

pub mod envelope;
pub mod handlers;
pub mod server;
pub mod update;

pub use server::{serve, AppState};
