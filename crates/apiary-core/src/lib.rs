// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared types and trait seams for the Apiary bot runtime.
//!
//! Every other crate in the workspace depends on this one. It holds the
//! process-wide error type with its stable error codes, the inbound
//! update / outbound reply types, the append-only event record, and the
//! delivery trait that decouples the engine and broadcast fan-out from
//! the concrete Telegram transport.

pub mod delivery;
pub mod error;
pub mod types;

pub use delivery::{Deliverer, DeliveryOutcome};
pub use error::ApiaryError;
pub use types::{
    BotId, EventRecord, InboundUpdate, InlineButton, InlineKeyboard, Reply, TraceId, UpdateKind,
};
