// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The outbound delivery seam.
//!
//! The engine and the broadcast fan-out both send replies through a
//! [`Deliverer`] so the concrete Telegram transport stays in one crate
//! and tests can substitute a recording mock.

use async_trait::async_trait;

use crate::types::{BotId, Reply};

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The upstream accepted the message.
    Sent,
    /// The upstream reported the user blocked the bot. Non-retriable.
    Blocked,
    /// Transport or upstream failure that may succeed on retry.
    Transient(String),
}

/// Sends replies to end users on behalf of a bot.
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Deliver `reply` to `chat_id` as the given bot.
    async fn deliver(&self, bot_id: BotId, chat_id: i64, reply: &Reply) -> DeliveryOutcome;
}
