// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram delivery adapter.
//!
//! Implements [`Deliverer`] over the Bot API via teloxide. One `Bot`
//! handle per tenant, created lazily from the token stored on the bot
//! record. Error mapping is what the broadcast retry ladder keys on:
//! a user-blocked-bot report is terminal, everything else transport-
//! shaped is transient.

pub mod sender;

pub use sender::TelegramSender;
