// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message delivery through the Telegram Bot API.

use apiary_core::{BotId, Deliverer, DeliveryOutcome, InlineKeyboard, Reply};
use apiary_storage::queries::bots;
use apiary_storage::Database;
use async_trait::async_trait;
use dashmap::DashMap;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::{ApiError, RequestError};
use tracing::debug;

/// Teloxide-backed [`Deliverer`] with a per-tenant `Bot` cache.
pub struct TelegramSender {
    db: Database,
    bots: DashMap<BotId, Bot>,
}

impl TelegramSender {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            bots: DashMap::new(),
        }
    }

    async fn bot_for(&self, bot_id: BotId) -> Result<Bot, String> {
        if let Some(bot) = self.bots.get(&bot_id) {
            return Ok(bot.clone());
        }
        let row = bots::get_bot(&self.db, bot_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("unknown bot {bot_id}"))?;
        let bot = Bot::new(row.token);
        self.bots.insert(bot_id, bot.clone());
        Ok(bot)
    }

    /// Drop a cached handle (token rotation).
    pub fn invalidate(&self, bot_id: BotId) {
        self.bots.remove(&bot_id);
    }
}

fn to_markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| {
                InlineKeyboardButton::callback(button.text.clone(), button.callback_data.clone())
            })
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl Deliverer for TelegramSender {
    async fn deliver(&self, bot_id: BotId, chat_id: i64, reply: &Reply) -> DeliveryOutcome {
        let bot = match self.bot_for(bot_id).await {
            Ok(bot) => bot,
            Err(error) => return DeliveryOutcome::Transient(error),
        };

        let mut request = bot.send_message(ChatId(chat_id), reply.text.clone());
        if let Some(keyboard) = &reply.keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }

        match request.await {
            Ok(_) => {
                debug!(bot_id = %bot_id, chat_id, "message delivered");
                DeliveryOutcome::Sent
            }
            Err(RequestError::Api(ApiError::BotBlocked)) => DeliveryOutcome::Blocked,
            Err(RequestError::Api(ApiError::UserDeactivated)) => DeliveryOutcome::Blocked,
            Err(error) => DeliveryOutcome::Transient(error.to_string()),
        }
    }
}
