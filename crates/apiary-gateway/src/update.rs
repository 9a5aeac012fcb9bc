// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook update parsing.
//!
//! Only the fields the interpreter needs are modelled; everything else
//! in the Bot API payload is ignored.

use apiary_core::{BotId, InboundUpdate, UpdateKind};
use serde::Deserialize;

/// A raw webhook update body.
#[derive(Debug, Deserialize)]
pub struct TgUpdate {
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct TgMessage {
    #[serde(default)]
    pub text: Option<String>,
    pub from: TgUser,
    pub chat: TgChat,
}

#[derive(Debug, Deserialize)]
pub struct TgCallbackQuery {
    #[serde(default)]
    pub data: Option<String>,
    pub from: TgUser,
    #[serde(default)]
    pub message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TgUser {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

impl TgUpdate {
    /// Map the webhook body to an inbound update, or `None` when it
    /// carries nothing the runtime handles (joins, stickers, edits).
    pub fn into_inbound(self, bot_id: BotId) -> Option<InboundUpdate> {
        if let Some(message) = self.message {
            let text = message.text?;
            return Some(InboundUpdate {
                bot_id,
                user_id: message.from.id,
                chat_id: Some(message.chat.id),
                kind: UpdateKind::Text(text),
            });
        }
        if let Some(callback) = self.callback_query {
            let data = callback.data?;
            let chat_id = callback
                .message
                .as_ref()
                .map(|m| m.chat.id)
                .unwrap_or(callback.from.id);
            return Some(InboundUpdate {
                bot_id,
                user_id: callback.from.id,
                chat_id: Some(chat_id),
                kind: UpdateKind::Callback(data),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_update_maps_to_text() {
        let update: TgUpdate = serde_json::from_str(
            r#"{"message": {"text": "/start", "from": {"id": 7}, "chat": {"id": 42}}}"#,
        )
        .unwrap();
        let inbound = update.into_inbound(BotId::new()).unwrap();
        assert_eq!(inbound.user_id, 7);
        assert_eq!(inbound.chat_id, Some(42));
        assert_eq!(inbound.kind, UpdateKind::Text("/start".to_string()));
    }

    #[test]
    fn callback_update_maps_to_callback_with_chat_fallback() {
        let update: TgUpdate =
            serde_json::from_str(r#"{"callback_query": {"data": "/menu", "from": {"id": 7}}}"#)
                .unwrap();
        let inbound = update.into_inbound(BotId::new()).unwrap();
        assert_eq!(inbound.chat_id, Some(7));
        assert_eq!(inbound.kind, UpdateKind::Callback("/menu".to_string()));
    }

    #[test]
    fn unhandled_updates_map_to_none() {
        let update: TgUpdate = serde_json::from_str(r#"{"edited_message": {"x": 1}}"#).unwrap();
        assert!(update.into_inbound(BotId::new()).is_none());
    }
}
