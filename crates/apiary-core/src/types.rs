// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the runtime crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a hosted bot (tenant). Wraps the bot's stable UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotId(pub Uuid);

impl BotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for BotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Correlation identifier threaded through all events of one inbound
/// update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceId(String);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of an inbound update, after the webhook framing is stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// A plain text message (commands included).
    Text(String),
    /// Inline-keyboard callback data.
    Callback(String),
}

/// One inbound update addressed to a single bot.
#[derive(Debug, Clone)]
pub struct InboundUpdate {
    pub bot_id: BotId,
    pub user_id: i64,
    /// Chat the message arrived in. `None` for bare callback queries.
    pub chat_id: Option<i64>,
    pub kind: UpdateKind,
}

impl InboundUpdate {
    pub fn text(bot_id: BotId, user_id: i64, text: impl Into<String>) -> Self {
        Self {
            bot_id,
            user_id,
            chat_id: Some(user_id),
            kind: UpdateKind::Text(text.into()),
        }
    }

    pub fn callback(bot_id: BotId, user_id: i64, data: impl Into<String>) -> Self {
        Self {
            bot_id,
            user_id,
            chat_id: Some(user_id),
            kind: UpdateKind::Callback(data.into()),
        }
    }
}

/// A single inline-keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// An inline keyboard: rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The outbound reply produced by one handled update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
    /// Edit the message that carried the pressed inline keyboard
    /// instead of sending a new one (calendar navigation).
    pub edit: bool,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            edit: false,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
            edit: false,
        }
    }

    pub fn edit(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
            edit: true,
        }
    }
}

/// One append-only row for the `bot_events` log.
///
/// `data` always carries the update's trace id; the sink masks
/// sensitive values before the row is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub bot_id: BotId,
    pub user_id: Option<i64>,
    /// Event type: `update`, `flow_step`, `action_sql`, `action_reply`,
    /// `error`, `widget_*`, `llm_*`, `broadcast_*`.
    pub kind: String,
    pub data: serde_json::Value,
}

impl EventRecord {
    pub fn new(
        bot_id: BotId,
        user_id: Option<i64>,
        kind: impl Into<String>,
        mut data: serde_json::Value,
        trace_id: &TraceId,
    ) -> Self {
        if let Some(map) = data.as_object_mut() {
            map.insert(
                "trace_id".to_string(),
                serde_json::Value::String(trace_id.to_string()),
            );
        }
        Self {
            bot_id,
            user_id,
            kind: kind.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_record_carries_trace_id() {
        let trace = TraceId::new();
        let rec = EventRecord::new(
            BotId::new(),
            Some(7),
            "update",
            serde_json::json!({"cmd": "/start"}),
            &trace,
        );
        assert_eq!(rec.data["trace_id"], trace.as_str());
        assert_eq!(rec.data["cmd"], "/start");
    }
}
