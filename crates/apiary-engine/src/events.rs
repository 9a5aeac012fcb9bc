// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event emission for the interpreter.
//!
//! One primary event per core operation, all carrying the update's
//! trace id. Emission never fails the handler: the storage layer logs
//! and swallows append errors.

use apiary_core::{BotId, EventRecord, TraceId};
use apiary_storage::queries::events;
use apiary_storage::Database;

/// Sink writing append-only events with optional masking.
#[derive(Clone)]
pub struct EventSink {
    db: Database,
    mask: bool,
}

impl EventSink {
    pub fn new(db: Database, mask: bool) -> Self {
        Self { db, mask }
    }

    /// Append one event.
    pub async fn emit(
        &self,
        bot_id: BotId,
        user_id: Option<i64>,
        kind: &str,
        data: serde_json::Value,
        trace: &TraceId,
    ) {
        let record = EventRecord::new(bot_id, user_id, kind, data, trace);
        events::append_event(&self.db, record, self.mask).await;
    }

    /// Append an `error` event with the component and stable code.
    pub async fn error(
        &self,
        bot_id: BotId,
        user_id: Option<i64>,
        component: &'static str,
        code: &'static str,
        message: &str,
        trace: &TraceId,
    ) {
        self.emit(
            bot_id,
            user_id,
            "error",
            serde_json::json!({
                "where": component,
                "code": code,
                "message": message,
            }),
            trace,
        )
        .await;
    }
}
