// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-bot daily LLM token budget.
//!
//! The running total is in memory and rolls over at UTC midnight. On
//! first touch after a restart the counter rehydrates from the event
//! log, so a bounced process cannot double its budget. A limit of 0
//! means unlimited.

use apiary_core::{ApiaryError, BotId};
use chrono::{NaiveDate, SecondsFormat, TimeZone, Utc};
use dashmap::DashMap;
use tracing::warn;

use apiary_storage::queries::events;
use apiary_storage::Database;

#[derive(Debug, Clone, Copy)]
struct DayCell {
    day: NaiveDate,
    used: i64,
}

/// Daily token budget tracker.
pub struct BudgetTracker {
    db: Database,
    cells: DashMap<BotId, DayCell>,
}

impl BudgetTracker {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cells: DashMap::new(),
        }
    }

    /// Reject with `budget_exhausted` when the bot's daily limit is
    /// spent. Never rejects when `daily_budget_limit <= 0`.
    pub async fn check(&self, bot_id: BotId, daily_limit: i64) -> Result<(), ApiaryError> {
        if daily_limit <= 0 {
            return Ok(());
        }
        let used = self.used_today(bot_id).await;
        if used >= daily_limit {
            warn!(bot_id = %bot_id, used, daily_limit, "daily llm token budget exhausted");
            return Err(ApiaryError::BudgetExhausted);
        }
        Ok(())
    }

    /// Count observed tokens against today's budget.
    pub async fn consume(&self, bot_id: BotId, tokens: i64) {
        let today = Utc::now().date_naive();
        // Rehydrate first so the add lands on an initialized cell.
        self.used_today(bot_id).await;
        if let Some(mut cell) = self.cells.get_mut(&bot_id) {
            if cell.day != today {
                cell.day = today;
                cell.used = 0;
            }
            cell.used += tokens;
        }
    }

    async fn used_today(&self, bot_id: BotId) -> i64 {
        let today = Utc::now().date_naive();
        if let Some(mut cell) = self.cells.get_mut(&bot_id) {
            if cell.day != today {
                cell.day = today;
                cell.used = 0;
            }
            return cell.used;
        }

        // First touch since startup: rehydrate from today's events.
        let midnight = Utc
            .from_utc_datetime(&today.and_hms_opt(0, 0, 0).unwrap_or_default())
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let used = events::llm_tokens_since(&self.db, bot_id, midnight)
            .await
            .unwrap_or(0);
        self.cells.insert(bot_id, DayCell { day: today, used });
        used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiary_core::{EventRecord, TraceId};
    use serde_json::json;

    #[tokio::test]
    async fn budget_rejects_once_the_daily_limit_is_spent() {
        let db = Database::open_in_memory().await.unwrap();
        let tracker = BudgetTracker::new(db);
        let bot = BotId::new();

        tracker.check(bot, 100).await.unwrap();
        tracker.consume(bot, 60).await;
        tracker.check(bot, 100).await.unwrap();
        tracker.consume(bot, 50).await;
        assert_eq!(
            tracker.check(bot, 100).await.unwrap_err().code(),
            "budget_exhausted"
        );
        // Unlimited bots never reject.
        tracker.check(bot, 0).await.unwrap();
    }

    #[tokio::test]
    async fn budget_rehydrates_from_todays_events() {
        let db = Database::open_in_memory().await.unwrap();
        let bot = BotId::new();
        events::append_event(
            &db,
            EventRecord::new(
                bot,
                Some(1),
                "llm_improve",
                json!({"total_tokens": 90}),
                &TraceId::new(),
            ),
            true,
        )
        .await;

        // A fresh tracker simulates a restarted process.
        let tracker = BudgetTracker::new(db);
        tracker.consume(bot, 20).await;
        assert_eq!(
            tracker.check(bot, 100).await.unwrap_err().code(),
            "budget_exhausted"
        );
    }
}
