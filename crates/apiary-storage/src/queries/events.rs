// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only event log with sensitive-value masking.
//!
//! Events are never edited after the insert. Raw SQL never reaches the
//! log (callers record the gatekeeper hash instead) and values under
//! sensitive keys are replaced by `***masked***` before the row is
//! written.

use apiary_core::{ApiaryError, BotId, EventRecord};
use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::params;
use serde_json::Value;
use tracing::warn;

use crate::database::{map_tr_err, Database};
use crate::models::{now_iso, EventRow};

/// Replacement for masked values.
pub const MASKED: &str = "***masked***";

/// Keys whose values are masked, at any nesting depth.
const SENSITIVE_KEYS: &[&str] = &["token", "password", "secret", "api_key", "authorization"];

/// Append one event. Failures are logged and swallowed: the event log
/// must never take a handler down with it.
pub async fn append_event(db: &Database, mut event: EventRecord, mask: bool) {
    if mask {
        mask_value(&mut event.data);
    }
    let result = db
        .connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO bot_events (bot_id, user_id, ts, type, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.bot_id.to_string(),
                    event.user_id,
                    now_iso(),
                    event.kind,
                    event.data.to_string(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err);
    if let Err(e) = result {
        warn!(error = %e, "event append failed");
    }
}

/// Recursively replace values under sensitive keys.
fn mask_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if SENSITIVE_KEYS.contains(&key.as_str()) {
                    *val = Value::String(MASKED.to_string());
                } else {
                    mask_value(val);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                mask_value(item);
            }
        }
        _ => {}
    }
}

/// Most recent events for a bot, newest first.
pub async fn events_for_bot(
    db: &Database,
    bot_id: BotId,
    limit: i64,
) -> Result<Vec<EventRow>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Vec<EventRow>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, ts, type, data FROM bot_events
                 WHERE bot_id = ?1 ORDER BY ts DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![bot_id.to_string(), limit], |row| {
                let data: String = row.get(4)?;
                Ok(EventRow {
                    id: row.get(0)?,
                    bot_id,
                    user_id: row.get(1)?,
                    ts: row.get(2)?,
                    kind: row.get(3)?,
                    data: serde_json::from_str(&data).unwrap_or(Value::Null),
                })
            })?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Sum of LLM tokens recorded for a bot since `since_iso`. Rehydrates
/// the in-memory daily budget counter after a restart.
pub async fn llm_tokens_since(
    db: &Database,
    bot_id: BotId,
    since_iso: String,
) -> Result<i64, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<i64, tokio_rusqlite::Error> {
            let total = conn.query_row(
                "SELECT COALESCE(SUM(CAST(json_extract(data, '$.total_tokens') AS INTEGER)), 0)
                 FROM bot_events
                 WHERE bot_id = ?1 AND type LIKE 'llm_%' AND ts >= ?2",
                params![bot_id.to_string(), since_iso],
                |row| row.get(0),
            )?;
            Ok(total)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete events older than the retention window. Returns the number
/// of rows removed.
pub async fn purge_older_than(db: &Database, retention_days: u32) -> Result<usize, ApiaryError> {
    let cutoff = (Utc::now() - Duration::days(retention_days as i64))
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    db.connection()
        .call(move |conn| -> Result<usize, tokio_rusqlite::Error> {
            let n = conn.execute("DELETE FROM bot_events WHERE ts < ?1", params![cutoff])?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masking_replaces_sensitive_keys_at_any_depth() {
        let mut data = json!({
            "token": "123:ABC",
            "nested": {"api_key": "k", "kept": "v"},
            "list": [{"password": "p"}],
            "sql_hash": 42
        });
        mask_value(&mut data);
        assert_eq!(data["token"], MASKED);
        assert_eq!(data["nested"]["api_key"], MASKED);
        assert_eq!(data["nested"]["kept"], "v");
        assert_eq!(data["list"][0]["password"], MASKED);
        assert_eq!(data["sql_hash"], 42);
    }
}
