// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast campaign rows and the per-recipient delivery log.
//!
//! The `broadcasts` table doubles as the work queue: the worker claims
//! the oldest `pending` row by flipping it to `running`, and rows left
//! `running` by a crashed process are picked up again at startup.

use apiary_core::{ApiaryError, BotId};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{now_iso, BroadcastEventRow, BroadcastRow};

fn row_to_broadcast(row: &rusqlite::Row<'_>) -> Result<BroadcastRow, rusqlite::Error> {
    let bot_id: String = row.get(1)?;
    Ok(BroadcastRow {
        id: row.get(0)?,
        bot_id: BotId::parse(&bot_id).unwrap_or_default(),
        audience: row.get(2)?,
        message: row.get(3)?,
        throttle_per_sec: row.get::<_, i64>(4)? as u32,
        status: row.get(5)?,
        total_users: row.get(6)?,
        sent_count: row.get(7)?,
        failed_count: row.get(8)?,
        blocked_count: row.get(9)?,
        created_at: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

const BROADCAST_COLUMNS: &str = "id, bot_id, audience, message, throttle_per_sec, status, \
     total_users, sent_count, failed_count, blocked_count, created_at, started_at, completed_at";

/// Insert a new campaign in `pending` state.
pub async fn insert_broadcast(db: &Database, row: &BroadcastRow) -> Result<(), ApiaryError> {
    let row = row.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO broadcasts (id, bot_id, audience, message, throttle_per_sec,
                                         status, total_users, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    row.id,
                    row.bot_id.to_string(),
                    row.audience,
                    row.message,
                    row.throttle_per_sec as i64,
                    row.status,
                    row.total_users,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one campaign.
pub async fn get_broadcast(db: &Database, id: String) -> Result<Option<BroadcastRow>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Option<BroadcastRow>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BROADCAST_COLUMNS} FROM broadcasts WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_broadcast) {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Claim the oldest pending campaign, flipping it to `running`.
/// Returns `None` when the queue is empty.
pub async fn claim_next_pending(db: &Database) -> Result<Option<BroadcastRow>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Option<BroadcastRow>, tokio_rusqlite::Error> {
            let tx = conn.transaction()?;
            let id: Option<String> = match tx.query_row(
                "SELECT id FROM broadcasts WHERE status = 'pending'
                 ORDER BY created_at LIMIT 1",
                [],
                |row| row.get(0),
            ) {
                Ok(id) => Some(id),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };
            let Some(id) = id else {
                return Ok(None);
            };
            let now = now_iso();
            tx.execute(
                "UPDATE broadcasts SET status = 'running', started_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, now],
            )?;
            let row = tx.query_row(
                &format!("SELECT {BROADCAST_COLUMNS} FROM broadcasts WHERE id = ?1"),
                params![id],
                row_to_broadcast,
            )?;
            tx.commit()?;
            Ok(Some(row))
        })
        .await
        .map_err(map_tr_err)
}

/// Campaigns stranded in `running` state (process restart recovery).
pub async fn list_running(db: &Database) -> Result<Vec<BroadcastRow>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Vec<BroadcastRow>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BROADCAST_COLUMNS} FROM broadcasts
                 WHERE status = 'running' ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([], row_to_broadcast)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
}

/// Record one per-recipient delivery outcome. Idempotent: a second
/// record for the same (broadcast, user) is ignored, which is what a
/// resumed broadcast relies on. Returns whether a row was written.
pub async fn record_delivery(
    db: &Database,
    broadcast_id: String,
    user_id: i64,
    status: &str,
    error_code: Option<String>,
) -> Result<bool, ApiaryError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, tokio_rusqlite::Error> {
            let n = conn.execute(
                "INSERT OR IGNORE INTO broadcast_events
                     (broadcast_id, user_id, status, error_code, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![broadcast_id, user_id, status, error_code, now_iso()],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Delivery counts for a campaign: (sent, failed, blocked).
pub async fn delivery_counts(
    db: &Database,
    broadcast_id: String,
) -> Result<(i64, i64, i64), ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<(i64, i64, i64), tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT
                     COALESCE(SUM(status = 'sent'), 0),
                     COALESCE(SUM(status = 'failed'), 0),
                     COALESCE(SUM(status = 'blocked'), 0)
                 FROM broadcast_events WHERE broadcast_id = ?1",
            )?;
            let counts = stmt.query_row(params![broadcast_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}

/// Push live counters onto the campaign row.
pub async fn update_counters(
    db: &Database,
    broadcast_id: String,
    sent: i64,
    failed: i64,
    blocked: i64,
) -> Result<(), ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "UPDATE broadcasts SET sent_count = ?2, failed_count = ?3,
                                       blocked_count = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![broadcast_id, sent, failed, blocked, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Terminal status transition with final counters.
pub async fn finish_broadcast(
    db: &Database,
    broadcast_id: String,
    status: &str,
    sent: i64,
    failed: i64,
    blocked: i64,
) -> Result<(), ApiaryError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            let now = now_iso();
            conn.execute(
                "UPDATE broadcasts SET status = ?2, sent_count = ?3, failed_count = ?4,
                                       blocked_count = ?5, completed_at = ?6, updated_at = ?6
                 WHERE id = ?1",
                params![broadcast_id, status, sent, failed, blocked, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delivery log rows for a campaign, for inspection and tests.
pub async fn events_for_broadcast(
    db: &Database,
    broadcast_id: String,
) -> Result<Vec<BroadcastEventRow>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Vec<BroadcastEventRow>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT broadcast_id, user_id, status, error_code, sent_at
                 FROM broadcast_events WHERE broadcast_id = ?1 ORDER BY user_id",
            )?;
            let rows = stmt.query_map(params![broadcast_id], |row| {
                Ok(BroadcastEventRow {
                    broadcast_id: row.get(0)?,
                    user_id: row.get(1)?,
                    status: row.get(2)?,
                    error_code: row.get(3)?,
                    sent_at: row.get(4)?,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
}
