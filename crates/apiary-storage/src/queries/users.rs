// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot user tracking and broadcast audience selection.
//!
//! Audience chunks are stable-ordered by `user_id` and can exclude
//! recipients that already have a delivery record for a broadcast,
//! which is what makes interrupted broadcasts resumable.

use apiary_core::{ApiaryError, BotId};
use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{now_iso, Audience};

/// Record user activity; inserts the user on first contact.
pub async fn touch_user(db: &Database, bot_id: BotId, user_id: i64) -> Result<(), ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO bot_users (bot_id, user_id, last_active)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (bot_id, user_id)
                 DO UPDATE SET last_active = ?3, is_active = 1",
                params![bot_id.to_string(), user_id, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Tag a user with segment labels (stored as a JSON array).
pub async fn set_segment_tags(
    db: &Database,
    bot_id: BotId,
    user_id: i64,
    tags: &[String],
) -> Result<(), ApiaryError> {
    let tags_json = serde_json::to_string(tags)
        .map_err(|e| ApiaryError::Internal(format!("segment tags encode: {e}")))?;
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO bot_users (bot_id, user_id, last_active, segment_tags)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (bot_id, user_id) DO UPDATE SET segment_tags = ?4",
                params![bot_id.to_string(), user_id, now_iso(), tags_json],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a user inactive (left the bot, or blocked it).
pub async fn deactivate_user(db: &Database, bot_id: BotId, user_id: i64) -> Result<(), ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "UPDATE bot_users SET is_active = 0 WHERE bot_id = ?1 AND user_id = ?2",
                params![bot_id.to_string(), user_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn audience_predicate(audience: &Audience) -> (String, Option<String>) {
    match audience {
        Audience::All => (String::new(), None),
        Audience::Active7d => {
            let since = (Utc::now() - Duration::days(7))
                .to_rfc3339_opts(SecondsFormat::Millis, true);
            (" AND last_active >= :since".to_string(), Some(since))
        }
        Audience::Segment(tag) => (
            " AND EXISTS (SELECT 1 FROM json_each(bot_users.segment_tags)
                          WHERE json_each.value = :since)"
                .to_string(),
            Some(tag.clone()),
        ),
    }
}

/// Count the users an audience selector matches.
pub async fn count_audience(
    db: &Database,
    bot_id: BotId,
    audience: &Audience,
) -> Result<i64, ApiaryError> {
    let (predicate, extra) = audience_predicate(audience);
    db.connection()
        .call(move |conn| -> Result<i64, tokio_rusqlite::Error> {
            let sql = format!(
                "SELECT COUNT(*) FROM bot_users
                 WHERE bot_id = :bot_id AND is_active = 1{predicate}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let bot = bot_id.to_string();
            let mut binds: Vec<(&str, &dyn rusqlite::ToSql)> = vec![(":bot_id", &bot)];
            if let Some(value) = &extra {
                binds.push((":since", value));
            }
            let count = stmt.query_row(binds.as_slice(), |row| row.get(0))?;
            Ok(count)
        })
        .await
        .map_err(map_tr_err)
}

/// One chunk of audience user ids, ordered by `user_id`, starting
/// strictly after `after_user_id`. When `exclude_broadcast` is set,
/// users that already have a delivery record for that broadcast are
/// skipped, so a resumed broadcast picks up exactly where it stopped.
pub async fn audience_chunk(
    db: &Database,
    bot_id: BotId,
    audience: &Audience,
    after_user_id: i64,
    exclude_broadcast: Option<String>,
    limit: i64,
) -> Result<Vec<i64>, ApiaryError> {
    let (predicate, extra) = audience_predicate(audience);
    db.connection()
        .call(move |conn| -> Result<Vec<i64>, tokio_rusqlite::Error> {
            let exclusion = if exclude_broadcast.is_some() {
                " AND NOT EXISTS (SELECT 1 FROM broadcast_events be
                                  WHERE be.broadcast_id = :broadcast_id
                                    AND be.user_id = bot_users.user_id)"
            } else {
                ""
            };
            let sql = format!(
                "SELECT user_id FROM bot_users
                 WHERE bot_id = :bot_id AND is_active = 1 AND user_id > :after{predicate}{exclusion}
                 ORDER BY user_id LIMIT :limit"
            );
            let mut stmt = conn.prepare(&sql)?;
            let bot = bot_id.to_string();
            let mut binds: Vec<(&str, &dyn rusqlite::ToSql)> = vec![
                (":bot_id", &bot),
                (":after", &after_user_id),
                (":limit", &limit),
            ];
            if let Some(value) = &extra {
                binds.push((":since", value));
            }
            if let Some(id) = &exclude_broadcast {
                binds.push((":broadcast_id", id));
            }
            let rows = stmt.query_map(binds.as_slice(), |row| row.get::<_, i64>(0))?;
            let mut users = Vec::new();
            for row in rows {
                users.push(row?);
            }
            Ok(users)
        })
        .await
        .map_err(map_tr_err)
}
