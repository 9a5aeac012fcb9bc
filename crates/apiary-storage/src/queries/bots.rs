// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot registry CRUD and tenant data purge.

use apiary_core::{ApiaryError, BotId};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{now_iso, BotPatch, BotRow};

fn row_to_bot(row: &rusqlite::Row<'_>) -> Result<BotRow, rusqlite::Error> {
    let id: String = row.get(0)?;
    Ok(BotRow {
        id: BotId::parse(&id).unwrap_or_default(),
        name: row.get(1)?,
        token: row.get(2)?,
        status: row.get(3)?,
        llm_enabled: row.get::<_, i64>(4)? != 0,
        llm_preset: row.get(5)?,
        daily_budget_limit: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const BOT_COLUMNS: &str =
    "id, name, token, status, llm_enabled, llm_preset, daily_budget_limit, created_at, updated_at";

/// Insert a new bot record.
pub async fn create_bot(db: &Database, bot: &BotRow) -> Result<(), ApiaryError> {
    let bot = bot.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO bots (id, name, token, status, llm_enabled, llm_preset,
                                   daily_budget_limit, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    bot.id.to_string(),
                    bot.name,
                    bot.token,
                    bot.status,
                    bot.llm_enabled as i64,
                    bot.llm_preset,
                    bot.daily_budget_limit,
                    bot.created_at,
                    bot.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a bot by id.
pub async fn get_bot(db: &Database, bot_id: BotId) -> Result<Option<BotRow>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Option<BotRow>, tokio_rusqlite::Error> {
            let mut stmt =
                conn.prepare(&format!("SELECT {BOT_COLUMNS} FROM bots WHERE id = ?1"))?;
            let result = stmt.query_row(params![bot_id.to_string()], row_to_bot);
            match result {
                Ok(bot) => Ok(Some(bot)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List all bots ordered by name.
pub async fn list_bots(db: &Database) -> Result<Vec<BotRow>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Vec<BotRow>, tokio_rusqlite::Error> {
            let mut stmt =
                conn.prepare(&format!("SELECT {BOT_COLUMNS} FROM bots ORDER BY name"))?;
            let rows = stmt.query_map([], row_to_bot)?;
            let mut bots = Vec::new();
            for row in rows {
                bots.push(row?);
            }
            Ok(bots)
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a partial update; returns the updated row, or `None` when the
/// bot does not exist.
pub async fn update_bot(
    db: &Database,
    bot_id: BotId,
    patch: BotPatch,
) -> Result<Option<BotRow>, ApiaryError> {
    let existing = match get_bot(db, bot_id).await? {
        Some(bot) => bot,
        None => return Ok(None),
    };
    let updated = BotRow {
        name: patch.name.unwrap_or(existing.name),
        token: patch.token.unwrap_or(existing.token),
        status: patch.status.unwrap_or(existing.status),
        llm_enabled: patch.llm_enabled.unwrap_or(existing.llm_enabled),
        llm_preset: patch.llm_preset.unwrap_or(existing.llm_preset),
        daily_budget_limit: patch
            .daily_budget_limit
            .unwrap_or(existing.daily_budget_limit),
        updated_at: now_iso(),
        ..existing
    };
    let row = updated.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "UPDATE bots SET name = ?2, token = ?3, status = ?4, llm_enabled = ?5,
                                 llm_preset = ?6, daily_budget_limit = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    row.id.to_string(),
                    row.name,
                    row.token,
                    row.status,
                    row.llm_enabled as i64,
                    row.llm_preset,
                    row.daily_budget_limit,
                    row.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(Some(updated))
}

/// Delete a bot record. Tenant data is removed separately through
/// [`purge_bot_data`].
pub async fn delete_bot(db: &Database, bot_id: BotId) -> Result<bool, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<bool, tokio_rusqlite::Error> {
            let n = conn.execute("DELETE FROM bots WHERE id = ?1", params![bot_id.to_string()])?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Erase every piece of tenant data for one bot: events, users,
/// wizard state, broadcasts with their delivery log, locales, i18n
/// keys, and example-domain rows. The bot record and its specs stay.
pub async fn purge_bot_data(db: &Database, bot_id: BotId) -> Result<(), ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            let id = bot_id.to_string();
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM broadcast_events WHERE broadcast_id IN
                     (SELECT id FROM broadcasts WHERE bot_id = ?1)",
                params![id],
            )?;
            for table in [
                "bot_events",
                "wizard_state",
                "bot_users",
                "broadcasts",
                "locales",
                "i18n_keys",
                "bookings",
            ] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE bot_id = ?1"),
                    params![id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
