// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wizard state store: per-(bot, user) records with TTL and an
//! atomic compare-and-set on the step counter.
//!
//! The conceptual key is `state:{bot_id}:{user_id}`; here it is the
//! table's primary key. Concurrent receives for the same key race on
//! [`advance`]: a single winner moves the step, the loser observes zero
//! affected rows and must re-read.

use apiary_core::{ApiaryError, BotId};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{now_iso, WizardStateRow};

/// Load the state for a key, dropping it when the TTL has lapsed.
pub async fn load(
    db: &Database,
    bot_id: BotId,
    user_id: i64,
) -> Result<Option<WizardStateRow>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Option<WizardStateRow>, tokio_rusqlite::Error> {
            let id = bot_id.to_string();
            let mut stmt = conn.prepare(
                "SELECT format, flow_cmd, step, vars, started_at, expires_at
                 FROM wizard_state WHERE bot_id = ?1 AND user_id = ?2",
            )?;
            let result = stmt.query_row(params![id, user_id], |row| {
                Ok(WizardStateRow {
                    bot_id,
                    user_id,
                    format: row.get(0)?,
                    flow_cmd: row.get(1)?,
                    step: row.get(2)?,
                    vars: row.get(3)?,
                    started_at: row.get(4)?,
                    expires_at: row.get(5)?,
                })
            });
            match result {
                Ok(state) => {
                    if state.expires_at < now_iso() {
                        conn.execute(
                            "DELETE FROM wizard_state WHERE bot_id = ?1 AND user_id = ?2",
                            params![id, user_id],
                        )?;
                        Ok(None)
                    } else {
                        Ok(Some(state))
                    }
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Install fresh state for a key, replacing whatever was there.
/// Used on wizard entry (including idempotent restart).
pub async fn start(db: &Database, state: WizardStateRow) -> Result<(), ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT OR REPLACE INTO wizard_state
                     (bot_id, user_id, format, flow_cmd, step, vars, started_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    state.bot_id.to_string(),
                    state.user_id,
                    state.format,
                    state.flow_cmd,
                    state.step,
                    state.vars,
                    state.started_at,
                    state.expires_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-set step advance. Returns `true` when this caller won
/// the race; `false` means another update committed first and this one
/// must be treated as out of turn.
pub async fn advance(
    db: &Database,
    bot_id: BotId,
    user_id: i64,
    expected_step: i64,
    new_step: i64,
    vars_json: String,
    expires_at: String,
) -> Result<bool, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<bool, tokio_rusqlite::Error> {
            let n = conn.execute(
                "UPDATE wizard_state SET step = ?4, vars = ?5, expires_at = ?6
                 WHERE bot_id = ?1 AND user_id = ?2 AND step = ?3",
                params![
                    bot_id.to_string(),
                    user_id,
                    expected_step,
                    new_step,
                    vars_json,
                    expires_at,
                ],
            )?;
            Ok(n == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove the state for a key (wizard completion, reset, corruption).
pub async fn delete(db: &Database, bot_id: BotId, user_id: i64) -> Result<(), ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "DELETE FROM wizard_state WHERE bot_id = ?1 AND user_id = ?2",
                params![bot_id.to_string(), user_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
