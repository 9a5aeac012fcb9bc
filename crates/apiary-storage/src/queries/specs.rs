// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned spec storage. Specs are immutable once published; the
//! runtime always executes the highest published version.

use apiary_core::{ApiaryError, BotId};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{now_iso, SpecRow};

/// Publish a new spec version; returns the assigned version number.
pub async fn publish_spec(
    db: &Database,
    bot_id: BotId,
    spec_json: String,
) -> Result<i64, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<i64, tokio_rusqlite::Error> {
            let tx = conn.transaction()?;
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM bot_specs WHERE bot_id = ?1",
                params![bot_id.to_string()],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO bot_specs (bot_id, version, spec_json, published_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![bot_id.to_string(), next, spec_json, now_iso()],
            )?;
            tx.commit()?;
            Ok(next)
        })
        .await
        .map_err(map_tr_err)
}

/// The highest published spec for a bot.
pub async fn latest_spec(db: &Database, bot_id: BotId) -> Result<Option<SpecRow>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Option<SpecRow>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT version, spec_json, published_at FROM bot_specs
                 WHERE bot_id = ?1 ORDER BY version DESC LIMIT 1",
            )?;
            let result = stmt.query_row(params![bot_id.to_string()], |row| {
                Ok(SpecRow {
                    bot_id,
                    version: row.get(0)?,
                    spec_json: row.get(1)?,
                    published_at: row.get(2)?,
                })
            });
            match result {
                Ok(spec) => Ok(Some(spec)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}
