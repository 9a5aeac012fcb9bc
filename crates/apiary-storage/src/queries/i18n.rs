// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Locale preferences and per-(bot, locale) translation keys.

use std::collections::HashMap;

use apiary_core::{ApiaryError, BotId};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::now_iso;

/// A user-level locale preference, if any.
pub async fn user_locale(
    db: &Database,
    bot_id: BotId,
    user_id: i64,
) -> Result<Option<String>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Option<String>, tokio_rusqlite::Error> {
            let result = conn.query_row(
                "SELECT locale FROM locales
                 WHERE bot_id = ?1 AND user_id = ?2 AND chat_id IS NULL",
                params![bot_id.to_string(), user_id],
                |row| row.get(0),
            );
            match result {
                Ok(locale) => Ok(Some(locale)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// A chat-level locale preference, if any.
pub async fn chat_locale(
    db: &Database,
    bot_id: BotId,
    chat_id: i64,
) -> Result<Option<String>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Option<String>, tokio_rusqlite::Error> {
            let result = conn.query_row(
                "SELECT locale FROM locales
                 WHERE bot_id = ?1 AND chat_id = ?2 AND user_id IS NULL",
                params![bot_id.to_string(), chat_id],
                |row| row.get(0),
            );
            match result {
                Ok(locale) => Ok(Some(locale)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert a locale preference for exactly one of user or chat scope.
pub async fn set_locale(
    db: &Database,
    bot_id: BotId,
    user_id: Option<i64>,
    chat_id: Option<i64>,
    locale: String,
) -> Result<(), ApiaryError> {
    if user_id.is_some() == chat_id.is_some() {
        return Err(ApiaryError::Internal(
            "locale preference needs exactly one of user_id or chat_id".into(),
        ));
    }
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            // Delete-then-insert instead of an upsert: the scope index
            // is an expression index, which not every SQLite build
            // accepts as a conflict target.
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM locales
                 WHERE bot_id = ?1
                   AND COALESCE(user_id, 0) = COALESCE(?2, 0)
                   AND COALESCE(chat_id, 0) = COALESCE(?3, 0)",
                params![bot_id.to_string(), user_id, chat_id],
            )?;
            tx.execute(
                "INSERT INTO locales (bot_id, user_id, chat_id, locale, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![bot_id.to_string(), user_id, chat_id, locale, now_iso()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All translation keys for a (bot, locale).
pub async fn keys_for(
    db: &Database,
    bot_id: BotId,
    locale: String,
) -> Result<HashMap<String, String>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<HashMap<String, String>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT key, value FROM i18n_keys WHERE bot_id = ?1 AND locale = ?2",
            )?;
            let rows = stmt.query_map(params![bot_id.to_string(), locale], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut keys = HashMap::new();
            for row in rows {
                let (key, value) = row?;
                keys.insert(key, value);
            }
            Ok(keys)
        })
        .await
        .map_err(map_tr_err)
}

/// Bulk upsert translation keys for a (bot, locale).
pub async fn upsert_keys(
    db: &Database,
    bot_id: BotId,
    locale: String,
    keys: Vec<(String, String)>,
) -> Result<(), ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO i18n_keys (bot_id, locale, key, value, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (bot_id, locale, key)
                     DO UPDATE SET value = ?4, updated_at = ?5",
                )?;
                let now = now_iso();
                for (key, value) in &keys {
                    stmt.execute(params![bot_id.to_string(), locale, key, value, now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
