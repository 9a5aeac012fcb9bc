// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared LLM prompt cache with TTL.
//!
//! Lives in the same store as wizard state so every process in a
//! deployment sees the same cache.

use apiary_core::ApiaryError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::now_iso;

/// A cached completion.
#[derive(Debug, Clone)]
pub struct CachedCompletion {
    pub content: String,
    pub total_tokens: i64,
}

/// Look a prompt hash up, honouring the TTL.
pub async fn get(db: &Database, cache_key: String) -> Result<Option<CachedCompletion>, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<Option<CachedCompletion>, tokio_rusqlite::Error> {
            let result = conn.query_row(
                "SELECT content, total_tokens FROM llm_cache
                 WHERE cache_key = ?1 AND expires_at >= ?2",
                params![cache_key, now_iso()],
                |row| {
                    Ok(CachedCompletion {
                        content: row.get(0)?,
                        total_tokens: row.get(1)?,
                    })
                },
            );
            match result {
                Ok(hit) => Ok(Some(hit)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Store a completion under a prompt hash.
pub async fn put(
    db: &Database,
    cache_key: String,
    content: String,
    total_tokens: i64,
    expires_at: String,
) -> Result<(), ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT OR REPLACE INTO llm_cache (cache_key, content, total_tokens, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![cache_key, content, total_tokens, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Drop expired cache rows; returns the number removed.
pub async fn purge_expired(db: &Database) -> Result<usize, ApiaryError> {
    db.connection()
        .call(move |conn| -> Result<usize, tokio_rusqlite::Error> {
            let n = conn.execute(
                "DELETE FROM llm_cache WHERE expires_at < ?1",
                params![now_iso()],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}
