// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and
//! embedded migrations on open.

use apiary_core::ApiaryError;
use tracing::debug;

use crate::migrations;

/// Handle to the single-writer SQLite database.
///
/// Cloning is cheap: all clones funnel into the same background
/// connection thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, ApiaryError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_tr_err)?;
        Self::initialize(conn, path).await
    }

    /// Open an in-memory database; used by tests and the preview CLI.
    pub async fn open_in_memory() -> Result<Self, ApiaryError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(map_tr_err)?;
        Self::initialize(conn, ":memory:").await
    }

    async fn initialize(
        conn: tokio_rusqlite::Connection,
        path: &str,
    ) -> Result<Self, ApiaryError> {
        conn.call(|conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            migrations::run_migrations(conn)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// The underlying connection handle for `call()` closures.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Liveness probe backing the health endpoints.
    pub async fn ping(&self) -> Result<(), ApiaryError> {
        self.conn
            .call(|conn| -> Result<(), tokio_rusqlite::Error> {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL; called on graceful shutdown.
    pub async fn close(&self) -> Result<(), ApiaryError> {
        self.conn
            .call(|conn| -> Result<(), tokio_rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Bridge storage-layer failures into the runtime error type.
///
/// Anything that reaches here from a typed query is an availability
/// problem from the caller's perspective; gatekept dynamic SQL maps its
/// own execution failures separately.
pub fn map_tr_err(err: tokio_rusqlite::Error) -> ApiaryError {
    ApiaryError::DbUnavailable(err.to_string())
}
