// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use reverie_core::ReverieError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations::run_migrations;

/// Convert tokio_rusqlite errors into ReverieError::Storage.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> ReverieError {
    ReverieError::Storage {
        source: Box::new(e),
    }
}

/// ISO-8601 UTC timestamp `offset_ms` milliseconds from now.
///
/// Matches the `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` format used by
/// the schema defaults, so timestamps compare lexicographically.
pub fn timestamp_after_ms(offset_ms: i64) -> String {
    (chrono::Utc::now() + chrono::Duration::milliseconds(offset_ms))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Shared handle to the Reverie SQLite database.
///
/// Cloning is cheap; all clones funnel through the same background
/// connection thread.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run migrations.
    pub async fn open(path: &str) -> Result<Self, ReverieError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        Self::initialize(conn).await
    }

    /// Open an in-memory database with the full schema applied.
    pub async fn open_in_memory() -> Result<Self, ReverieError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        Self::initialize(conn).await
    }

    /// Wrap an existing connection without applying PRAGMAs or migrations.
    ///
    /// The caller is responsible for the schema. Useful in tests that need
    /// to exercise behavior against a missing or partial schema.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    async fn initialize(conn: Connection) -> Result<Self, ReverieError> {
        // The closure's error type is the sqlite error; migration
        // failures come back as a value.
        let migrated: Result<(), ReverieError> = conn
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.pragma_update(None, "busy_timeout", 5000)?;
                Ok(run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)?;
        migrated?;
        debug!("database initialized");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the background connection thread.
    ///
    /// Consumes a clone; other clones of this handle error afterwards.
    pub async fn close(&self) -> Result<(), ReverieError> {
        self.conn.clone().close().await.map_err(map_tr_err)
    }
}
