// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TTL key-value cache backed by the `kv_cache` table.
//!
//! Used for session short-term snapshots and the extraction debounce
//! key mapping. Expired entries read as absent; a periodic
//! [`purge_expired`] sweep reclaims the rows.

use reverie_core::ReverieError;
use rusqlite::params;

use crate::database::{Database, map_tr_err, timestamp_after_ms};

/// Upsert `key` with an optional time-to-live.
///
/// `ttl_ms = None` stores the value without expiry.
pub async fn set(
    db: &Database,
    key: &str,
    value: &str,
    ttl_ms: Option<u64>,
) -> Result<(), ReverieError> {
    let key = key.to_string();
    let value = value.to_string();
    let expires_at = ttl_ms.map(|ms| timestamp_after_ms(ms as i64));
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO kv_cache (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
                params![key, value, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Read `key`. Expired or missing entries return `None`.
pub async fn get(db: &Database, key: &str) -> Result<Option<String>, ReverieError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_cache
                     WHERE key = ?1
                       AND (expires_at IS NULL
                            OR expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(value)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete `key` if present.
pub async fn delete(db: &Database, key: &str) -> Result<(), ReverieError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM kv_cache WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete all expired entries; returns the number of rows removed.
pub async fn purge_expired(db: &Database) -> Result<usize, ReverieError> {
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM kv_cache
                 WHERE expires_at IS NOT NULL
                   AND expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}
