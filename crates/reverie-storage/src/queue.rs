// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable delayed-job queue backed by the `jobs` table.
//!
//! Jobs are inserted in the `delayed` state with a future `run_at`.
//! The `delayed` state is queryable, which is what makes pre-execution
//! cancellation (debounce collapsing) possible: a still-delayed job can
//! be removed; a job that has started runs to completion.
//!
//! Lifecycle: `delayed` -> `processing` -> `completed` | `failed`,
//! with retry back to `delayed` while attempts remain.

use reverie_core::ReverieError;
use rusqlite::params;
use tracing::debug;

use crate::database::{Database, map_tr_err, timestamp_after_ms};

/// Fixed re-delay applied when a failed job still has attempts left.
const RETRY_BACKOFF_MS: i64 = 5_000;

/// Observable state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Scheduled but not yet started; removable.
    Delayed,
    /// Claimed by a runner; runs to completion.
    Processing,
    /// Finished successfully.
    Completed,
    /// Exhausted all attempts.
    Failed,
}

impl JobState {
    fn from_str_value(s: &str) -> Self {
        match s {
            "delayed" => JobState::Delayed,
            "processing" => JobState::Processing,
            "completed" => JobState::Completed,
            _ => JobState::Failed,
        }
    }
}

/// A claimed job row handed to the worker.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub id: String,
    pub kind: String,
    pub payload: String,
    pub attempts: u32,
    pub max_attempts: u32,
}

/// Insert a job in the `delayed` state, due `delay_ms` from now.
pub async fn add(
    db: &Database,
    id: &str,
    kind: &str,
    payload: &str,
    delay_ms: u64,
    max_attempts: u32,
) -> Result<(), ReverieError> {
    let id = id.to_string();
    let kind = kind.to_string();
    let payload = payload.to_string();
    let run_at = timestamp_after_ms(delay_ms as i64);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO jobs (id, kind, payload, status, run_at, max_attempts)
                 VALUES (?1, ?2, ?3, 'delayed', ?4, ?5)",
                params![id, kind, payload, run_at, max_attempts],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Look up a job's current state. `None` when the job no longer exists.
pub async fn state(db: &Database, id: &str) -> Result<Option<JobState>, ReverieError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let status: Option<String> = conn
                .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(status.map(|s| JobState::from_str_value(&s)))
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a job only while it is still `delayed`.
///
/// Returns whether a row was removed. A job already claimed by a runner
/// is left untouched; in-flight work runs to completion.
pub async fn remove_delayed(db: &Database, id: &str) -> Result<bool, ReverieError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM jobs WHERE id = ?1 AND status = 'delayed'",
                params![id],
            )?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Transactionally claim the oldest due `delayed` job, flipping it to `processing`.
///
/// Returns `None` when nothing is due yet.
pub async fn claim_due(db: &Database) -> Result<Option<JobEntry>, ReverieError> {
    let claimed = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(
                    "SELECT id, kind, payload, attempts, max_attempts FROM jobs
                     WHERE status = 'delayed'
                       AND run_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     ORDER BY run_at ASC
                     LIMIT 1",
                )?;
                stmt.query_row([], |row| {
                    Ok(JobEntry {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        payload: row.get(2)?,
                        attempts: row.get(3)?,
                        max_attempts: row.get(4)?,
                    })
                })
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE jobs SET status = 'processing',
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![entry.id],
                    )?;
                    tx.commit()?;
                    Ok(Some(entry))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;
    if let Some(entry) = &claimed {
        debug!(job_id = %entry.id, kind = %entry.kind, attempts = entry.attempts, "claimed due job");
    }
    Ok(claimed)
}

/// Acknowledge successful processing: marks the job `completed`.
pub async fn complete(db: &Database, id: &str) -> Result<(), ReverieError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE jobs SET status = 'completed',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed attempt.
///
/// Re-delays the job with a fixed backoff while attempts remain,
/// otherwise marks it `failed`.
pub async fn fail(db: &Database, id: &str) -> Result<(), ReverieError> {
    let id = id.to_string();
    let retry_at = timestamp_after_ms(RETRY_BACKOFF_MS);
    db.connection()
        .call(move |conn| {
            let (attempts, max_attempts): (u32, u32) = conn.query_row(
                "SELECT attempts, max_attempts FROM jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            if new_attempts >= max_attempts {
                conn.execute(
                    "UPDATE jobs SET status = 'failed', attempts = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![new_attempts, id],
                )?;
            } else {
                conn.execute(
                    "UPDATE jobs SET status = 'delayed', attempts = ?1, run_at = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![new_attempts, retry_at, id],
                )?;
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Count jobs currently in the given state (debounce-collapsing checks).
pub async fn count_in_state(db: &Database, job_state: JobState) -> Result<u32, ReverieError> {
    let status = match job_state {
        JobState::Delayed => "delayed",
        JobState::Processing => "processing",
        JobState::Completed => "completed",
        JobState::Failed => "failed",
    };
    db.connection()
        .call(move |conn| {
            let count: u32 = conn.query_row(
                "SELECT count(*) FROM jobs WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
        .map_err(map_tr_err)
}
