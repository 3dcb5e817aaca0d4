// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debounced, cancellable dispatch of extraction jobs.
//!
//! Each `schedule_extraction` call cancels the session's still-delayed
//! job (if any) and enqueues a fresh one, so rapid repeated calls for
//! the same session collapse into one eventual execution. The queue and
//! cache are the source of truth; there is no in-process lock, so two
//! truly simultaneous calls may both enqueue — callers tolerate
//! eventual, not exactly-once, collapsing.

use std::time::Duration;

use metrics::counter;
use reverie_config::ExtractionConfig;
use reverie_core::{ChatMessage, ReverieError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use reverie_storage::{Database, kv, queue};

use crate::types::{ExtractionJob, MemorySchema};
use crate::worker::ExtractionWorker;

/// Queue kind tag for extraction jobs.
const JOB_KIND: &str = "memory_extraction";

/// Debounce cache key for a session's pending extraction job id.
pub(crate) fn debounce_key(session_id: &str) -> String {
    format!("extract:debounce:{session_id}")
}

/// Debounced dispatcher for background memory extraction.
pub struct ExtractionScheduler {
    db: Database,
    config: ExtractionConfig,
}

impl ExtractionScheduler {
    /// Creates a new scheduler over the shared database.
    pub fn new(db: Database, config: ExtractionConfig) -> Self {
        Self { db, config }
    }

    /// Schedule extraction for a session, collapsing rapid repeat calls.
    ///
    /// Cancels the session's previous job when it is still in the
    /// `delayed` state, then enqueues a new job due after the debounce
    /// window and records its id under the session's debounce key with
    /// a TTL slightly beyond the window.
    ///
    /// Returns the enqueued job id.
    pub async fn schedule_extraction(
        &self,
        session_id: &str,
        user_id: &str,
        messages: &[ChatMessage],
        schemas: Option<Vec<MemorySchema>>,
    ) -> Result<String, ReverieError> {
        let key = debounce_key(session_id);

        if let Some(previous_id) = kv::get(&self.db, &key).await? {
            if queue::state(&self.db, &previous_id).await? == Some(queue::JobState::Delayed) {
                let removed = queue::remove_delayed(&self.db, &previous_id).await?;
                debug!(session_id, job_id = %previous_id, removed, "debounce superseded job");
            }
        }

        let job = ExtractionJob {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            messages: messages.to_vec(),
            schemas: schemas.unwrap_or_default(),
        };
        let payload = serde_json::to_string(&job)
            .map_err(|e| ReverieError::Internal(format!("unserializable job: {e}")))?;

        let job_id = Uuid::new_v4().to_string();
        queue::add(
            &self.db,
            &job_id,
            JOB_KIND,
            &payload,
            self.config.debounce_ms,
            self.config.max_attempts,
        )
        .await?;
        kv::set(
            &self.db,
            &key,
            &job_id,
            Some(self.config.debounce_ms + self.config.debounce_ttl_extra_ms),
        )
        .await?;

        counter!("reverie_extraction_scheduled_total").increment(1);
        debug!(session_id, job_id = %job_id, delay_ms = self.config.debounce_ms, "scheduled extraction");
        Ok(job_id)
    }

    /// Claim and process every currently-due job.
    ///
    /// Job payload or processing failures are recorded against the queue
    /// (its retry policy applies) and do not stop the drain.
    ///
    /// Returns the number of jobs completed.
    pub async fn drain_due(&self, worker: &ExtractionWorker) -> Result<usize, ReverieError> {
        let mut completed = 0;
        while let Some(entry) = queue::claim_due(&self.db).await? {
            match serde_json::from_str::<ExtractionJob>(&entry.payload) {
                Ok(job) => match worker.process(&job).await {
                    Ok(()) => {
                        queue::complete(&self.db, &entry.id).await?;
                        completed += 1;
                    }
                    Err(e) => {
                        warn!(job_id = %entry.id, error = %e, "extraction job failed");
                        queue::fail(&self.db, &entry.id).await?;
                    }
                },
                Err(e) => {
                    warn!(job_id = %entry.id, error = %e, "unreadable extraction payload");
                    queue::fail(&self.db, &entry.id).await?;
                }
            }
        }
        Ok(completed)
    }

    /// Poll loop: claims due jobs until the token is cancelled.
    ///
    /// Drain errors are logged and the loop continues; only cancellation
    /// stops it.
    pub async fn run(&self, worker: &ExtractionWorker, cancel: CancellationToken) {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        info!(poll_interval_ms = self.config.poll_interval_ms, "extraction runner started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("extraction runner stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.drain_due(worker).await {
                        warn!(error = %e, "extraction drain failed");
                    }
                }
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_key_is_per_session() {
        assert_eq!(debounce_key("s1"), "extract:debounce:s1");
        assert_ne!(debounce_key("s1"), debounce_key("s2"));
    }
}
