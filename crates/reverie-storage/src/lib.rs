// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite storage layer for the Reverie memory engine.
//!
//! Provides the shared [`Database`] handle (WAL mode, embedded refinery
//! migrations), the durable delayed-job [`queue`] used by the extraction
//! scheduler, and the TTL [`kv`] cache used for session snapshots and
//! debounce bookkeeping.

pub mod database;
pub mod kv;
pub mod migrations;
pub mod queue;

pub use database::Database;
pub use queue::{JobEntry, JobState};
