// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Reverie memory engine.

use thiserror::Error;

/// The primary error type used across all Reverie adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ReverieError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM or embedding provider errors (API failure, token limits, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Model output not parseable in the expected shape (JSON object/array, number).
    ///
    /// Callers of extraction and scoring paths recover from this locally;
    /// it never escapes to the chat surface.
    #[error("parse error: {0}")]
    Parse(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
