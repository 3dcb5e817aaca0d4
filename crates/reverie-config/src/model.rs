// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Reverie memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Reverie configuration.
///
/// Loaded from TOML files with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReverieConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Memory tier settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Background extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Retrieval-augmented generation settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "reverie.db".to_string()
}

/// Memory tier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Vector collection holding episodic memories.
    #[serde(default = "default_episodic_collection")]
    pub episodic_collection: String,

    /// Number of recent cached messages returned in the short-term tier.
    #[serde(default = "default_short_term_messages")]
    pub short_term_messages: usize,

    /// Top-K for the mid-term episodic similarity search.
    #[serde(default = "default_mid_term_top_k")]
    pub mid_term_top_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            episodic_collection: default_episodic_collection(),
            short_term_messages: default_short_term_messages(),
            mid_term_top_k: default_mid_term_top_k(),
        }
    }
}

fn default_episodic_collection() -> String {
    "episodic_memories".to_string()
}

fn default_short_term_messages() -> usize {
    10
}

fn default_mid_term_top_k() -> usize {
    5
}

/// Background extraction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Model used for extraction prompts.
    #[serde(default = "default_extraction_model")]
    pub model: String,

    /// Debounce window before a scheduled extraction runs, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Extra TTL on the debounce key beyond the debounce window, in milliseconds.
    #[serde(default = "default_debounce_ttl_extra_ms")]
    pub debounce_ttl_extra_ms: u64,

    /// Maximum delivery attempts before a job is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Poll interval of the job runner loop, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: default_extraction_model(),
            debounce_ms: default_debounce_ms(),
            debounce_ttl_extra_ms: default_debounce_ttl_extra_ms(),
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_extraction_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_debounce_ms() -> u64 {
    3000
}

fn default_debounce_ttl_extra_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    250
}

/// Retrieval-augmented generation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Model used for query decomposition, scoring, and answer generation.
    #[serde(default = "default_retrieval_model")]
    pub model: String,

    /// Default vector collection queried by the retrieval graph.
    #[serde(default = "default_retrieval_collection")]
    pub collection: String,

    /// Top-K documents fetched per generated sub-query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum similarity/relevance score a document must meet.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            model: default_retrieval_model(),
            collection: default_retrieval_collection(),
            top_k: default_top_k(),
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

fn default_retrieval_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_retrieval_collection() -> String {
    "documents".to_string()
}

fn default_top_k() -> usize {
    3
}

fn default_relevance_threshold() -> f32 {
    0.3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_contract() {
        let config = ReverieConfig::default();
        assert_eq!(config.memory.short_term_messages, 10);
        assert_eq!(config.memory.mid_term_top_k, 5);
        assert_eq!(config.extraction.debounce_ms, 3000);
        assert_eq!(config.extraction.debounce_ttl_extra_ms, 5000);
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.relevance_threshold - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn storage_default_path() {
        assert_eq!(StorageConfig::default().database_path, "reverie.db");
    }
}
