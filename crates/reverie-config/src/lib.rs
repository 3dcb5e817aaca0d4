// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Reverie memory engine.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), file hierarchy lookup, and environment
//! variable overrides via Figment.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    ExtractionConfig, MemoryConfig, RetrievalConfig, ReverieConfig, StorageConfig,
};
