// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Reverie memory engine.
//!
//! This crate provides the foundational trait definitions, error types,
//! and common types used throughout the Reverie workspace. External
//! collaborators (LLM providers, embedding providers) implement the
//! adapter traits defined here.

pub mod error;
pub mod json;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ReverieError;
pub use types::{AdapterType, ChatMessage, HealthStatus, TokenUsage};

// Re-export adapter traits at crate root.
pub use traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter};
