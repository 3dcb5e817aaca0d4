// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Reverie integration tests.
//!
//! Provides mock adapters for fast, deterministic, CI-runnable tests
//! without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Mock LLM provider with routed and queued responses
//! - [`MockEmbedder`] - Deterministic embedding adapter with a failure mode

pub mod mock_embedder;
pub mod mock_provider;

pub use mock_embedder::MockEmbedder;
pub use mock_provider::MockProvider;
