// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all external-collaborator adapters implement.

use async_trait::async_trait;

use crate::error::ReverieError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all Reverie adapters.
///
/// Every adapter (LLM provider, embedding provider) implements this
/// trait, which provides identity, health check, and shutdown hooks.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the type of adapter (provider, embedding, storage).
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, ReverieError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), ReverieError>;
}
