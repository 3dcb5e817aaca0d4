// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for LLM chat-completion integrations.

use async_trait::async_trait;

use crate::error::ReverieError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse};

/// Adapter for LLM chat-completion providers.
///
/// Reverie uses completion for memory extraction, query decomposition,
/// relevance scoring, and grounded answer generation. Providers enforce
/// their own timeout and retry policy; Reverie only propagates.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ReverieError>;
}
