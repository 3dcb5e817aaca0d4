// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::ReverieError;
use crate::traits::adapter::PluginAdapter;

/// Adapter for generating vector embeddings from text.
///
/// Embedding adapters power the vector index used by episodic memory
/// and retrieval-augmented generation.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Embeds a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ReverieError>;

    /// Embeds a batch of documents.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ReverieError>;
}
