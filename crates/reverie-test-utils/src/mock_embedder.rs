// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock embedding adapter producing deterministic vectors.
//!
//! Texts are embedded by hashing whitespace tokens into a small fixed
//! number of dimensions, then L2-normalizing: identical texts embed
//! identically, token-overlapping texts score higher than disjoint
//! ones. Exact vectors can be pinned per text for precise score
//! control, and the whole adapter can be switched into a failing mode
//! to simulate an unreachable backend.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use reverie_core::traits::adapter::PluginAdapter;
use reverie_core::traits::embedding::EmbeddingAdapter;
use reverie_core::types::{AdapterType, HealthStatus};
use reverie_core::ReverieError;

/// Default embedding dimensionality.
const DIMS: usize = 8;

/// Deterministic mock embedding adapter.
pub struct MockEmbedder {
    overrides: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    poisoned: Arc<Mutex<Vec<String>>>,
    failing: AtomicBool,
}

impl MockEmbedder {
    /// Create a new mock embedder in hash-based mode.
    pub fn new() -> Self {
        Self {
            overrides: Arc::new(Mutex::new(HashMap::new())),
            poisoned: Arc::new(Mutex::new(Vec::new())),
            failing: AtomicBool::new(false),
        }
    }

    /// Pin an exact vector for a text (padded/truncated to 8 dims).
    pub async fn pin(&self, text: impl Into<String>, mut vector: Vec<f32>) {
        vector.resize(DIMS, 0.0);
        self.overrides.lock().await.insert(text.into(), vector);
    }

    /// Make all embedding calls fail (simulated backend outage).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only calls embedding this exact text (simulated bad branch).
    pub async fn fail_on(&self, text: impl Into<String>) {
        self.poisoned.lock().await.push(text.into());
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ReverieError> {
        if self.failing.load(Ordering::SeqCst)
            || self.poisoned.lock().await.iter().any(|t| t == text)
        {
            return Err(ReverieError::Provider {
                message: "mock embedding backend unavailable".to_string(),
                source: None,
            });
        }

        if let Some(vector) = self.overrides.lock().await.get(text) {
            return Ok(vector.clone());
        }

        let mut vector = vec![0.0_f32; DIMS];
        for token in text.split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % DIMS] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, ReverieError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ReverieError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ReverieError> {
        self.embed_text(text).await
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ReverieError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        Ok(embeddings)
    }
}
