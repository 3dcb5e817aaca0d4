// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-query retrieval: decompose a question into angled sub-queries,
//! fan them out concurrently, and union the results by document identity.
//!
//! One spawned task per query; a failing branch is caught at the join
//! and contributes nothing, so siblings always complete.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use reverie_core::json::extract_array;
use reverie_core::types::ProviderRequest;
use reverie_core::{ChatMessage, ProviderAdapter, ReverieError};
use tracing::{debug, warn};

use reverie_memory::VectorIndex;

use crate::state::RetrievedDocument;

/// Prompt template for query decomposition.
const QUERY_PROMPT: &str = r#"Decompose the question below into 3 to 5 search queries that approach it from different angles (rephrasings, sub-questions, related terms).

Question:
{question}

Output ONLY a JSON array of strings."#;

/// Decomposes questions and retrieves documents concurrently.
#[derive(Clone)]
pub struct Researcher {
    index: Arc<VectorIndex>,
    provider: Arc<dyn ProviderAdapter>,
    model: String,
}

impl Researcher {
    /// Creates a new researcher over the shared index and provider.
    pub fn new(index: Arc<VectorIndex>, provider: Arc<dyn ProviderAdapter>, model: String) -> Self {
        Self {
            index,
            provider,
            model,
        }
    }

    /// Ask the model for 3-5 differently-angled search queries.
    ///
    /// Unparseable or empty output falls back to the original question;
    /// provider failures propagate.
    pub async fn generate_queries(&self, question: &str) -> Result<Vec<String>, ReverieError> {
        let prompt = QUERY_PROMPT.replace("{question}", question);
        let response = self
            .provider
            .complete(ProviderRequest {
                model: self.model.clone(),
                system_prompt: None,
                messages: vec![ChatMessage::user(prompt)],
                max_tokens: 512,
            })
            .await?;

        match extract_array::<String>(&response.content) {
            Ok(queries) if !queries.is_empty() => Ok(queries),
            Ok(_) => {
                debug!("query decomposition returned no queries, using original");
                Ok(vec![question.to_string()])
            }
            Err(e) => {
                debug!(error = %e, "query decomposition unparseable, using original");
                Ok(vec![question.to_string()])
            }
        }
    }

    /// Decompose, fan out one retrieval task per query, and union by id.
    ///
    /// Result order is not significant. A failed branch is logged and
    /// treated as "no documents from this query".
    pub async fn research(
        &self,
        question: &str,
        collection: &str,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<RetrievedDocument>, ReverieError> {
        let queries = self.generate_queries(question).await?;
        debug!(count = queries.len(), "fanning out retrieval queries");

        let tasks: Vec<_> = queries
            .into_iter()
            .map(|query| {
                let researcher = self.clone();
                let collection = collection.to_string();
                tokio::spawn(async move {
                    researcher
                        .retrieve_documents(&query, &collection, top_k, score_threshold)
                        .await
                })
            })
            .collect();

        let mut seen: HashSet<uuid::Uuid> = HashSet::new();
        let mut merged: Vec<RetrievedDocument> = Vec::new();
        for outcome in join_all(tasks).await {
            match outcome {
                Ok(Ok(documents)) => {
                    for document in documents {
                        if seen.insert(document.id) {
                            merged.push(document);
                        }
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "retrieval branch failed"),
                Err(e) => warn!(error = %e, "retrieval task aborted"),
            }
        }
        Ok(merged)
    }

    /// Top-K similarity search for one query, keeping documents at or
    /// above the score threshold, each with a content-derived identity.
    async fn retrieve_documents(
        &self,
        query: &str,
        collection: &str,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<RetrievedDocument>, ReverieError> {
        let results = self
            .index
            .similarity_search_with_score(query, top_k, collection)
            .await?;
        Ok(results
            .into_iter()
            .filter(|(_, score)| *score >= score_threshold)
            .map(|(document, score)| RetrievedDocument::from_content(document.content, score))
            .collect())
    }
}
