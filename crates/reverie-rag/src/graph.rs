// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded-retry retrieval graph.
//!
//! States: QueryUnderstanding -> Retrieve -> EvaluateRelevance ->
//! (IncrementRound -> Retrieve | GenerateAnswer) -> EvaluateAnswer -> END.
//! The pure [`decide`](crate::state::decide) rule caps the loop at three
//! retrieval rounds regardless of evaluator output. When no document
//! meets the relevance threshold, generation is skipped entirely and a
//! fixed no-information answer is returned.

use std::sync::Arc;

use futures::future::join_all;
use metrics::{counter, histogram};
use reverie_config::RetrievalConfig;
use reverie_core::json::parse_unit_score;
use reverie_core::types::ProviderRequest;
use reverie_core::{ChatMessage, ProviderAdapter, ReverieError};
use tracing::{debug, warn};

use reverie_memory::VectorIndex;

use crate::researcher::Researcher;
use crate::state::{NextStep, RetrievalState, decide};

/// Fixed answer returned when nothing meets the relevance threshold.
pub const NO_RELEVANT_INFORMATION: &str =
    "I could not find relevant information to answer this question.";

/// Prompt template for query rewriting.
const REWRITE_PROMPT: &str = r#"Rewrite the question below as a single standalone search query, resolving pronouns and vague references. Output ONLY the rewritten query.

Question:
{question}"#;

/// Prompt template for per-document relevance scoring.
const SCORE_PROMPT: &str = r#"Score how relevant the document is to the query on a scale from 0.0 to 1.0. Output ONLY the number.

Query:
{query}

Document:
{document}"#;

/// Prompt template for grounded answer generation.
const ANSWER_PROMPT: &str = r#"Answer the question using ONLY the information in the context below. If the context does not contain the answer, say that the context does not cover it.

Context:
{context}

Question:
{question}"#;

/// Prompt template for answer self-grading.
const GRADE_PROMPT: &str = r#"Score how well the answer addresses the question on a scale from 0.0 to 1.0. Output ONLY the number.

Question:
{question}

Answer:
{answer}"#;

/// Per-call overrides for [`RetrievalGraph::rag_query`].
#[derive(Debug, Clone, Default)]
pub struct RagOptions {
    pub collection: Option<String>,
    pub top_k: Option<usize>,
    pub relevance_threshold: Option<f32>,
}

/// Result of one retrieval-graph invocation.
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    /// Contents of the documents the answer was grounded on.
    pub sources: Vec<String>,
    /// Relevance scores aligned with `sources`.
    pub relevance_scores: Vec<f32>,
    /// Self-graded answer quality, when grading succeeded.
    pub answer_quality: Option<f32>,
}

/// The bounded-retry retrieval state machine.
pub struct RetrievalGraph {
    researcher: Researcher,
    provider: Arc<dyn ProviderAdapter>,
    config: RetrievalConfig,
}

impl RetrievalGraph {
    /// Creates a new graph over the shared index and provider.
    pub fn new(
        index: Arc<VectorIndex>,
        provider: Arc<dyn ProviderAdapter>,
        config: RetrievalConfig,
    ) -> Self {
        let researcher = Researcher::new(index, provider.clone(), config.model.clone());
        Self {
            researcher,
            provider,
            config,
        }
    }

    /// Run the full graph for a question.
    pub async fn rag_query(
        &self,
        question: &str,
        options: RagOptions,
    ) -> Result<RagAnswer, ReverieError> {
        let collection = options
            .collection
            .unwrap_or_else(|| self.config.collection.clone());
        let top_k = options.top_k.unwrap_or(self.config.top_k);
        let threshold = options
            .relevance_threshold
            .unwrap_or(self.config.relevance_threshold);

        counter!("reverie_rag_queries_total").increment(1);

        // QueryUnderstanding
        let mut state = RetrievalState::new(question);
        state.rewritten_query = self.understand_query(question).await?;

        // Retrieve/EvaluateRelevance loop, bounded by `decide`.
        state.retrieval_round = 1;
        self.retrieve_and_evaluate(&mut state, &collection, top_k, threshold)
            .await?;
        while decide(state.needs_reretrieval, state.retrieval_round) == NextStep::Retrieve {
            state.retrieval_round += 1;
            self.retrieve_and_evaluate(&mut state, &collection, top_k, threshold)
                .await?;
        }
        histogram!("reverie_rag_rounds").record(state.retrieval_round as f64);

        // GenerateAnswer
        let relevant: Vec<(String, f32)> = state
            .documents
            .iter()
            .zip(state.relevance_scores.iter())
            .filter(|(_, score)| **score >= threshold)
            .map(|(document, score)| (document.content.clone(), *score))
            .collect();

        let answer = if relevant.is_empty() {
            debug!(question, "no documents met the relevance threshold");
            NO_RELEVANT_INFORMATION.to_string()
        } else {
            self.generate_answer(question, &relevant).await?
        };
        state.answer = Some(answer.clone());

        // EvaluateAnswer (advisory; skipped for the canned answer).
        state.answer_quality = if relevant.is_empty() {
            None
        } else {
            self.grade_answer(question, &answer).await
        };

        let (sources, relevance_scores) = relevant.into_iter().unzip();
        Ok(RagAnswer {
            answer,
            sources,
            relevance_scores,
            answer_quality: state.answer_quality,
        })
    }

    /// One Retrieve + EvaluateRelevance pass.
    ///
    /// New documents union into the state by identity; every held
    /// document is then re-scored against the rewritten query, and
    /// re-retrieval is requested when none meets the threshold.
    async fn retrieve_and_evaluate(
        &self,
        state: &mut RetrievalState,
        collection: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<(), ReverieError> {
        let retrieved = self
            .researcher
            .research(&state.rewritten_query, collection, top_k, threshold)
            .await?;
        for document in retrieved {
            if !state.documents.iter().any(|d| d.id == document.id) {
                state.documents.push(document);
            }
        }

        let scores = join_all(
            state
                .documents
                .iter()
                .map(|document| self.score_relevance(&state.rewritten_query, &document.content)),
        )
        .await;
        state.relevance_scores = scores.into_iter().collect::<Result<Vec<f32>, _>>()?;
        state.needs_reretrieval = !state.relevance_scores.iter().any(|s| *s >= threshold);

        debug!(
            round = state.retrieval_round,
            documents = state.documents.len(),
            needs_reretrieval = state.needs_reretrieval,
            "retrieval round evaluated"
        );
        Ok(())
    }

    /// Rewrite the question into a standalone search query.
    ///
    /// A blank rewrite falls back to the original question.
    async fn understand_query(&self, question: &str) -> Result<String, ReverieError> {
        let prompt = REWRITE_PROMPT.replace("{question}", question);
        let response = self.provider.complete(self.request(prompt, 256)).await?;
        let rewritten = response.content.trim();
        if rewritten.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }

    /// LLM relevance score for a (query, document) pair, clamped to [0, 1].
    ///
    /// Non-numeric output scores 0.0.
    async fn score_relevance(&self, query: &str, document: &str) -> Result<f32, ReverieError> {
        let prompt = SCORE_PROMPT
            .replace("{query}", query)
            .replace("{document}", document);
        let response = self.provider.complete(self.request(prompt, 16)).await?;
        Ok(parse_unit_score(&response.content))
    }

    /// Answer strictly from the given context documents.
    async fn generate_answer(
        &self,
        question: &str,
        context: &[(String, f32)],
    ) -> Result<String, ReverieError> {
        let context_text: String = context
            .iter()
            .enumerate()
            .map(|(i, (content, _))| format!("[{}] {content}", i + 1))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = ANSWER_PROMPT
            .replace("{context}", &context_text)
            .replace("{question}", question);
        let response = self.provider.complete(self.request(prompt, 1024)).await?;
        Ok(response.content.trim().to_string())
    }

    /// Advisory answer self-grade; failures degrade to `None`.
    async fn grade_answer(&self, question: &str, answer: &str) -> Option<f32> {
        let prompt = GRADE_PROMPT
            .replace("{question}", question)
            .replace("{answer}", answer);
        match self.provider.complete(self.request(prompt, 16)).await {
            Ok(response) => Some(parse_unit_score(&response.content)),
            Err(e) => {
                warn!(error = %e, "answer grading failed");
                None
            }
        }
    }

    fn request(&self, prompt: String, max_tokens: u32) -> ProviderRequest {
        ProviderRequest {
            model: self.config.model.clone(),
            system_prompt: None,
            messages: vec![ChatMessage::user(prompt)],
            max_tokens,
        }
    }
}
