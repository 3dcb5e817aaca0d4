// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval state machine: per-invocation state and the pure
//! transition rule that bounds the retrieve/evaluate loop.
//!
//! The transition decision is separated from the effectful retrieval
//! step so the termination bound is unit-testable without any LLM.

use uuid::Uuid;

/// Hard cap on retrieval rounds; guarantees termination regardless of
/// evaluator output.
pub const MAX_RETRIEVAL_ROUNDS: u32 = 3;

/// A retrieved document with a stable content-derived identity.
///
/// The v5 UUID over the content means identical documents surfaced by
/// different queries collapse to one on join.
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub id: Uuid,
    pub content: String,
    pub similarity: f32,
}

impl RetrievedDocument {
    /// Build a document whose id is derived from its content.
    pub fn from_content(content: String, similarity: f32) -> Self {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes());
        Self {
            id,
            content,
            similarity,
        }
    }
}

/// Ephemeral state threaded through one retrieval-graph invocation.
#[derive(Debug, Clone, Default)]
pub struct RetrievalState {
    pub query: String,
    pub rewritten_query: String,
    pub documents: Vec<RetrievedDocument>,
    pub relevance_scores: Vec<f32>,
    pub needs_reretrieval: bool,
    /// Monotonically increasing, capped at [`MAX_RETRIEVAL_ROUNDS`].
    pub retrieval_round: u32,
    pub answer: Option<String>,
    pub answer_quality: Option<f32>,
}

impl RetrievalState {
    /// Fresh state for a question.
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            rewritten_query: query.to_string(),
            ..Self::default()
        }
    }
}

/// Where the graph goes after relevance evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Increment the round and retrieve again.
    Retrieve,
    /// Proceed to answer generation.
    GenerateAnswer,
}

/// Pure transition rule after relevance evaluation.
///
/// Loops back to retrieval only while re-retrieval is requested and the
/// round cap has not been reached.
pub fn decide(needs_reretrieval: bool, retrieval_round: u32) -> NextStep {
    if needs_reretrieval && retrieval_round < MAX_RETRIEVAL_ROUNDS {
        NextStep::Retrieve
    } else {
        NextStep::GenerateAnswer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfied_evaluator_generates_immediately() {
        assert_eq!(decide(false, 1), NextStep::GenerateAnswer);
        assert_eq!(decide(false, 3), NextStep::GenerateAnswer);
    }

    #[test]
    fn unsatisfied_evaluator_loops_until_cap() {
        assert_eq!(decide(true, 1), NextStep::Retrieve);
        assert_eq!(decide(true, 2), NextStep::Retrieve);
        assert_eq!(decide(true, 3), NextStep::GenerateAnswer);
        assert_eq!(decide(true, 99), NextStep::GenerateAnswer);
    }

    #[test]
    fn always_unsatisfied_terminates_in_three_rounds() {
        // Simulate the graph loop against an evaluator that always wants more.
        let mut round = 1;
        let mut retrievals = 1;
        while decide(true, round) == NextStep::Retrieve {
            round += 1;
            retrievals += 1;
        }
        assert_eq!(retrievals, MAX_RETRIEVAL_ROUNDS);
        assert_eq!(round, MAX_RETRIEVAL_ROUNDS);
    }

    #[test]
    fn identical_content_yields_identical_identity() {
        let a = RetrievedDocument::from_content("same fact".to_string(), 0.8);
        let b = RetrievedDocument::from_content("same fact".to_string(), 0.4);
        assert_eq!(a.id, b.id);

        let c = RetrievedDocument::from_content("different fact".to_string(), 0.8);
        assert_ne!(a.id, c.id);
    }
}
