// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval-augmented generation for the Reverie engine.
//!
//! A bounded-retry state machine fans a question out into several
//! angled sub-queries, retrieves concurrently from the shared
//! [`VectorIndex`](reverie_memory::VectorIndex), evaluates relevance,
//! and generates an answer grounded strictly in the retrieved context.

pub mod graph;
pub mod researcher;
pub mod state;

pub use graph::{NO_RELEVANT_INFORMATION, RagAnswer, RagOptions, RetrievalGraph};
pub use researcher::Researcher;
pub use state::{MAX_RETRIEVAL_ROUNDS, NextStep, RetrievalState, RetrievedDocument, decide};
