// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tiered memory system for the Reverie engine.
//!
//! Three tiers give a conversational agent continuity across turns and
//! sessions:
//!
//! - **Short-term**: session cache blobs and recent raw messages (TTL cache)
//! - **Mid-term**: vector-indexed episodic recall ([`VectorIndex`])
//! - **Long-term**: structured scoped key/value memory and user profiles
//!   ([`MemoryStore`])
//!
//! [`MemoryFusion`] composes the tiers into one context per turn;
//! [`ExtractionScheduler`] and [`ExtractionWorker`] turn finished
//! conversation bursts into durable memories through a debounced,
//! cancellable job queue.

pub mod fusion;
pub mod index;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod worker;

pub use fusion::{MemoryContext, MemoryFusion, RecalledMemory, ShortTermContext, format_memory_context};
pub use index::VectorIndex;
pub use scheduler::ExtractionScheduler;
pub use store::MemoryStore;
pub use types::*;
pub use worker::ExtractionWorker;
