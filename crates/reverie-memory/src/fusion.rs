// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Façade composing the three memory tiers into one context.
//!
//! Tier lookups run concurrently. Mid-term (episodic vector search)
//! failures degrade to an empty list; short-term and long-term failures
//! propagate to the caller. The formatted context is used verbatim as a
//! system-prompt fragment, so its serialization is deterministic and
//! empty sections are omitted.

use std::sync::Arc;

use metrics::counter;
use reverie_config::MemoryConfig;
use reverie_core::{ChatMessage, ReverieError};
use serde_json::Value;
use tracing::warn;

use reverie_storage::{Database, kv};

use crate::index::VectorIndex;
use crate::scheduler::ExtractionScheduler;
use crate::store::MemoryStore;
use crate::types::{MemorySchema, MergedMemoryContext};

/// Rolling cap on cached raw messages per session.
const MESSAGE_CACHE_CAP: usize = 50;

/// Session-scoped cache state plus recent raw messages.
#[derive(Debug, Clone, Default)]
pub struct ShortTermContext {
    /// Free-form session context blob, if one was written.
    pub session_context: Option<Value>,
    /// Most recent cached messages, oldest first.
    pub recent_messages: Vec<ChatMessage>,
}

/// An episodic memory recalled by similarity, with its score.
#[derive(Debug, Clone)]
pub struct RecalledMemory {
    pub content: String,
    pub score: f32,
}

/// The fused three-tier memory context for one turn.
#[derive(Debug, Clone)]
pub struct MemoryContext {
    pub short_term: ShortTermContext,
    pub mid_term: Vec<RecalledMemory>,
    pub long_term: MergedMemoryContext,
}

fn context_key(session_id: &str) -> String {
    format!("session:ctx:{session_id}")
}

fn messages_key(session_id: &str) -> String {
    format!("session:msgs:{session_id}")
}

/// Memory façade: one read call before each turn, one write call after.
pub struct MemoryFusion {
    db: Database,
    store: Arc<MemoryStore>,
    index: Arc<VectorIndex>,
    scheduler: Arc<ExtractionScheduler>,
    config: MemoryConfig,
}

impl MemoryFusion {
    /// Creates the fusion façade over the shared tiers.
    pub fn new(
        db: Database,
        store: Arc<MemoryStore>,
        index: Arc<VectorIndex>,
        scheduler: Arc<ExtractionScheduler>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            db,
            store,
            index,
            scheduler,
            config,
        }
    }

    /// Fetch all three memory tiers concurrently.
    ///
    /// Mid-term search errors degrade to an empty list; short-term and
    /// long-term errors propagate.
    pub async fn get_memory_context(
        &self,
        session_id: &str,
        user_id: &str,
        query: &str,
    ) -> Result<MemoryContext, ReverieError> {
        counter!("reverie_memory_context_requests_total").increment(1);
        let (short_term, mid_term, long_term) = tokio::join!(
            self.short_term(session_id),
            self.mid_term(user_id, query),
            self.store.get_merged_memory_for_session(session_id, user_id),
        );

        Ok(MemoryContext {
            short_term: short_term?,
            mid_term,
            long_term: long_term?,
        })
    }

    async fn short_term(&self, session_id: &str) -> Result<ShortTermContext, ReverieError> {
        let session_context = kv::get(&self.db, &context_key(session_id))
            .await?
            .and_then(|text| serde_json::from_str(&text).ok());

        let mut recent_messages: Vec<ChatMessage> = kv::get(&self.db, &messages_key(session_id))
            .await?
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        let keep = self.config.short_term_messages;
        if recent_messages.len() > keep {
            recent_messages.drain(..recent_messages.len() - keep);
        }

        Ok(ShortTermContext {
            session_context,
            recent_messages,
        })
    }

    async fn mid_term(&self, user_id: &str, query: &str) -> Vec<RecalledMemory> {
        let mut filter = serde_json::Map::new();
        filter.insert("user_id".to_string(), Value::String(user_id.to_string()));

        match self
            .index
            .similarity_search_with_filter(
                query,
                self.config.mid_term_top_k,
                &filter,
                &self.config.episodic_collection,
            )
            .await
        {
            Ok(results) => results
                .into_iter()
                .map(|(doc, score)| RecalledMemory {
                    content: doc.content,
                    score,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "mid-term memory search failed, degrading to empty");
                vec![]
            }
        }
    }

    /// Overwrite the session's free-form context blob.
    pub async fn update_session_context(
        &self,
        session_id: &str,
        context: &Value,
    ) -> Result<(), ReverieError> {
        kv::set(&self.db, &context_key(session_id), &context.to_string(), None).await
    }

    /// Append a message to the session's rolling message cache.
    pub async fn push_message(
        &self,
        session_id: &str,
        message: &ChatMessage,
    ) -> Result<(), ReverieError> {
        let key = messages_key(session_id);
        let mut messages: Vec<ChatMessage> = kv::get(&self.db, &key)
            .await?
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        messages.push(message.clone());
        if messages.len() > MESSAGE_CACHE_CAP {
            messages.drain(..messages.len() - MESSAGE_CACHE_CAP);
        }
        let serialized = serde_json::to_string(&messages)
            .map_err(|e| ReverieError::Internal(format!("unserializable messages: {e}")))?;
        kv::set(&self.db, &key, &serialized, None).await
    }

    /// Snapshot recent messages into the short-term cache, then hand the
    /// batch to the extraction scheduler (the debounce lives there).
    pub async fn schedule_memory_update(
        &self,
        session_id: &str,
        user_id: &str,
        messages: &[ChatMessage],
        schemas: Option<Vec<MemorySchema>>,
    ) -> Result<(), ReverieError> {
        let keep = self.config.short_term_messages;
        let snapshot: Vec<ChatMessage> = messages
            .iter()
            .skip(messages.len().saturating_sub(keep))
            .cloned()
            .collect();
        let serialized = serde_json::to_string(&snapshot)
            .map_err(|e| ReverieError::Internal(format!("unserializable messages: {e}")))?;
        kv::set(&self.db, &messages_key(session_id), &serialized, None).await?;

        self.scheduler
            .schedule_extraction(session_id, user_id, messages, schemas)
            .await?;
        Ok(())
    }
}

/// Render a memory context as a deterministic system-prompt fragment.
///
/// Sections in order: profile, relevant memories (score-annotated),
/// preferences, rules. Empty sections are omitted entirely.
pub fn format_memory_context(context: &MemoryContext) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(profile) = &context.long_term.profile {
        let mut lines = Vec::new();
        if let Some(name) = &profile.preferred_name {
            lines.push(format!("- Name: {name}"));
        }
        if let Some(age) = profile.age {
            lines.push(format!("- Age: {age}"));
        }
        if let Some(location) = &profile.location {
            lines.push(format!("- Location: {location}"));
        }
        if let Some(occupation) = &profile.occupation {
            lines.push(format!("- Occupation: {occupation}"));
        }
        if !profile.interests.is_empty() {
            lines.push(format!("- Interests: {}", profile.interests.join(", ")));
        }
        if !lines.is_empty() {
            sections.push(format!("## User Profile\n{}", lines.join("\n")));
        }
    }

    if !context.mid_term.is_empty() {
        let lines: Vec<String> = context
            .mid_term
            .iter()
            .map(|memory| format!("- [{:.2}] {}", memory.score, memory.content))
            .collect();
        sections.push(format!("## Relevant Memories\n{}", lines.join("\n")));
    }

    if !context.long_term.prefs.is_empty() {
        let lines: Vec<String> = context
            .long_term
            .prefs
            .iter()
            .map(|(key, value)| format!("- {key}: {}", value_text(value)))
            .collect();
        sections.push(format!("## Preferences\n{}", lines.join("\n")));
    }

    if !context.long_term.rules.is_empty() {
        let lines: Vec<String> = context
            .long_term
            .rules
            .iter()
            .map(|rule| format!("- {rule}"))
            .collect();
        sections.push(format!("## Rules\n{}", lines.join("\n")));
    }

    sections.join("\n\n")
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserProfile;
    use serde_json::json;

    fn empty_context() -> MemoryContext {
        MemoryContext {
            short_term: ShortTermContext::default(),
            mid_term: vec![],
            long_term: MergedMemoryContext::default(),
        }
    }

    #[test]
    fn empty_context_formats_to_empty_string() {
        assert_eq!(format_memory_context(&empty_context()), "");
    }

    #[test]
    fn profile_section_lists_present_fields_only() {
        let mut context = empty_context();
        context.long_term.profile = Some(UserProfile {
            user_id: "u1".into(),
            preferred_name: Some("Ada".into()),
            location: Some("Berlin".into()),
            interests: vec!["chess".into()],
            ..UserProfile::default()
        });

        let text = format_memory_context(&context);
        assert!(text.starts_with("## User Profile\n"));
        assert!(text.contains("- Name: Ada"));
        assert!(text.contains("- Location: Berlin"));
        assert!(text.contains("- Interests: chess"));
        assert!(!text.contains("- Age:"));
        assert!(!text.contains("- Occupation:"));
    }

    #[test]
    fn empty_profile_emits_no_section() {
        let mut context = empty_context();
        context.long_term.profile = Some(UserProfile {
            user_id: "u1".into(),
            ..UserProfile::default()
        });
        assert_eq!(format_memory_context(&context), "");
    }

    #[test]
    fn memories_are_score_annotated() {
        let mut context = empty_context();
        context.mid_term = vec![RecalledMemory {
            content: "User is going to Japan in April".into(),
            score: 0.825,
        }];

        let text = format_memory_context(&context);
        assert!(text.contains("## Relevant Memories"));
        assert!(text.contains("- [0.82] User is going to Japan in April"));
    }

    #[test]
    fn preferences_and_rules_sections() {
        let mut context = empty_context();
        context.long_term.prefs.insert("lang".into(), json!("en"));
        context.long_term.prefs.insert("format".into(), json!({"style": "brief"}));
        context.long_term.rules = vec!["cite sources".into()];

        let text = format_memory_context(&context);
        assert!(text.contains("## Preferences\n- format: {\"style\":\"brief\"}\n- lang: en"));
        assert!(text.contains("## Rules\n- cite sources"));
    }

    #[test]
    fn sections_are_separated_by_blank_lines() {
        let mut context = empty_context();
        context.mid_term = vec![RecalledMemory {
            content: "fact".into(),
            score: 0.5,
        }];
        context.long_term.rules = vec!["r".into()];

        let text = format_memory_context(&context);
        assert!(text.contains("- [0.50] fact\n\n## Rules"));
    }

    #[test]
    fn formatting_is_deterministic() {
        let mut context = empty_context();
        context.long_term.prefs.insert("b".into(), json!("2"));
        context.long_term.prefs.insert("a".into(), json!("1"));

        let first = format_memory_context(&context);
        let second = format_memory_context(&context);
        assert_eq!(first, second);
        // BTreeMap ordering: "a" before "b".
        assert!(first.find("- a: 1").unwrap() < first.find("- b: 2").unwrap());
    }
}
