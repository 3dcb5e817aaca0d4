// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-driven conversion of conversation batches into durable memories.
//!
//! Each configured [`MemorySchema`] runs concurrently under an
//! all-settle join: one schema's failure is logged and isolated, never
//! failing the whole job. Unparseable model output is a local no-op.
//! Errors on the shared path (clearing the debounce key) are rethrown
//! so the owning queue's retry policy applies.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use reverie_config::{ExtractionConfig, MemoryConfig};
use reverie_core::json::{extract_array, extract_object};
use reverie_core::{ChatMessage, ProviderAdapter, ReverieError};
use reverie_core::types::ProviderRequest;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use reverie_storage::{Database, kv};

use crate::index::VectorIndex;
use crate::scheduler::debounce_key;
use crate::store::MemoryStore;
use crate::types::{
    Document, EpisodicMemory, ExtractionJob, MemorySchema, UpdateMode, UserProfile,
    default_schemas,
};

/// Importance assigned to every insert-mode memory.
const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Prompt template for patch-mode (profile) extraction.
const PATCH_PROMPT: &str = r#"You maintain a structured user profile. {description}

Current profile (JSON):
{profile}

Conversation:
{conversation}

Output ONLY a JSON object containing the profile fields that should change, using keys from: preferred_name, age, occupation, location, interests, conversation_preferences, relationships. Output {} if nothing should change."#;

/// Prompt template for insert-mode (episodic) extraction.
const INSERT_PROMPT: &str = r#"Extract memories worth keeping from this conversation. {description}

Conversation:
{conversation}

Output ONLY a JSON array where each element is {"context": "...", "content": "..."}. The content must be a standalone statement. Output [] if there is nothing worth remembering."#;

/// One element of an insert-mode extraction response.
#[derive(Debug, Deserialize)]
struct ExtractedEpisode {
    context: String,
    content: String,
}

/// Converts message batches into profile patches and episodic inserts.
pub struct ExtractionWorker {
    db: Database,
    store: Arc<MemoryStore>,
    index: Arc<VectorIndex>,
    provider: Arc<dyn ProviderAdapter>,
    extraction: ExtractionConfig,
    memory: MemoryConfig,
}

impl ExtractionWorker {
    /// Creates a new extraction worker.
    pub fn new(
        db: Database,
        store: Arc<MemoryStore>,
        index: Arc<VectorIndex>,
        provider: Arc<dyn ProviderAdapter>,
        extraction: ExtractionConfig,
        memory: MemoryConfig,
    ) -> Self {
        Self {
            db,
            store,
            index,
            provider,
            extraction,
            memory,
        }
    }

    /// Run every schema for the job, then clear the session's debounce key.
    pub async fn process(&self, job: &ExtractionJob) -> Result<(), ReverieError> {
        let schemas = if job.schemas.is_empty() {
            default_schemas()
        } else {
            job.schemas.clone()
        };

        let outcomes = join_all(schemas.iter().map(|schema| self.run_schema(schema, job))).await;
        for (schema, outcome) in schemas.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(schema = %schema.name, session_id = %job.session_id, error = %e,
                      "schema extraction failed");
            }
        }

        kv::delete(&self.db, &debounce_key(&job.session_id)).await?;
        Ok(())
    }

    async fn run_schema(
        &self,
        schema: &MemorySchema,
        job: &ExtractionJob,
    ) -> Result<(), ReverieError> {
        match schema.update_mode {
            UpdateMode::Patch => self.run_patch(schema, job).await,
            UpdateMode::Insert => self.run_insert(schema, job).await,
        }
    }

    /// Patch mode: ask for profile field updates, apply only what is present.
    async fn run_patch(
        &self,
        schema: &MemorySchema,
        job: &ExtractionJob,
    ) -> Result<(), ReverieError> {
        let profile = self.store.get_profile(&job.user_id).await?;
        let prompt = build_patch_prompt(schema, profile.as_ref(), &job.messages);
        let response = self.provider.complete(self.request(prompt)).await?;

        let patch: serde_json::Map<String, Value> = match extract_object(&response.content) {
            Ok(patch) => patch,
            Err(e) => {
                debug!(schema = %schema.name, error = %e, "no usable profile patch in response");
                return Ok(());
            }
        };
        if patch.is_empty() {
            return Ok(());
        }

        self.store.patch_profile(&job.user_id, &patch).await?;
        counter!("reverie_profile_patches_total").increment(1);
        Ok(())
    }

    /// Insert mode: ask for memory items, bulk-insert and index them.
    async fn run_insert(
        &self,
        schema: &MemorySchema,
        job: &ExtractionJob,
    ) -> Result<(), ReverieError> {
        let prompt = build_insert_prompt(schema, &job.messages);
        let response = self.provider.complete(self.request(prompt)).await?;

        let episodes: Vec<ExtractedEpisode> = match extract_array(&response.content) {
            Ok(episodes) => episodes,
            Err(e) => {
                debug!(schema = %schema.name, error = %e, "no usable memories in response");
                return Ok(());
            }
        };
        if episodes.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let memories: Vec<EpisodicMemory> = episodes
            .into_iter()
            .map(|episode| EpisodicMemory {
                id: Uuid::new_v4().to_string(),
                user_id: job.user_id.clone(),
                session_id: Some(job.session_id.clone()),
                memory_type: schema.name.clone(),
                content: episode.content,
                context: episode.context,
                importance: DEFAULT_IMPORTANCE,
                created_at: now.clone(),
                expires_at: None,
            })
            .collect();

        self.store.insert_episodic(&memories).await?;

        let ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();
        let docs: Vec<Document> = memories
            .iter()
            .map(|memory| {
                let mut metadata = serde_json::Map::new();
                metadata.insert("user_id".into(), Value::String(memory.user_id.clone()));
                if let Some(session_id) = &memory.session_id {
                    metadata.insert("session_id".into(), Value::String(session_id.clone()));
                }
                metadata.insert("context".into(), Value::String(memory.context.clone()));
                metadata.insert("memory_type".into(), Value::String(memory.memory_type.clone()));
                Document {
                    content: memory.content.clone(),
                    metadata,
                }
            })
            .collect();
        self.index
            .add_documents(&docs, &self.memory.episodic_collection, Some(ids))
            .await?;

        counter!("reverie_episodic_memories_total").increment(memories.len() as u64);
        Ok(())
    }

    fn request(&self, prompt: String) -> ProviderRequest {
        ProviderRequest {
            model: self.extraction.model.clone(),
            system_prompt: None,
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: 2048,
        }
    }
}

/// Format conversation messages as "Role: text" lines.
fn format_conversation(messages: &[ChatMessage]) -> String {
    let mut text = String::new();
    for msg in messages {
        let role = match msg.role.as_str() {
            "user" => "User",
            "assistant" => "Assistant",
            other => other,
        };
        text.push_str(&format!("{role}: {}\n", msg.content));
    }
    text
}

fn build_patch_prompt(
    schema: &MemorySchema,
    profile: Option<&UserProfile>,
    messages: &[ChatMessage],
) -> String {
    let profile_json = profile
        .map(|p| serde_json::to_string_pretty(p).unwrap_or_else(|_| "{}".into()))
        .unwrap_or_else(|| "{}".into());
    PATCH_PROMPT
        .replace("{description}", &schema.description)
        .replace("{profile}", &profile_json)
        .replace("{conversation}", &format_conversation(messages))
}

fn build_insert_prompt(schema: &MemorySchema, messages: &[ChatMessage]) -> String {
    INSERT_PROMPT
        .replace("{description}", &schema.description)
        .replace("{conversation}", &format_conversation(messages))
}
