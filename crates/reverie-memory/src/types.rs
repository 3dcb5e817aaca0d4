// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types for the tiered memory system.

use std::collections::BTreeMap;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use reverie_core::ChatMessage;

/// Ownership boundary of a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Per-user memory, applies everywhere.
    Global,
    /// Per-folder (project) memory, overrides global on merge.
    Folder,
}

impl MemoryScope {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryScope::Global => "global",
            MemoryScope::Folder => "folder",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "folder" => MemoryScope::Folder,
            _ => MemoryScope::Global,
        }
    }
}

/// Semantic bucket for a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// User preferences (key overwrite on merge).
    Prefs,
    /// Behavioral rules (deduplicated union on merge).
    Rules,
    /// Facts and domain knowledge.
    Knowledge,
    /// Working context.
    Context,
}

impl MemoryCategory {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Prefs => "prefs",
            MemoryCategory::Rules => "rules",
            MemoryCategory::Knowledge => "knowledge",
            MemoryCategory::Context => "context",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "prefs" => MemoryCategory::Prefs,
            "rules" => MemoryCategory::Rules,
            "knowledge" => MemoryCategory::Knowledge,
            _ => MemoryCategory::Context,
        }
    }
}

/// A structured long-term memory entry.
///
/// Unique per (owner, scope, category, key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub scope: MemoryScope,
    pub owner_id: String,
    pub category: MemoryCategory,
    pub key: String,
    pub value: Value,
    pub priority: i64,
    /// ISO 8601 expiry; entries past this are excluded from reads.
    pub expires_at: Option<String>,
}

/// A timestamped, semantically-indexed note extracted from conversation.
///
/// Immutable once created; removed only by the expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicMemory {
    pub id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub memory_type: String,
    pub content: String,
    pub context: String,
    pub importance: f64,
    pub created_at: String,
    pub expires_at: Option<String>,
}

/// Long-term profile of a user, patched incrementally by extraction.
///
/// One row per user; created on first patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub preferred_name: Option<String>,
    pub age: Option<i64>,
    pub interests: Vec<String>,
    pub occupation: Option<String>,
    pub location: Option<String>,
    pub conversation_preferences: Vec<String>,
    pub relationships: Vec<String>,
    pub last_updated: String,
}

/// Merged view of global and folder memory for one session (not persisted).
///
/// BTreeMaps keep iteration order deterministic for prompt formatting.
#[derive(Debug, Clone, Default)]
pub struct MergedMemoryContext {
    pub prefs: BTreeMap<String, Value>,
    pub rules: Vec<String>,
    pub knowledge: BTreeMap<String, Value>,
    pub context: BTreeMap<String, Value>,
    pub profile: Option<UserProfile>,
}

/// A document to be embedded and stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl Document {
    /// A document with empty metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// What a vector upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
    Unchanged,
}

/// Result of a content-hash deduplicating upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub id: String,
    pub action: UpsertAction,
    pub hash: String,
}

/// How a memory schema applies extraction results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Merge an LLM-produced JSON object into the user profile.
    Patch,
    /// Insert LLM-produced memories as episodic rows.
    Insert,
}

/// A configured extraction target: what to extract and how to apply it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySchema {
    pub name: String,
    pub description: String,
    pub update_mode: UpdateMode,
}

/// The default extraction schema set: profile patching + episodic inserts.
pub fn default_schemas() -> Vec<MemorySchema> {
    vec![
        MemorySchema {
            name: "user_profile".to_string(),
            description: "Stable facts about the user: preferred name, age, location, \
                          occupation, interests, conversation preferences, relationships."
                .to_string(),
            update_mode: UpdateMode::Patch,
        },
        MemorySchema {
            name: "episodic".to_string(),
            description: "Notable events, plans, and decisions mentioned in conversation \
                          that are worth recalling in later sessions."
                .to_string(),
            update_mode: UpdateMode::Insert,
        },
    ]
}

/// A queued extraction job, one per debounced session burst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub user_id: String,
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub schemas: Vec<MemorySchema>,
}

/// Hex-encoded MD5 content hash used for vector upsert deduplication.
pub fn content_hash(content: &str) -> String {
    hex::encode(Md5::digest(content.as_bytes()))
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "vectors must have same length");
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_and_category_round_trip() {
        assert_eq!(MemoryScope::from_str_value("global"), MemoryScope::Global);
        assert_eq!(MemoryScope::from_str_value("folder"), MemoryScope::Folder);
        assert_eq!(MemoryCategory::Prefs.as_str(), "prefs");
        assert_eq!(MemoryCategory::from_str_value("rules"), MemoryCategory::Rules);
    }

    #[test]
    fn content_hash_is_stable_md5_hex() {
        let a = content_hash("User is going to Japan in April");
        let b = content_hash("User is going to Japan in April");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, content_hash("User is going to Japan in May"));
    }

    #[test]
    fn blob_round_trip() {
        let original = vec![0.25_f32, -1.5, 3.0];
        let recovered = blob_to_vec(&vec_to_blob(&original));
        assert_eq!(original, recovered);
    }

    #[test]
    fn cosine_similarity_basics() {
        let a = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&a, &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn default_schemas_cover_both_modes() {
        let schemas = default_schemas();
        assert_eq!(schemas.len(), 2);
        assert!(schemas.iter().any(|s| s.update_mode == UpdateMode::Patch));
        assert!(schemas.iter().any(|s| s.update_mode == UpdateMode::Insert));
    }

    #[test]
    fn extraction_job_serde_round_trip() {
        let job = ExtractionJob {
            user_id: "u1".into(),
            session_id: "s1".into(),
            messages: vec![ChatMessage::user("hello")],
            schemas: default_schemas(),
        };
        let json = serde_json::to_string(&job).unwrap();
        let back: ExtractionJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, "s1");
        assert_eq!(back.schemas.len(), 2);
    }
}
