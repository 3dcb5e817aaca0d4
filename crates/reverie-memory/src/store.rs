// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured long-term memory store: scoped key/value entries,
//! user profiles, and episodic memory rows.
//!
//! Merge semantics: global entries apply first, folder entries second,
//! so a folder value wins for an identical (category, key). The `rules`
//! category is the exception: values accumulate into a deduplicated
//! union list instead of overwriting.

use reverie_core::ReverieError;
use rusqlite::params;
use serde_json::Value;
use tracing::debug;

use reverie_storage::Database;
use reverie_storage::database::map_tr_err;

use crate::types::{
    EpisodicMemory, MemoryCategory, MemoryEntry, MemoryScope, MergedMemoryContext, UserProfile,
};

/// Key of the list-valued folder entry managed by add/remove_folder_rule.
const CUSTOM_RULES_KEY: &str = "custom_rules";

/// Structured long-term memory over SQLite.
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    /// Creates a new store over the shared database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert a global-scoped entry for a user.
    pub async fn put_global(
        &self,
        user_id: &str,
        category: MemoryCategory,
        key: &str,
        value: Value,
        priority: i64,
    ) -> Result<(), ReverieError> {
        self.put(MemoryScope::Global, user_id, category, key, value, priority, None)
            .await
    }

    /// Upsert a folder-scoped entry.
    pub async fn put_folder(
        &self,
        folder_id: &str,
        category: MemoryCategory,
        key: &str,
        value: Value,
        priority: i64,
    ) -> Result<(), ReverieError> {
        self.put(MemoryScope::Folder, folder_id, category, key, value, priority, None)
            .await
    }

    /// Upsert an entry with an explicit ISO-8601 expiry.
    pub async fn put_with_expiry(
        &self,
        scope: MemoryScope,
        owner_id: &str,
        category: MemoryCategory,
        key: &str,
        value: Value,
        priority: i64,
        expires_at: &str,
    ) -> Result<(), ReverieError> {
        self.put(
            scope,
            owner_id,
            category,
            key,
            value,
            priority,
            Some(expires_at.to_string()),
        )
        .await
    }

    async fn put(
        &self,
        scope: MemoryScope,
        owner_id: &str,
        category: MemoryCategory,
        key: &str,
        value: Value,
        priority: i64,
        expires_at: Option<String>,
    ) -> Result<(), ReverieError> {
        let scope = scope.as_str().to_string();
        let owner_id = owner_id.to_string();
        let category = category.as_str().to_string();
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO memory_entries
                     (scope, owner_id, category, key, value, priority, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(owner_id, scope, category, key) DO UPDATE SET
                         value = excluded.value,
                         priority = excluded.priority,
                         expires_at = excluded.expires_at,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![scope, owner_id, category, key, value, priority, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Global entries for a user, highest priority first, expired excluded.
    pub async fn get_global_memories(
        &self,
        user_id: &str,
    ) -> Result<Vec<MemoryEntry>, ReverieError> {
        self.get_scoped(MemoryScope::Global, user_id).await
    }

    /// Folder entries, highest priority first, expired excluded.
    pub async fn get_folder_memories(
        &self,
        folder_id: &str,
    ) -> Result<Vec<MemoryEntry>, ReverieError> {
        self.get_scoped(MemoryScope::Folder, folder_id).await
    }

    async fn get_scoped(
        &self,
        scope: MemoryScope,
        owner_id: &str,
    ) -> Result<Vec<MemoryEntry>, ReverieError> {
        let scope_str = scope.as_str().to_string();
        let owner_id = owner_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT scope, owner_id, category, key, value, priority, expires_at
                     FROM memory_entries
                     WHERE owner_id = ?1 AND scope = ?2
                       AND (expires_at IS NULL
                            OR expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                     ORDER BY priority DESC, key ASC",
                )?;
                let entries = stmt
                    .query_map(params![owner_id, scope_str], |row| Ok(row_to_entry(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Merged memory for a session: global first, then the session's
    /// folder entries (folder wins per key; rules accumulate), plus the
    /// user's profile.
    pub async fn get_merged_memory_for_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<MergedMemoryContext, ReverieError> {
        let folder_id = self.session_folder(session_id).await?;

        let global = self.get_global_memories(user_id).await?;
        let folder = match &folder_id {
            Some(folder_id) => self.get_folder_memories(folder_id).await?,
            None => vec![],
        };

        let mut merged = merge_entries(&global, &folder);
        merged.profile = self.get_profile(user_id).await?;
        Ok(merged)
    }

    /// Append a rule to the folder's `custom_rules` list entry.
    ///
    /// No-op when the rule is already present.
    pub async fn add_folder_rule(&self, folder_id: &str, rule: &str) -> Result<(), ReverieError> {
        let mut rules = self.folder_rules(folder_id).await?;
        if rules.iter().any(|r| r == rule) {
            debug!(folder_id, rule, "folder rule already present");
            return Ok(());
        }
        rules.push(rule.to_string());
        self.put_folder(
            folder_id,
            MemoryCategory::Rules,
            CUSTOM_RULES_KEY,
            Value::Array(rules.into_iter().map(Value::String).collect()),
            0,
        )
        .await
    }

    /// Remove a rule from the folder's `custom_rules` list entry.
    pub async fn remove_folder_rule(
        &self,
        folder_id: &str,
        rule: &str,
    ) -> Result<(), ReverieError> {
        let rules = self.folder_rules(folder_id).await?;
        let remaining: Vec<String> = rules.iter().filter(|r| *r != rule).cloned().collect();
        if remaining.len() == rules.len() {
            return Ok(());
        }
        self.put_folder(
            folder_id,
            MemoryCategory::Rules,
            CUSTOM_RULES_KEY,
            Value::Array(remaining.into_iter().map(Value::String).collect()),
            0,
        )
        .await
    }

    async fn folder_rules(&self, folder_id: &str) -> Result<Vec<String>, ReverieError> {
        let entries = self.get_folder_memories(folder_id).await?;
        Ok(entries
            .iter()
            .find(|e| e.category == MemoryCategory::Rules && e.key == CUSTOM_RULES_KEY)
            .map(|e| rule_values(&e.value))
            .unwrap_or_default())
    }

    /// Delete all expired structured entries and episodic memories.
    ///
    /// Returns the number of rows removed.
    pub async fn cleanup_expired(&self) -> Result<usize, ReverieError> {
        self.db
            .connection()
            .call(move |conn| {
                let entries = conn.execute(
                    "DELETE FROM memory_entries
                     WHERE expires_at IS NOT NULL
                       AND expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    [],
                )?;
                let episodic = conn.execute(
                    "DELETE FROM episodic_memories
                     WHERE expires_at IS NOT NULL
                       AND expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    [],
                )?;
                Ok(entries + episodic)
            })
            .await
            .map_err(map_tr_err)
    }

    // --- Sessions ---

    /// Record a session's owner and optional folder binding.
    ///
    /// Session CRUD lives outside this engine; this is the minimal write
    /// the merge read path (and tests) need.
    pub async fn bind_session(
        &self,
        session_id: &str,
        user_id: &str,
        folder_id: Option<&str>,
    ) -> Result<(), ReverieError> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        let folder_id = folder_id.map(str::to_string);
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sessions (id, user_id, folder_id) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                         user_id = excluded.user_id,
                         folder_id = excluded.folder_id,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![session_id, user_id, folder_id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// The folder a session belongs to, if any.
    pub async fn session_folder(&self, session_id: &str) -> Result<Option<String>, ReverieError> {
        let session_id = session_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let folder = conn
                    .query_row(
                        "SELECT folder_id FROM sessions WHERE id = ?1",
                        params![session_id],
                        |row| row.get::<_, Option<String>>(0),
                    )
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                Ok(folder)
            })
            .await
            .map_err(map_tr_err)
    }

    // --- User profiles ---

    /// Fetch a user's profile, if one has been created.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, ReverieError> {
        let user_id = user_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let profile = conn
                    .query_row(
                        "SELECT user_id, preferred_name, age, interests, occupation, location,
                                conversation_preferences, relationships, last_updated
                         FROM user_profiles WHERE user_id = ?1",
                        params![user_id],
                        |row| Ok(row_to_profile(row)),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                Ok(profile)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Apply a partial update to a user's profile.
    ///
    /// Only fields present in the patch change; the row is created on
    /// first patch. Unknown keys are ignored.
    pub async fn patch_profile(
        &self,
        user_id: &str,
        patch: &serde_json::Map<String, Value>,
    ) -> Result<UserProfile, ReverieError> {
        let mut profile = self.get_profile(user_id).await?.unwrap_or_else(|| UserProfile {
            user_id: user_id.to_string(),
            ..UserProfile::default()
        });
        apply_profile_patch(&mut profile, patch);
        profile.last_updated = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();

        let row = profile.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO user_profiles
                     (user_id, preferred_name, age, interests, occupation, location,
                      conversation_preferences, relationships, last_updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(user_id) DO UPDATE SET
                         preferred_name = excluded.preferred_name,
                         age = excluded.age,
                         interests = excluded.interests,
                         occupation = excluded.occupation,
                         location = excluded.location,
                         conversation_preferences = excluded.conversation_preferences,
                         relationships = excluded.relationships,
                         last_updated = excluded.last_updated",
                    params![
                        row.user_id,
                        row.preferred_name,
                        row.age,
                        serde_json::to_string(&row.interests).unwrap_or_else(|_| "[]".into()),
                        row.occupation,
                        row.location,
                        serde_json::to_string(&row.conversation_preferences)
                            .unwrap_or_else(|_| "[]".into()),
                        serde_json::to_string(&row.relationships).unwrap_or_else(|_| "[]".into()),
                        row.last_updated,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(profile)
    }

    // --- Episodic memories ---

    /// Bulk-insert episodic memories in one transaction.
    pub async fn insert_episodic(&self, batch: &[EpisodicMemory]) -> Result<(), ReverieError> {
        if batch.is_empty() {
            return Ok(());
        }
        let batch = batch.to_vec();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                for memory in &batch {
                    tx.execute(
                        "INSERT INTO episodic_memories
                         (id, user_id, session_id, memory_type, content, context,
                          importance, created_at, expires_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            memory.id,
                            memory.user_id,
                            memory.session_id,
                            memory.memory_type,
                            memory.content,
                            memory.context,
                            memory.importance,
                            memory.created_at,
                            memory.expires_at,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Episodic memories for a user, newest first.
    pub async fn episodic_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<EpisodicMemory>, ReverieError> {
        let user_id = user_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, session_id, memory_type, content, context,
                            importance, created_at, expires_at
                     FROM episodic_memories
                     WHERE user_id = ?1
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )?;
                let memories = stmt
                    .query_map(params![user_id, limit as i64], |row| {
                        Ok(EpisodicMemory {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            session_id: row.get(2)?,
                            memory_type: row.get(3)?,
                            content: row.get(4)?,
                            context: row.get(5)?,
                            importance: row.get(6)?,
                            created_at: row.get(7)?,
                            expires_at: row.get(8)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(memories)
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Merge global and folder entries into one context.
///
/// Global entries apply first, folder entries second, so a folder value
/// replaces a global one for the same (category, key). `Rules` entries
/// accumulate into a set-union list in application order.
pub fn merge_entries(global: &[MemoryEntry], folder: &[MemoryEntry]) -> MergedMemoryContext {
    let mut merged = MergedMemoryContext::default();
    for entry in global.iter().chain(folder.iter()) {
        match entry.category {
            MemoryCategory::Rules => {
                for rule in rule_values(&entry.value) {
                    if !merged.rules.contains(&rule) {
                        merged.rules.push(rule);
                    }
                }
            }
            MemoryCategory::Prefs => {
                merged.prefs.insert(entry.key.clone(), entry.value.clone());
            }
            MemoryCategory::Knowledge => {
                merged.knowledge.insert(entry.key.clone(), entry.value.clone());
            }
            MemoryCategory::Context => {
                merged.context.insert(entry.key.clone(), entry.value.clone());
            }
        }
    }
    merged
}

/// Extract rule strings from a list- or string-valued entry.
fn rule_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => vec![],
    }
}

/// Apply a JSON patch to a profile; only known, present fields change.
fn apply_profile_patch(profile: &mut UserProfile, patch: &serde_json::Map<String, Value>) {
    for (field, value) in patch {
        match field.as_str() {
            "preferred_name" => profile.preferred_name = value.as_str().map(str::to_string),
            "age" => profile.age = value.as_i64(),
            "occupation" => profile.occupation = value.as_str().map(str::to_string),
            "location" => profile.location = value.as_str().map(str::to_string),
            "interests" => profile.interests = string_list(value),
            "conversation_preferences" => profile.conversation_preferences = string_list(value),
            "relationships" => profile.relationships = string_list(value),
            other => debug!(field = other, "ignoring unknown profile patch field"),
        }
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => vec![],
    }
}

fn row_to_entry(row: &rusqlite::Row) -> MemoryEntry {
    let scope: String = row.get(0).unwrap_or_default();
    let category: String = row.get(2).unwrap_or_default();
    let value_text: String = row.get(4).unwrap_or_default();
    MemoryEntry {
        scope: MemoryScope::from_str_value(&scope),
        owner_id: row.get(1).unwrap_or_default(),
        category: MemoryCategory::from_str_value(&category),
        key: row.get(3).unwrap_or_default(),
        value: serde_json::from_str(&value_text).unwrap_or(Value::String(value_text)),
        priority: row.get(5).unwrap_or(0),
        expires_at: row.get(6).unwrap_or(None),
    }
}

fn row_to_profile(row: &rusqlite::Row) -> UserProfile {
    let interests: String = row.get(3).unwrap_or_default();
    let conversation_preferences: String = row.get(6).unwrap_or_default();
    let relationships: String = row.get(7).unwrap_or_default();
    UserProfile {
        user_id: row.get(0).unwrap_or_default(),
        preferred_name: row.get(1).unwrap_or(None),
        age: row.get(2).unwrap_or(None),
        interests: serde_json::from_str(&interests).unwrap_or_default(),
        occupation: row.get(4).unwrap_or(None),
        location: row.get(5).unwrap_or(None),
        conversation_preferences: serde_json::from_str(&conversation_preferences)
            .unwrap_or_default(),
        relationships: serde_json::from_str(&relationships).unwrap_or_default(),
        last_updated: row.get(8).unwrap_or_default(),
    }
}
