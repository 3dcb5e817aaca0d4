// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding-backed semantic store with content-hash dedup upsert.
//!
//! Records live in the `vector_records` table with BLOB embeddings;
//! similarity is cosine, computed client-side over the collection.
//! Collections are lazily materialized: an unknown collection is an
//! empty result set, never an error.

use std::sync::Arc;

use metrics::counter;
use reverie_core::{EmbeddingAdapter, ReverieError};
use rusqlite::params;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use reverie_storage::Database;
use reverie_storage::database::map_tr_err;

use crate::types::{
    Document, UpsertAction, UpsertOutcome, blob_to_vec, content_hash, cosine_similarity,
    vec_to_blob,
};

/// Over-fetch multiplier for client-side metadata filtering.
const FILTER_OVERFETCH: usize = 4;

/// Embedding-backed semantic store over SQLite.
pub struct VectorIndex {
    db: Database,
    embedder: Arc<dyn EmbeddingAdapter>,
}

impl VectorIndex {
    /// Creates a new vector index over the shared database.
    pub fn new(db: Database, embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self { db, embedder }
    }

    /// Embed and store documents; returns the assigned ids.
    ///
    /// Pure side effect, no deduplication. `ids`, when given, must match
    /// `docs` in length; otherwise fresh v4 ids are generated.
    pub async fn add_documents(
        &self,
        docs: &[Document],
        collection: &str,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<String>, ReverieError> {
        if docs.is_empty() {
            return Ok(vec![]);
        }
        if let Some(ids) = &ids {
            if ids.len() != docs.len() {
                return Err(ReverieError::Internal(format!(
                    "id count {} does not match document count {}",
                    ids.len(),
                    docs.len()
                )));
            }
        }

        let contents: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_documents(&contents).await?;

        let ids =
            ids.unwrap_or_else(|| docs.iter().map(|_| Uuid::new_v4().to_string()).collect());
        let rows: Vec<(String, String, Vec<u8>, String, String)> = docs
            .iter()
            .zip(embeddings.iter())
            .zip(ids.iter())
            .map(|((doc, embedding), id)| {
                (
                    id.clone(),
                    doc.content.clone(),
                    vec_to_blob(embedding),
                    Value::Object(doc.metadata.clone()).to_string(),
                    content_hash(&doc.content),
                )
            })
            .collect();

        let collection = collection.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (id, content, blob, metadata, hash) in &rows {
                    tx.execute(
                        "INSERT OR REPLACE INTO vector_records
                         (id, collection, content, embedding, metadata, hash)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![id, collection, content, blob, metadata, hash],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        counter!("reverie_vector_documents_added_total").increment(docs.len() as u64);
        Ok(ids)
    }

    /// Content-hash deduplicating upsert.
    ///
    /// A record in the collection already carrying this content's hash is
    /// left alone (`Unchanged`). An explicit target `id` holding different
    /// content is deleted and reinserted under the same id (`Updated`).
    /// Otherwise the document is inserted fresh (`Created`).
    ///
    /// The check-then-act sequence is not atomic: concurrent upserts of
    /// identical content converge, but concurrent upserts of different
    /// content against the same id have no ordering guarantee.
    pub async fn upsert(
        &self,
        doc: &Document,
        collection: &str,
        id: Option<&str>,
    ) -> Result<UpsertOutcome, ReverieError> {
        let hash = content_hash(&doc.content);

        if let Some(existing_id) = self.find_by_hash(collection, &hash).await? {
            debug!(collection, id = %existing_id, "upsert found identical content");
            counter!("reverie_vector_upserts_total", "action" => "unchanged").increment(1);
            return Ok(UpsertOutcome {
                id: existing_id,
                action: UpsertAction::Unchanged,
                hash,
            });
        }

        if let Some(target) = id {
            if self.exists(collection, target).await? {
                // Same id, different content: replace the record wholesale.
                self.delete(&[target.to_string()], collection).await?;
                self.add_documents(std::slice::from_ref(doc), collection, Some(vec![target.to_string()]))
                    .await?;
                counter!("reverie_vector_upserts_total", "action" => "updated").increment(1);
                return Ok(UpsertOutcome {
                    id: target.to_string(),
                    action: UpsertAction::Updated,
                    hash,
                });
            }
        }

        let new_id = id.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string());
        self.add_documents(std::slice::from_ref(doc), collection, Some(vec![new_id.clone()]))
            .await?;
        counter!("reverie_vector_upserts_total", "action" => "created").increment(1);
        Ok(UpsertOutcome {
            id: new_id,
            action: UpsertAction::Created,
            hash,
        })
    }

    /// Ranked similarity search returning documents only.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        collection: &str,
    ) -> Result<Vec<Document>, ReverieError> {
        Ok(self
            .similarity_search_with_score(query, k, collection)
            .await?
            .into_iter()
            .map(|(doc, _)| doc)
            .collect())
    }

    /// Ranked similarity search returning `(document, cosine score)` pairs.
    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        collection: &str,
    ) -> Result<Vec<(Document, f32)>, ReverieError> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let records = self.load_collection(collection).await?;

        let mut scored: Vec<(Document, f32)> = records
            .into_iter()
            .filter(|(_, embedding)| embedding.len() == query_embedding.len())
            .map(|(doc, embedding)| {
                let score = cosine_similarity(&query_embedding, &embedding);
                (doc, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Similarity search with client-side metadata equality filtering.
    ///
    /// Over-fetches to compensate for post-hoc filtering, then truncates.
    pub async fn similarity_search_with_filter(
        &self,
        query: &str,
        k: usize,
        filter: &serde_json::Map<String, Value>,
        collection: &str,
    ) -> Result<Vec<(Document, f32)>, ReverieError> {
        let mut results = self
            .similarity_search_with_score(query, k * FILTER_OVERFETCH, collection)
            .await?;
        results.retain(|(doc, _)| metadata_matches(&doc.metadata, filter));
        results.truncate(k);
        Ok(results)
    }

    /// Similarity search keeping only results at or above `threshold`.
    pub async fn similarity_search_with_threshold(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
        collection: &str,
    ) -> Result<Vec<(Document, f32)>, ReverieError> {
        let mut results = self.similarity_search_with_score(query, k, collection).await?;
        results.retain(|(_, score)| *score >= threshold);
        Ok(results)
    }

    /// Delete records by id within a collection.
    pub async fn delete(&self, ids: &[String], collection: &str) -> Result<(), ReverieError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();
        let collection = collection.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                for id in &ids {
                    tx.execute(
                        "DELETE FROM vector_records WHERE id = ?1 AND collection = ?2",
                        params![id, collection],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Delete all records whose metadata matches the filter; returns the count.
    pub async fn delete_by_filter(
        &self,
        filter: &serde_json::Map<String, Value>,
        collection: &str,
    ) -> Result<usize, ReverieError> {
        let records = self.load_collection(collection).await?;
        let ids: Vec<String> = records
            .into_iter()
            .filter(|(doc, _)| metadata_matches(&doc.metadata, filter))
            .filter_map(|(doc, _)| {
                doc.metadata
                    .get("__id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect();
        let count = ids.len();
        self.delete(&ids, collection).await?;
        Ok(count)
    }

    /// Load a collection as `(document, embedding)` pairs.
    ///
    /// The record id is surfaced in metadata under `__id` so callers can
    /// address rows found by content inspection.
    async fn load_collection(
        &self,
        collection: &str,
    ) -> Result<Vec<(Document, Vec<f32>)>, ReverieError> {
        let collection = collection.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, content, embedding, metadata FROM vector_records
                     WHERE collection = ?1",
                )?;
                let rows = stmt
                    .query_map(params![collection], |row| {
                        let id: String = row.get(0)?;
                        let content: String = row.get(1)?;
                        let blob: Vec<u8> = row.get(2)?;
                        let metadata_text: String = row.get(3)?;
                        Ok((id, content, blob, metadata_text))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let records = rows
                    .into_iter()
                    .map(|(id, content, blob, metadata_text)| {
                        let mut metadata = serde_json::from_str::<serde_json::Map<String, Value>>(
                            &metadata_text,
                        )
                        .unwrap_or_default();
                        metadata.insert("__id".to_string(), Value::String(id));
                        (Document { content, metadata }, blob_to_vec(&blob))
                    })
                    .collect();
                Ok(records)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn find_by_hash(
        &self,
        collection: &str,
        hash: &str,
    ) -> Result<Option<String>, ReverieError> {
        let collection = collection.to_string();
        let hash = hash.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let id = conn
                    .query_row(
                        "SELECT id FROM vector_records WHERE collection = ?1 AND hash = ?2
                         LIMIT 1",
                        params![collection, hash],
                        |row| row.get::<_, String>(0),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                Ok(id)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn exists(&self, collection: &str, id: &str) -> Result<bool, ReverieError> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT count(*) FROM vector_records WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(map_tr_err)
    }
}

/// True when every (key, value) pair in `filter` is present in `metadata`.
fn metadata_matches(
    metadata: &serde_json::Map<String, Value>,
    filter: &serde_json::Map<String, Value>,
) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_matches_requires_all_pairs() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("user_id".into(), Value::String("u1".into()));
        metadata.insert("kind".into(), Value::String("note".into()));

        let mut filter = serde_json::Map::new();
        filter.insert("user_id".into(), Value::String("u1".into()));
        assert!(metadata_matches(&metadata, &filter));

        filter.insert("kind".into(), Value::String("other".into()));
        assert!(!metadata_matches(&metadata, &filter));

        filter.remove("kind");
        filter.insert("missing".into(), Value::String("x".into()));
        assert!(!metadata_matches(&metadata, &filter));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let metadata = serde_json::Map::new();
        let filter = serde_json::Map::new();
        assert!(metadata_matches(&metadata, &filter));
    }
}
