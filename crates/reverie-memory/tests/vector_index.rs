// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Behavior tests for the vector index: hash-dedup upsert, search
//! variants, and deletion.

use std::sync::Arc;

use serde_json::{Value, json};

use reverie_memory::{Document, UpsertAction, VectorIndex};
use reverie_storage::Database;
use reverie_test_utils::MockEmbedder;

async fn setup() -> (VectorIndex, Arc<MockEmbedder>) {
    let db = Database::open_in_memory().await.unwrap();
    let embedder = Arc::new(MockEmbedder::new());
    (VectorIndex::new(db, embedder.clone()), embedder)
}

fn doc(content: &str) -> Document {
    Document::new(content)
}

fn doc_with_meta(content: &str, key: &str, value: &str) -> Document {
    let mut document = Document::new(content);
    document
        .metadata
        .insert(key.to_string(), Value::String(value.to_string()));
    document
}

#[tokio::test]
async fn upsert_identical_content_is_idempotent() {
    let (index, _) = setup().await;

    let first = index.upsert(&doc("User's dog is named Max"), "notes", Some("n1")).await.unwrap();
    assert_eq!(first.action, UpsertAction::Created);
    assert_eq!(first.id, "n1");

    let second = index.upsert(&doc("User's dog is named Max"), "notes", Some("n1")).await.unwrap();
    assert_eq!(second.action, UpsertAction::Unchanged);
    assert_eq!(second.id, "n1");
    assert_eq!(second.hash, first.hash);

    // Exactly one row exists.
    let results = index
        .similarity_search("User's dog is named Max", 10, "notes")
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn upsert_different_content_same_id_is_update() {
    let (index, _) = setup().await;

    index.upsert(&doc("Dog is named Max"), "notes", Some("n1")).await.unwrap();
    let outcome = index.upsert(&doc("Dog is named Luna"), "notes", Some("n1")).await.unwrap();
    assert_eq!(outcome.action, UpsertAction::Updated);
    assert_eq!(outcome.id, "n1");

    // Still exactly one row, carrying the new content.
    let results = index.similarity_search("Dog is named Luna", 10, "notes").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "Dog is named Luna");
}

#[tokio::test]
async fn upsert_without_id_generates_one() {
    let (index, _) = setup().await;
    let outcome = index.upsert(&doc("standalone fact"), "notes", None).await.unwrap();
    assert_eq!(outcome.action, UpsertAction::Created);
    assert!(!outcome.id.is_empty());

    // Re-upserting the same content without an id dedups by hash.
    let again = index.upsert(&doc("standalone fact"), "notes", None).await.unwrap();
    assert_eq!(again.action, UpsertAction::Unchanged);
    assert_eq!(again.id, outcome.id);
}

#[tokio::test]
async fn add_documents_does_not_dedup() {
    let (index, _) = setup().await;
    let ids = index
        .add_documents(&[doc("same"), doc("same")], "notes", None)
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);

    let results = index.similarity_search("same", 10, "notes").await.unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn add_documents_rejects_mismatched_ids() {
    let (index, _) = setup().await;
    let result = index
        .add_documents(&[doc("a"), doc("b")], "notes", Some(vec!["only-one".into()]))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn search_ranks_by_cosine_and_respects_k() {
    let (index, embedder) = setup().await;
    embedder.pin("the query", vec![1.0, 0.0]).await;
    embedder.pin("close match", vec![0.9, 0.1]).await;
    embedder.pin("far match", vec![0.1, 0.9]).await;

    index
        .add_documents(&[doc("close match"), doc("far match")], "docs", None)
        .await
        .unwrap();

    let results = index.similarity_search_with_score("the query", 2, "docs").await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0.content, "close match");
    assert!(results[0].1 > results[1].1);

    let top_one = index.similarity_search("the query", 1, "docs").await.unwrap();
    assert_eq!(top_one.len(), 1);
    assert_eq!(top_one[0].content, "close match");
}

#[tokio::test]
async fn threshold_search_drops_low_scores() {
    let (index, embedder) = setup().await;
    embedder.pin("the query", vec![1.0, 0.0]).await;
    embedder.pin("close match", vec![0.9, 0.1]).await;
    embedder.pin("far match", vec![0.1, 0.9]).await;

    index
        .add_documents(&[doc("close match"), doc("far match")], "docs", None)
        .await
        .unwrap();

    let results = index
        .similarity_search_with_threshold("the query", 10, 0.5, "docs")
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0.content, "close match");
}

#[tokio::test]
async fn filter_search_applies_metadata_equality() {
    let (index, _) = setup().await;
    index
        .add_documents(
            &[
                doc_with_meta("fact one", "user_id", "u1"),
                doc_with_meta("fact two", "user_id", "u2"),
            ],
            "memories",
            None,
        )
        .await
        .unwrap();

    let mut filter = serde_json::Map::new();
    filter.insert("user_id".into(), json!("u1"));
    let results = index
        .similarity_search_with_filter("fact", 10, &filter, "memories")
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0.content, "fact one");
}

#[tokio::test]
async fn unknown_collection_is_empty_not_error() {
    let (index, _) = setup().await;
    let results = index.similarity_search("anything", 5, "never-created").await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn delete_by_id_removes_rows() {
    let (index, _) = setup().await;
    let ids = index.add_documents(&[doc("a"), doc("b")], "docs", None).await.unwrap();

    index.delete(&ids[..1], "docs").await.unwrap();
    let results = index.similarity_search("a", 10, "docs").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "b");
}

#[tokio::test]
async fn delete_by_filter_returns_count() {
    let (index, _) = setup().await;
    index
        .add_documents(
            &[
                doc_with_meta("one", "kind", "note"),
                doc_with_meta("two", "kind", "note"),
                doc_with_meta("three", "kind", "task"),
            ],
            "docs",
            None,
        )
        .await
        .unwrap();

    let mut filter = serde_json::Map::new();
    filter.insert("kind".into(), json!("note"));
    let removed = index.delete_by_filter(&filter, "docs").await.unwrap();
    assert_eq!(removed, 2);

    let remaining = index.similarity_search("three", 10, "docs").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].content, "three");
}

#[tokio::test]
async fn embedding_backend_failure_propagates() {
    let (index, embedder) = setup().await;
    index.add_documents(&[doc("a")], "docs", None).await.unwrap();

    embedder.set_failing(true);
    assert!(index.similarity_search("a", 5, "docs").await.is_err());
    assert!(index.upsert(&doc("b"), "docs", None).await.is_err());
}
