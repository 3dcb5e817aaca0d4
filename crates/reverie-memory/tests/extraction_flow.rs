// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end extraction pipeline tests: debounce collapsing, patch and
//! insert modes, and per-schema failure isolation.

use std::sync::Arc;
use std::time::Duration;

use reverie_config::{ExtractionConfig, MemoryConfig};
use reverie_core::ChatMessage;
use reverie_memory::{
    ExtractionJob, ExtractionScheduler, ExtractionWorker, MemorySchema, MemoryStore, UpdateMode,
    VectorIndex, default_schemas,
};
use reverie_storage::{Database, JobState, kv, queue};
use reverie_test_utils::{MockEmbedder, MockProvider};

/// Route patterns anchored to the worker's prompt templates.
const PATCH_ROUTE: &str = "JSON object containing the profile fields";
const INSERT_ROUTE: &str = "JSON array where each element";

struct Harness {
    db: Database,
    store: Arc<MemoryStore>,
    index: Arc<VectorIndex>,
    provider: Arc<MockProvider>,
    scheduler: ExtractionScheduler,
    worker: ExtractionWorker,
    memory_config: MemoryConfig,
}

async fn setup() -> Harness {
    let db = Database::open_in_memory().await.unwrap();
    let store = Arc::new(MemoryStore::new(db.clone()));
    let embedder = Arc::new(MockEmbedder::new());
    let index = Arc::new(VectorIndex::new(db.clone(), embedder));
    let provider = Arc::new(MockProvider::new());

    let extraction_config = ExtractionConfig {
        debounce_ms: 50,
        poll_interval_ms: 10,
        ..ExtractionConfig::default()
    };
    let memory_config = MemoryConfig::default();

    let scheduler = ExtractionScheduler::new(db.clone(), extraction_config.clone());
    let worker = ExtractionWorker::new(
        db.clone(),
        store.clone(),
        index.clone(),
        provider.clone(),
        extraction_config,
        memory_config.clone(),
    );

    Harness {
        db,
        store,
        index,
        provider,
        scheduler,
        worker,
        memory_config,
    }
}

fn conversation() -> Vec<ChatMessage> {
    vec![
        ChatMessage::user("I'm planning a trip to Japan in April."),
        ChatMessage::assistant("Sounds exciting! Cherry blossom season."),
    ]
}

#[tokio::test]
async fn debounce_collapses_rapid_calls_into_one_job() {
    let h = setup().await;
    h.provider.route(PATCH_ROUTE, "{}").await;
    h.provider.route(INSERT_ROUTE, "[]").await;

    let first = h
        .scheduler
        .schedule_extraction("s1", "u1", &conversation(), None)
        .await
        .unwrap();
    let second = h
        .scheduler
        .schedule_extraction("s1", "u1", &conversation(), None)
        .await
        .unwrap();
    assert_ne!(first, second);

    // The first job was cancelled while still delayed.
    assert_eq!(queue::state(&h.db, &first).await.unwrap(), None);
    assert_eq!(
        queue::state(&h.db, &second).await.unwrap(),
        Some(JobState::Delayed)
    );
    assert_eq!(queue::count_in_state(&h.db, JobState::Delayed).await.unwrap(), 1);

    // After the debounce window, exactly one job executes.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let completed = h.scheduler.drain_due(&h.worker).await.unwrap();
    assert_eq!(completed, 1);
    assert_eq!(
        queue::state(&h.db, &second).await.unwrap(),
        Some(JobState::Completed)
    );
}

#[tokio::test]
async fn distinct_sessions_debounce_independently() {
    let h = setup().await;
    h.scheduler
        .schedule_extraction("s1", "u1", &conversation(), None)
        .await
        .unwrap();
    h.scheduler
        .schedule_extraction("s2", "u1", &conversation(), None)
        .await
        .unwrap();
    assert_eq!(queue::count_in_state(&h.db, JobState::Delayed).await.unwrap(), 2);
}

#[tokio::test]
async fn insert_mode_creates_episodic_memory_with_default_importance() {
    let h = setup().await;
    h.provider.route(PATCH_ROUTE, "{}").await;
    h.provider
        .route(
            INSERT_ROUTE,
            r#"[{"context":"trip planning","content":"User is going to Japan in April"}]"#,
        )
        .await;

    h.scheduler
        .schedule_extraction("s1", "u1", &conversation(), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(h.scheduler.drain_due(&h.worker).await.unwrap(), 1);

    let memories = h.store.episodic_for_user("u1", 10).await.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].content, "User is going to Japan in April");
    assert_eq!(memories[0].context, "trip planning");
    assert!((memories[0].importance - 0.5).abs() < f64::EPSILON);
    assert_eq!(memories[0].session_id.as_deref(), Some("s1"));

    // The memory is also semantically indexed under the user's metadata.
    let results = h
        .index
        .similarity_search_with_score(
            "User is going to Japan in April",
            5,
            &h.memory_config.episodic_collection,
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].0.metadata.get("user_id").and_then(|v| v.as_str()),
        Some("u1")
    );
}

#[tokio::test]
async fn insert_mode_empty_array_creates_nothing() {
    let h = setup().await;
    h.provider.route(PATCH_ROUTE, "{}").await;
    h.provider.route(INSERT_ROUTE, "[]").await;

    h.scheduler
        .schedule_extraction("s1", "u1", &conversation(), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(h.scheduler.drain_due(&h.worker).await.unwrap(), 1);

    assert!(h.store.episodic_for_user("u1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unparseable_output_is_a_noop_not_a_failure() {
    let h = setup().await;
    h.provider.route(PATCH_ROUTE, "I have no updates to suggest.").await;
    h.provider.route(INSERT_ROUTE, "Nothing memorable happened.").await;

    let job = ExtractionJob {
        user_id: "u1".into(),
        session_id: "s1".into(),
        messages: conversation(),
        schemas: default_schemas(),
    };
    h.worker.process(&job).await.unwrap();

    assert!(h.store.get_profile("u1").await.unwrap().is_none());
    assert!(h.store.episodic_for_user("u1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn patch_mode_updates_only_present_fields() {
    let h = setup().await;

    // Seed an existing profile.
    let mut seed = serde_json::Map::new();
    seed.insert("preferred_name".into(), serde_json::json!("Ada"));
    seed.insert("location".into(), serde_json::json!("Berlin"));
    h.store.patch_profile("u1", &seed).await.unwrap();

    h.provider
        .route(PATCH_ROUTE, r#"{"location": "Lisbon", "interests": ["travel"]}"#)
        .await;
    let job = ExtractionJob {
        user_id: "u1".into(),
        session_id: "s1".into(),
        messages: conversation(),
        schemas: vec![MemorySchema {
            name: "user_profile".into(),
            description: "Stable facts.".into(),
            update_mode: UpdateMode::Patch,
        }],
    };
    h.worker.process(&job).await.unwrap();

    let profile = h.store.get_profile("u1").await.unwrap().unwrap();
    assert_eq!(profile.preferred_name.as_deref(), Some("Ada"));
    assert_eq!(profile.location.as_deref(), Some("Lisbon"));
    assert_eq!(profile.interests, vec!["travel".to_string()]);
}

#[tokio::test]
async fn one_failing_schema_does_not_block_the_other() {
    let h = setup().await;
    h.provider.route_error(PATCH_ROUTE, "model unavailable").await;
    h.provider
        .route(
            INSERT_ROUTE,
            r#"[{"context":"trip planning","content":"User is going to Japan in April"}]"#,
        )
        .await;

    let job = ExtractionJob {
        user_id: "u1".into(),
        session_id: "s1".into(),
        messages: conversation(),
        schemas: default_schemas(),
    };
    // The job as a whole still succeeds.
    h.worker.process(&job).await.unwrap();

    assert_eq!(h.store.episodic_for_user("u1", 10).await.unwrap().len(), 1);
    assert!(h.store.get_profile("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn debounce_key_cleared_after_processing() {
    let h = setup().await;
    h.provider.route(PATCH_ROUTE, "{}").await;
    h.provider.route(INSERT_ROUTE, "[]").await;

    h.scheduler
        .schedule_extraction("s1", "u1", &conversation(), None)
        .await
        .unwrap();
    assert!(kv::get(&h.db, "extract:debounce:s1").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;
    h.scheduler.drain_due(&h.worker).await.unwrap();
    assert!(kv::get(&h.db, "extract:debounce:s1").await.unwrap().is_none());
}

#[tokio::test]
async fn runner_loop_processes_scheduled_job() {
    let h = setup().await;
    h.provider.route(PATCH_ROUTE, "{}").await;
    h.provider
        .route(
            INSERT_ROUTE,
            r#"[{"context":"trip planning","content":"User is going to Japan in April"}]"#,
        )
        .await;

    let cancel = tokio_util::sync::CancellationToken::new();
    let job_id = h
        .scheduler
        .schedule_extraction("s1", "u1", &conversation(), None)
        .await
        .unwrap();

    // Drive the poll loop alongside a deadline.
    let run = h.scheduler.run(&h.worker, cancel.clone());
    let wait = async {
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if queue::state(&h.db, &job_id).await.unwrap() == Some(JobState::Completed) {
                break;
            }
        }
        cancel.cancel();
    };
    tokio::join!(run, wait);

    assert_eq!(
        queue::state(&h.db, &job_id).await.unwrap(),
        Some(JobState::Completed)
    );
    assert_eq!(h.store.episodic_for_user("u1", 10).await.unwrap().len(), 1);
}
