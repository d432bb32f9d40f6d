//! Save / retrieve / supersede lifecycle journeys

use chrono::{TimeZone, Utc};
use engram_core::{
    Memory, MemoryPatch, MemoryType, RetrievalEngine, SaveOptions, SearchOptions,
};

use engram_e2e_tests::mocks::test_store;

#[tokio::test]
async fn save_then_search_then_access_count() {
    let store = test_store();

    // Background noise so the search has something to rank against
    for content in [
        "the frontend uses tailwind utility classes",
        "standup moved to nine thirty",
    ] {
        store
            .save(Memory::new(content), SaveOptions::default())
            .await
            .unwrap();
    }

    let saved = Memory::new("We decided to use PostgreSQL as the database")
        .with_type(MemoryType::Decision)
        .with_tags(["database"])
        .with_importance(4.0)
        .with_timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    let id = store.save(saved, SaveOptions::default()).await.unwrap();

    let engine = RetrievalEngine::new(store.clone());
    let results = engine
        .search(
            "database choice postgresql decided",
            SearchOptions {
                limit: 5,
                include_decayed: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].memory.id, id);

    // Search is read-only; the counting read is get()
    let fetched = store.get(&id).await.unwrap().unwrap();
    assert_eq!(fetched.access_count, 1);
    assert!(fetched.last_accessed.is_some());
}

#[tokio::test]
async fn supersession_chain_invariants() {
    let store = test_store();
    let old_id = store
        .save(
            Memory::new("deploys happen friday afternoons"),
            SaveOptions::default(),
        )
        .await
        .unwrap();
    let new_id = store
        .save(
            Memory::new("deploys happen tuesday mornings now"),
            SaveOptions::default(),
        )
        .await
        .unwrap();

    store.supersede(&old_id, &new_id).await.unwrap();

    let old = store.get_raw(&old_id).await.unwrap().unwrap();
    let new = store.get_raw(&new_id).await.unwrap().unwrap();
    assert_eq!(old.superseded_by.as_deref(), Some(new_id.as_str()));
    assert_eq!(new.supersedes.as_deref(), Some(old_id.as_str()));
    assert!(old.valid_until.is_some());
    assert!(!old.is_current());
    assert!(new.is_current());
}

#[tokio::test]
async fn update_preserves_event_time_and_access() {
    let store = test_store();
    let id = store
        .save(
            Memory::new("the rate limiter allows one hundred requests"),
            SaveOptions::default(),
        )
        .await
        .unwrap();
    store.get(&id).await.unwrap();
    let before = store.get_raw(&id).await.unwrap().unwrap();

    store
        .update(
            &id,
            MemoryPatch {
                content: Some("the rate limiter allows two hundred requests".to_string()),
                importance: Some(4.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let after = store.get_raw(&id).await.unwrap().unwrap();
    assert_eq!(after.timestamp, before.timestamp);
    assert_eq!(after.ingestion_time, before.ingestion_time);
    assert_eq!(after.access_count, before.access_count);
    assert_eq!(after.importance, 4.0);
    assert!(after.content.contains("two hundred"));
}

#[tokio::test]
async fn rich_metadata_survives_the_store() {
    let store = test_store();
    let mut memory = Memory::new("billing webhooks retry with exponential backoff")
        .with_type(MemoryType::Pattern)
        .with_tags(["billing", "webhooks"])
        .with_project("payments");
    memory.confidence = 0.8;
    memory.emotional_context = Some(serde_json::json!({"valence": -0.1, "arousal": 0.4}));
    memory.metadata = Some(serde_json::json!({"origin": "incident-42"}));

    let id = store.save(memory, SaveOptions::default()).await.unwrap();
    let back = store.get_raw(&id).await.unwrap().unwrap();

    assert_eq!(back.memory_type, MemoryType::Pattern);
    assert_eq!(back.tags, vec!["billing", "webhooks"]);
    assert_eq!(back.project.as_deref(), Some("payments"));
    assert_eq!(back.confidence, 0.8);
    assert_eq!(
        back.emotional_context,
        Some(serde_json::json!({"valence": -0.1, "arousal": 0.4}))
    );
    assert_eq!(
        back.metadata,
        Some(serde_json::json!({"origin": "incident-42"}))
    );
}

#[tokio::test]
async fn stats_reflect_saves() {
    let store = test_store();
    store
        .save(
            Memory::new("use feature flags for risky rollouts")
                .with_type(MemoryType::Decision)
                .with_project("platform"),
            SaveOptions::default(),
        )
        .await
        .unwrap();
    store
        .save(
            Memory::new("the queue drains slowly on mondays").with_type(MemoryType::Pattern),
            SaveOptions::default(),
        )
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_type.get("decision"), Some(&1));
    assert_eq!(stats.by_type.get("pattern"), Some(&1));
    assert_eq!(stats.by_project.get("platform"), Some(&1));
    assert_eq!(stats.recent_count, 2);
}
