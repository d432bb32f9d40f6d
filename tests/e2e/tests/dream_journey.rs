//! Dream-cycle journeys: contradiction, consolidation, decay, ingest

use chrono::{Duration, Utc};
use engram_core::{
    ContradictionKind, DreamEngine, DreamOperation, DreamOptions, Memory, MemorySource,
    MemoryType, NullOracle, ResolutionAction, SaveOptions,
};
use std::sync::Arc;

use engram_e2e_tests::mocks::test_store;

fn engine() -> DreamEngine {
    DreamEngine::new(Arc::new(NullOracle))
}

#[tokio::test]
async fn temporal_contradiction_resolves_by_recency() {
    let store = test_store();

    let mut first = Memory::new("We use MongoDB")
        .with_type(MemoryType::Decision)
        .with_tags(["database"]);
    first.timestamp = Utc::now() - Duration::days(1);
    let first_id = store.save(first, SaveOptions::default()).await.unwrap();

    let second = Memory::new("We switched from MongoDB to PostgreSQL")
        .with_type(MemoryType::Decision)
        .with_tags(["database"]);
    let second_id = store.save(second, SaveOptions::default()).await.unwrap();

    let report = engine()
        .run(
            &store,
            DreamOptions {
                operations: vec![DreamOperation::Contradictions],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.contradictions.len(), 1);
    assert_eq!(report.contradictions[0].kind, ContradictionKind::Temporal);
    assert!((report.contradictions[0].confidence - 0.7).abs() < 1e-9);

    let first = store.get_raw(&first_id).await.unwrap().unwrap();
    assert_eq!(first.superseded_by.as_deref(), Some(second_id.as_str()));
    assert!(first.valid_until.is_some());
}

#[tokio::test]
async fn consolidation_merges_near_duplicates() {
    let store = test_store();
    let cluster = [
        ("postgres is our primary datastore for backend services", 3.0),
        (
            "postgres is our primary datastore for backend services today",
            4.0,
        ),
        (
            "postgres is our primary datastore for the backend services",
            3.0,
        ),
    ];
    for (content, importance) in cluster {
        store
            .save(
                Memory::new(content)
                    .with_importance(importance)
                    .with_tags(["database"]),
                SaveOptions::default(),
            )
            .await
            .unwrap();
    }

    let report = engine()
        .run(
            &store,
            DreamOptions {
                operations: vec![DreamOperation::Consolidation],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.memories_merged, 1);
    let candidate = &report.consolidation_candidates[0];
    assert_eq!(candidate.importance, 4.0);
    assert_eq!(candidate.member_ids.len(), 2);

    let merged_id = match &report.resolutions[0] {
        ResolutionAction::Merged { new_id, .. } => new_id.clone(),
        other => panic!("expected a merge, got {:?}", other),
    };
    let merged = store.get_raw(&merged_id).await.unwrap().unwrap();
    assert_eq!(merged.source, MemorySource::Consolidated);
    assert_eq!(merged.importance, 4.0);
    assert!(merged.tags.contains(&"database".to_string()));

    for member_id in &candidate.member_ids {
        let member = store.get_raw(member_id).await.unwrap().unwrap();
        assert_eq!(member.superseded_by.as_deref(), Some(merged_id.as_str()));
    }
}

#[tokio::test]
async fn decay_wears_down_untouched_memories() {
    let store = test_store();
    let mut stale = Memory::new("sixty day old observation").with_importance(4.0);
    stale.timestamp = Utc::now() - Duration::days(60);
    let stale_id = store.save(stale, SaveOptions::default()).await.unwrap();

    let mut exempt = Memory::new("core value that never fades")
        .with_type(MemoryType::Foundational);
    exempt.importance = 5.0;
    let exempt_id = store.save(exempt, SaveOptions::default()).await.unwrap();

    let report = engine()
        .run(
            &store,
            DreamOptions {
                operations: vec![DreamOperation::Decay],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // 4 * 0.5^(60/30) = 1.0
    assert_eq!(report.decay_updates.len(), 1);
    assert_eq!(report.decay_updates[0].memory_id, stale_id);
    assert!((report.decay_updates[0].new_importance - 1.0).abs() < 0.05);

    let exempt = store.get_raw(&exempt_id).await.unwrap().unwrap();
    assert_eq!(exempt.importance, 5.0);
}

#[tokio::test]
async fn full_cycle_dry_run_reports_without_mutating() {
    let store = test_store();
    let mut old = Memory::new("We use MongoDB")
        .with_type(MemoryType::Decision)
        .with_tags(["database"]);
    old.timestamp = Utc::now() - Duration::days(90);
    let old_id = store.save(old, SaveOptions::default()).await.unwrap();
    store
        .save(
            Memory::new("We switched from MongoDB to PostgreSQL")
                .with_type(MemoryType::Decision)
                .with_tags(["database"]),
            SaveOptions::default(),
        )
        .await
        .unwrap();

    let report = engine()
        .run(
            &store,
            DreamOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(report.dry_run);
    assert!(!report.contradictions.is_empty());
    assert!(!report.decay_updates.is_empty());
    assert_eq!(report.memories_merged, 0);

    let old = store.get_raw(&old_id).await.unwrap().unwrap();
    assert!(old.superseded_by.is_none());
    assert_eq!(old.importance, 3.0);
}

#[tokio::test]
async fn foundational_document_ingest() {
    let store = test_store();
    let engine = engine();

    let document = "\
# Identity
- Careful reviewer of distributed systems changes

## Values
- Correctness over delivery speed
- Plain explanations over jargon
";
    let report = engine.ingest_foundational(&store, document).await.unwrap();
    assert_eq!(report.created.len(), 3);
    assert_eq!(report.skipped_duplicates, 0);

    for id in &report.created {
        let memory = store.get_raw(id).await.unwrap().unwrap();
        assert!(memory.is_foundational());
        assert_eq!(memory.importance, 5.0);
        assert_eq!(memory.confidence, 1.0);
    }

    // The same document again is all duplicates
    let again = engine.ingest_foundational(&store, document).await.unwrap();
    assert!(again.created.is_empty());
    assert_eq!(again.skipped_duplicates, 3);
}
