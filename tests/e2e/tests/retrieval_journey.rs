//! Hybrid retrieval and graph enrichment journeys

use chrono::{Duration, Utc};
use engram_core::{
    GraphEnricher, LinkType, MatchKind, Memory, MemoryLink, MemoryType, RetrievalEngine,
    SaveOptions, SearchOptions,
};

use engram_e2e_tests::mocks::test_store;

#[tokio::test]
async fn decay_prefers_fresh_memories() {
    let store = test_store();

    let mut stale = Memory::new("the deploy pipeline uses blue green rollouts");
    stale.timestamp = Utc::now() - Duration::days(120);
    let stale_id = store.save(stale, SaveOptions::default()).await.unwrap();

    let fresh = Memory::new("the deploy pipeline uses blue green rollouts");
    let fresh_id = store.save(fresh, SaveOptions::default()).await.unwrap();

    let engine = RetrievalEngine::new(store.clone());
    let results = engine
        .search("deploy pipeline rollouts", SearchOptions::default())
        .await
        .unwrap();

    let rank = |id: &str| results.iter().position(|r| r.memory.id == id).unwrap();
    assert!(rank(&fresh_id) < rank(&stale_id));

    // With decay skipped the tie breaks by ingestion recency instead
    let results = engine
        .search(
            "deploy pipeline rollouts",
            SearchOptions {
                include_decayed: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(results[0].memory.id, fresh_id);
}

#[tokio::test]
async fn tags_filter_in_process() {
    let store = test_store();
    store
        .save(
            Memory::new("queue consumers batch one hundred messages").with_tags(["queue"]),
            SaveOptions::default(),
        )
        .await
        .unwrap();
    store
        .save(
            Memory::new("queue consumers batch fifty messages on peak").with_tags(["capacity"]),
            SaveOptions::default(),
        )
        .await
        .unwrap();

    let engine = RetrievalEngine::new(store.clone());
    let results = engine
        .search(
            "queue consumers batching",
            SearchOptions {
                tags: Some(vec!["queue".to_string()]),
                include_decayed: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].memory.tags.contains(&"queue".to_string()));
}

#[tokio::test]
async fn hybrid_blends_lexical_evidence() {
    let store = test_store();
    let lexical_id = store
        .save(
            Memory::new("grafana dashboards track p99 latency per region"),
            SaveOptions::default(),
        )
        .await
        .unwrap();
    store
        .save(
            Memory::new("oncall rotations swap every other week"),
            SaveOptions::default(),
        )
        .await
        .unwrap();

    let engine = RetrievalEngine::new(store.clone());
    let results = engine
        .search(
            "grafana p99 latency",
            SearchOptions {
                use_hybrid: true,
                include_decayed: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(results[0].memory.id, lexical_id);
    assert!(results[0].score > results[1].score);
}

#[tokio::test]
async fn graph_expansion_appends_neighbors() {
    let store = test_store();
    let neighbor_id = store
        .save(
            Memory::new("the auth service signs tokens with rotating keys"),
            SaveOptions::default(),
        )
        .await
        .unwrap();
    let mut hit = Memory::new("login failures spiked after the key rotation");
    hit.push_link(MemoryLink::new(&neighbor_id, LinkType::CausedBy));
    store.save(hit, SaveOptions::default()).await.unwrap();

    let engine = RetrievalEngine::new(store.clone());
    let results = engine
        .search(
            "login failures key rotation spiked",
            SearchOptions {
                limit: 1,
                expand_graph: true,
                include_decayed: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Main result plus the appended neighbor
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].memory.id, neighbor_id);
    assert_eq!(results[1].match_kind, MatchKind::GraphExpansion);
    assert!((results[1].score - 0.1).abs() < 1e-6);
}

#[tokio::test]
async fn enrichment_types_foundational_links() {
    let store = test_store();
    let mut foundational = Memory::new("correctness beats cleverness in every tradeoff")
        .with_type(MemoryType::Foundational);
    foundational.importance = 5.0;
    let foundational_id = store
        .save(foundational, SaveOptions::default())
        .await
        .unwrap();
    let context_id = store
        .save(
            Memory::new("correctness beats cleverness in code review comments")
                .with_type(MemoryType::Context),
            SaveOptions::default(),
        )
        .await
        .unwrap();

    let snapshot = store.dump(true).await.unwrap();
    let report = GraphEnricher::new().enrich(&snapshot);

    let typed = |source: &str, target: &str| {
        report
            .proposed_links
            .iter()
            .find(|p| p.source_id == source && p.link.target_id == target)
            .map(|p| p.link.link_type)
    };
    assert_eq!(
        typed(&context_id, &foundational_id),
        Some(LinkType::DependsOn)
    );
    assert_eq!(
        typed(&foundational_id, &context_id),
        Some(LinkType::Supports)
    );
}
