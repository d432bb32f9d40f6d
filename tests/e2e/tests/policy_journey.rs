//! Trigger-to-store and trust-gating journeys

use engram_core::{
    Decision, DecisionContext, Memory, MemoryType, Outcome, RetrievalEngine, SaveOptions,
    SearchOptions, TriggerDetector, TriggerKind, TrustEngine, TrustPolicyConfig,
};

use engram_e2e_tests::mocks::test_store;

#[tokio::test]
async fn trigger_classifies_then_store_remembers() {
    let detector = TriggerDetector::new();
    let text = "We decided to use PostgreSQL for the analytics database";

    let trigger = detector.detect_trigger(text).unwrap();
    assert_eq!(trigger.kind, TriggerKind::Save);
    assert_eq!(trigger.memory_type, MemoryType::Decision);

    let store = test_store();
    let memory = Memory::new(&trigger.content)
        .with_type(trigger.memory_type)
        .with_tags(detector.detect_tags(text))
        .with_importance(detector.estimate_importance(text) as f64);
    let id = store.save(memory, SaveOptions::default()).await.unwrap();

    let engine = RetrievalEngine::new(store.clone());
    let results = engine
        .search(
            "postgresql analytics database",
            SearchOptions {
                include_decayed: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(results[0].memory.id, id);
    assert!(results[0].memory.tags.contains(&"postgresql".to_string()));
}

#[tokio::test]
async fn synthesize_beats_recall_in_mixed_text() {
    let detector = TriggerDetector::new();
    let trigger = detector
        .detect_trigger(
            "Synthesize and summarize the key points we discussed and also what did we decide about auth?",
        )
        .unwrap();
    assert_eq!(trigger.kind, TriggerKind::Synthesize);
}

#[tokio::test]
async fn walker_earns_autonomy_through_reviews() {
    let trust = TrustEngine::new(TrustPolicyConfig::default());
    let ctx = DecisionContext::default();

    // A new walker starts in review
    assert_eq!(trust.decide("add_link", &ctx).await, Decision::Review);

    // Ten approved proposals later it runs unreviewed
    for i in 0..10 {
        let proposal = trust
            .propose(
                "add_link",
                "walker_7",
                "linker",
                vec![format!("mem_{}_aaaaaa", i), format!("mem_{}_bbbbbb", i)],
                "link similar memories",
                "cosine neighbors",
            )
            .await
            .unwrap();
        trust.resolve_proposal(&proposal.id, true).await.unwrap();
    }
    assert_eq!(trust.decide("add_link", &ctx).await, Decision::Auto);
    assert!(trust.trust_score("add_link").await > 0.9);
}

#[tokio::test]
async fn foundational_targets_always_reviewed() {
    let trust = TrustEngine::new(TrustPolicyConfig::default());
    for _ in 0..12 {
        trust.record_outcome("update_memory", Outcome::Approved).await;
    }

    let ctx = DecisionContext {
        target_type: Some(MemoryType::Foundational),
        ..Default::default()
    };
    assert_eq!(trust.decide("update_memory", &ctx).await, Decision::Review);

    let ctx = DecisionContext {
        target_importance: Some(5.0),
        ..Default::default()
    };
    assert_eq!(trust.decide("update_memory", &ctx).await, Decision::Review);

    // Ordinary targets ride the earned trust
    assert_eq!(
        trust.decide("update_memory", &DecisionContext::default()).await,
        Decision::Auto
    );
}

#[tokio::test]
async fn rejections_erode_autonomy() {
    let trust = TrustEngine::new(TrustPolicyConfig::default());
    for _ in 0..10 {
        trust.record_outcome("supersede", Outcome::Approved).await;
    }
    assert_eq!(
        trust.decide("supersede", &DecisionContext::default()).await,
        Decision::Auto
    );

    for _ in 0..10 {
        trust.record_outcome("supersede", Outcome::Rejected).await;
    }
    assert_eq!(
        trust.decide("supersede", &DecisionContext::default()).await,
        Decision::Review
    );
}
