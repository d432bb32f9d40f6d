//! Shadow activity (working memory)
//!
//! A shadow is a short-lived aggregation slot keyed by `(session_id,
//! topic)` that accumulates small activities - file touches, tool calls,
//! search queries - until it either crosses its token budget or idles out.
//! Crossing promotes the slot into a normal memory when its relevance
//! score clears the surface threshold; otherwise the slot is dropped.
//!
//! Shadow memories decay at twice the speed of normal memories (the dream
//! engine halves the half-life for `MemoryType::Shadow`).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Memory, MemoryLayer, MemorySource, MemoryType};

// ============================================================================
// CONFIG
// ============================================================================

/// Shadow aggregation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// Token budget; crossing it triggers promotion evaluation
    pub token_threshold: u32,
    /// Idle minutes before a slot is swept
    pub time_threshold_min: i64,
    /// Minimum relevance score to surface as a memory
    pub surface_threshold: f64,
    /// Whether repeated identical activities collapse into one
    pub deduplicate: bool,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            token_threshold: 500,
            time_threshold_min: 30,
            surface_threshold: 0.6,
            deduplicate: true,
        }
    }
}

// ============================================================================
// ACTIVITY LOG
// ============================================================================

/// One recorded activity inside a shadow slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowActivity {
    /// Activity kind ("file_edit", "search", "tool_call", ...)
    pub kind: String,
    /// What the activity touched
    pub target: String,
    /// Token weight of the activity
    pub tokens: u32,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl ShadowActivity {
    /// Create an activity stamped now
    pub fn new(kind: impl Into<String>, target: impl Into<String>, tokens: u32) -> Self {
        Self {
            kind: kind.into(),
            target: target.into(),
            tokens,
            timestamp: Utc::now(),
        }
    }
}

/// An open aggregation slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowSlot {
    /// Owning session
    pub session_id: String,
    /// Topic label the slot aggregates under
    pub topic: String,
    /// Accumulated activities
    pub activities: Vec<ShadowActivity>,
    /// Running token total
    pub total_tokens: u32,
    /// When the slot was opened
    pub created_at: DateTime<Utc>,
    /// Last recorded activity
    pub last_activity: DateTime<Utc>,
}

impl ShadowSlot {
    fn new(session_id: &str, topic: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            topic: topic.to_string(),
            activities: vec![],
            total_tokens: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Relevance score in [0, 1]: token pressure plus activity variety
    pub fn relevance(&self, config: &ShadowConfig) -> f64 {
        let token_part =
            (self.total_tokens as f64 / config.token_threshold.max(1) as f64).min(1.0);
        let distinct_kinds = self
            .activities
            .iter()
            .map(|a| a.kind.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();
        let variety_part = (distinct_kinds as f64 / 4.0).min(1.0);
        token_part * 0.7 + variety_part * 0.3
    }

    /// Render the slot as memory content
    fn summarize(&self) -> String {
        let mut lines = vec![format!(
            "Working session on {}: {} activities, {} tokens.",
            self.topic,
            self.activities.len(),
            self.total_tokens
        )];
        for activity in self.activities.iter().take(12) {
            lines.push(format!("- {} {}", activity.kind, activity.target));
        }
        if self.activities.len() > 12 {
            lines.push(format!("- ... and {} more", self.activities.len() - 12));
        }
        lines.join("\n")
    }

    /// Promote the slot into a shadow-type memory
    fn into_memory(self, config: &ShadowConfig) -> Memory {
        let relevance = self.relevance(config);
        let mut memory = Memory::new(self.summarize()).with_type(MemoryType::Shadow);
        memory.layer = MemoryLayer::ShortTerm;
        memory.source = MemorySource::Claude;
        memory.session_id = Some(self.session_id);
        memory.tags = vec![self.topic.to_lowercase()];
        memory.importance = 2.0;
        memory.confidence = relevance.clamp(0.0, 1.0);
        memory.timestamp = self.created_at;
        memory
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// What happened to a slot when it closed
#[derive(Debug, Clone)]
pub enum ShadowOutcome {
    /// The slot cleared the surface threshold; save this memory
    Promoted(Box<Memory>),
    /// The slot fell below the threshold and was discarded
    Dropped {
        /// Owning session
        session_id: String,
        /// Slot topic
        topic: String,
        /// Score it closed with
        relevance: f64,
    },
}

// ============================================================================
// TRACKER
// ============================================================================

/// Per-process shadow log; owned by the single worker
#[derive(Debug, Default)]
pub struct ShadowTracker {
    config: ShadowConfig,
    slots: HashMap<(String, String), ShadowSlot>,
}

impl ShadowTracker {
    /// Create a tracker with default thresholds
    pub fn new() -> Self {
        Self::with_config(ShadowConfig::default())
    }

    /// Create a tracker with custom thresholds
    pub fn with_config(config: ShadowConfig) -> Self {
        Self {
            config,
            slots: HashMap::new(),
        }
    }

    /// Number of open slots
    pub fn open_slots(&self) -> usize {
        self.slots.len()
    }

    /// Record an activity under `(session_id, topic)`.
    ///
    /// Returns an outcome when the token budget was crossed and the slot
    /// closed; `None` while the slot keeps accumulating.
    pub fn record(
        &mut self,
        session_id: &str,
        topic: &str,
        activity: ShadowActivity,
    ) -> Option<ShadowOutcome> {
        let key = (session_id.to_string(), topic.to_string());
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| ShadowSlot::new(session_id, topic));

        let duplicate = self.config.deduplicate
            && slot
                .activities
                .iter()
                .any(|a| a.kind == activity.kind && a.target == activity.target);
        slot.last_activity = activity.timestamp.max(slot.last_activity);
        if !duplicate {
            slot.total_tokens = slot.total_tokens.saturating_add(activity.tokens);
            slot.activities.push(activity);
        }

        if slot.total_tokens >= self.config.token_threshold {
            let slot = self.slots.remove(&key)?;
            return Some(self.close(slot));
        }
        None
    }

    /// Sweep idle slots; call periodically.
    ///
    /// Any slot idle past the time threshold closes and yields an outcome.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<ShadowOutcome> {
        let idle_cutoff = now - Duration::minutes(self.config.time_threshold_min);
        let stale: Vec<(String, String)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.last_activity < idle_cutoff)
            .map(|(key, _)| key.clone())
            .collect();

        let removed: Vec<ShadowSlot> = stale
            .into_iter()
            .filter_map(|key| self.slots.remove(&key))
            .collect();
        removed.into_iter().map(|slot| self.close(slot)).collect()
    }

    fn close(&self, slot: ShadowSlot) -> ShadowOutcome {
        let relevance = slot.relevance(&self.config);
        if relevance >= self.config.surface_threshold {
            ShadowOutcome::Promoted(Box::new(slot.into_memory(&self.config)))
        } else {
            ShadowOutcome::Dropped {
                session_id: slot.session_id,
                topic: slot.topic,
                relevance,
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(kind: &str, target: &str, tokens: u32) -> ShadowActivity {
        ShadowActivity::new(kind, target, tokens)
    }

    #[test]
    fn test_accumulates_below_budget() {
        let mut tracker = ShadowTracker::new();
        let out = tracker.record("sess_1", "auth", activity("file_edit", "auth.rs", 100));
        assert!(out.is_none());
        assert_eq!(tracker.open_slots(), 1);
    }

    #[test]
    fn test_token_budget_promotes_varied_slot() {
        let mut tracker = ShadowTracker::new();
        tracker.record("sess_1", "auth", activity("file_edit", "auth.rs", 200));
        tracker.record("sess_1", "auth", activity("search", "jwt refresh", 150));
        tracker.record("sess_1", "auth", activity("tool_call", "run tests", 100));
        let out = tracker.record("sess_1", "auth", activity("error", "401 loop", 100));

        match out {
            Some(ShadowOutcome::Promoted(memory)) => {
                assert_eq!(memory.memory_type, MemoryType::Shadow);
                assert_eq!(memory.layer, MemoryLayer::ShortTerm);
                assert_eq!(memory.session_id.as_deref(), Some("sess_1"));
                assert!(memory.content.contains("auth"));
                assert!(memory.tags.contains(&"auth".to_string()));
            }
            other => panic!("expected promotion, got {:?}", other.is_some()),
        }
        assert_eq!(tracker.open_slots(), 0);
    }

    #[test]
    fn test_monotonous_slot_dropped() {
        // One activity kind repeated: high tokens, low variety
        let config = ShadowConfig {
            surface_threshold: 0.8,
            deduplicate: false,
            ..Default::default()
        };
        let mut tracker = ShadowTracker::with_config(config);
        tracker.record("sess_1", "scroll", activity("read", "log.txt", 300));
        let out = tracker.record("sess_1", "scroll", activity("read", "log.txt", 300));

        assert!(matches!(out, Some(ShadowOutcome::Dropped { .. })));
    }

    #[test]
    fn test_deduplicate_collapses_repeats() {
        let mut tracker = ShadowTracker::new();
        tracker.record("sess_1", "auth", activity("file_edit", "auth.rs", 400));
        // Identical activity does not add tokens, so the budget never trips
        let out = tracker.record("sess_1", "auth", activity("file_edit", "auth.rs", 400));
        assert!(out.is_none());
    }

    #[test]
    fn test_idle_sweep_closes_slots() {
        let mut tracker = ShadowTracker::new();
        tracker.record("sess_1", "auth", activity("file_edit", "auth.rs", 100));

        // Not yet idle
        assert!(tracker.sweep(Utc::now()).is_empty());

        // Past the idle window
        let later = Utc::now() + Duration::minutes(31);
        let outcomes = tracker.sweep(later);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(tracker.open_slots(), 0);
    }

    #[test]
    fn test_slots_keyed_by_session_and_topic() {
        let mut tracker = ShadowTracker::new();
        tracker.record("sess_1", "auth", activity("file_edit", "a.rs", 10));
        tracker.record("sess_1", "billing", activity("file_edit", "b.rs", 10));
        tracker.record("sess_2", "auth", activity("file_edit", "c.rs", 10));
        assert_eq!(tracker.open_slots(), 3);
    }

    #[test]
    fn test_relevance_bounded() {
        let config = ShadowConfig::default();
        let mut slot = ShadowSlot::new("sess_1", "x");
        slot.total_tokens = 10_000;
        for kind in ["a", "b", "c", "d", "e", "f"] {
            slot.activities.push(activity(kind, "t", 1));
        }
        let score = slot.relevance(&config);
        assert!((0.0..=1.0).contains(&score));
    }
}
