//! Contradiction detection
//!
//! Pairwise scan for memories that cannot both be current:
//!
//! - **Temporal** conflicts (confidence 0.7): two decision-family memories
//!   in the same project sharing a tag, where at least one carries change
//!   phrasing ("switched from", "no longer using", ...). The newer one is
//!   the presumed superseder.
//! - **Direct** conflicts (confidence 0.85): the pair matches opposite
//!   halves of a registered negation pattern with the same captured
//!   subject ("use X" vs "don't use X").
//!
//! Without an oracle, temporal conflicts auto-resolve by recency; direct
//! conflicts are reported only.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::memory::{Memory, MemoryType};

/// Conflicts under this confidence are discarded
pub const MIN_CONFIDENCE: f64 = 0.6;
/// Confidence of a temporal conflict
const TEMPORAL_CONFIDENCE: f64 = 0.7;
/// Confidence of a direct conflict
const DIRECT_CONFIDENCE: f64 = 0.85;

/// Types that participate in temporal conflicts
const TEMPORAL_TYPES: &[MemoryType] = &[
    MemoryType::Decision,
    MemoryType::Pattern,
    MemoryType::Preference,
];

static CHANGE_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(switched (?:from|to)|changed from|migrated (?:from|to)|no longer us(?:e|ing)|now us(?:e|ing)|instead of)\b",
    )
    .expect("change phrase pattern must compile")
});

/// Positive/negative halves of a negation pair, subject in group 1
static NEGATION_PAIRS: LazyLock<Vec<(Regex, Regex)>> = LazyLock::new(|| {
    let compile = |raw: &str| Regex::new(raw).expect("negation pattern must compile");
    vec![
        (
            compile(r"(?i)\buse (\w+)"),
            compile(r"(?i)\b(?:don'?t|do not|never) use (\w+)"),
        ),
        (
            compile(r"(?i)\balways (\w+)"),
            compile(r"(?i)\bnever (\w+)"),
        ),
        (
            compile(r"(?i)\b(\w+) is good"),
            compile(r"(?i)\b(\w+) is bad"),
        ),
        (
            compile(r"(?i)\benable (\w+)"),
            compile(r"(?i)\bdisable (\w+)"),
        ),
        (
            compile(r"(?i)\bprefer (\w+)"),
            compile(r"(?i)\bavoid (\w+)"),
        ),
    ]
});

// ============================================================================
// TYPES
// ============================================================================

/// Kind of a detected contradiction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContradictionKind {
    /// Change-phrase conflict between decision-family memories
    Temporal,
    /// Negation-pair conflict on the same subject
    Direct,
}

/// A detected conflict between two memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    /// Kind of conflict
    pub kind: ContradictionKind,
    /// Detection confidence
    pub confidence: f64,
    /// The more recent memory (presumed superseder in temporal conflicts)
    pub newer_id: String,
    /// The older memory
    pub older_id: String,
    /// Captured subject for direct conflicts
    pub subject: Option<String>,
    /// Human-readable explanation
    pub reason: String,
}

// ============================================================================
// DETECTION
// ============================================================================

/// Scan all unordered pairs for conflicts.
///
/// Pairs of foundational memories are skipped. Conflicts below
/// [`MIN_CONFIDENCE`] are discarded.
pub fn detect(memories: &[Memory]) -> Vec<Contradiction> {
    let mut found = vec![];
    for (i, a) in memories.iter().enumerate() {
        for b in memories.iter().skip(i + 1) {
            if a.id == b.id {
                continue;
            }
            if a.is_foundational() && b.is_foundational() {
                continue;
            }
            if let Some(conflict) = check_pair(a, b) {
                if conflict.confidence >= MIN_CONFIDENCE {
                    found.push(conflict);
                }
            }
        }
    }
    found
}

fn check_pair(a: &Memory, b: &Memory) -> Option<Contradiction> {
    temporal_conflict(a, b).or_else(|| direct_conflict(a, b))
}

fn temporal_conflict(a: &Memory, b: &Memory) -> Option<Contradiction> {
    if !TEMPORAL_TYPES.contains(&a.memory_type) || !TEMPORAL_TYPES.contains(&b.memory_type) {
        return None;
    }
    if a.project != b.project {
        return None;
    }
    if !a.tags.iter().any(|t| b.tags.contains(t)) {
        return None;
    }
    if !CHANGE_PHRASES.is_match(&a.content) && !CHANGE_PHRASES.is_match(&b.content) {
        return None;
    }

    let (newer, older) = if a.timestamp >= b.timestamp { (a, b) } else { (b, a) };
    Some(Contradiction {
        kind: ContradictionKind::Temporal,
        confidence: TEMPORAL_CONFIDENCE,
        newer_id: newer.id.clone(),
        older_id: older.id.clone(),
        subject: None,
        reason: format!(
            "change phrasing in {} supersedes the older {}",
            newer.id, older.id
        ),
    })
}

fn direct_conflict(a: &Memory, b: &Memory) -> Option<Contradiction> {
    for (positive, negative) in NEGATION_PAIRS.iter() {
        let subject = matched_subject(positive, negative, &a.content, &b.content)
            .or_else(|| matched_subject(positive, negative, &b.content, &a.content));
        let Some(subject) = subject else {
            continue;
        };

        let (newer, older) = if a.timestamp >= b.timestamp { (a, b) } else { (b, a) };
        return Some(Contradiction {
            kind: ContradictionKind::Direct,
            confidence: DIRECT_CONFIDENCE,
            newer_id: newer.id.clone(),
            older_id: older.id.clone(),
            subject: Some(subject.clone()),
            reason: format!("opposite statements about `{}`", subject),
        });
    }
    None
}

/// Subject captured when `positive_text` matches the positive half and
/// `negative_text` the negative half, with equal subjects.
///
/// A text matching the negative half never counts as a positive match
/// ("don't use X" contains "use X").
fn matched_subject(
    positive: &Regex,
    negative: &Regex,
    positive_text: &str,
    negative_text: &str,
) -> Option<String> {
    if negative.is_match(positive_text) {
        return None;
    }
    let subject_pos = positive
        .captures(positive_text)?
        .get(1)?
        .as_str()
        .to_lowercase();
    let subject_neg = negative
        .captures(negative_text)?
        .get(1)?
        .as_str()
        .to_lowercase();
    (subject_pos == subject_neg).then_some(subject_pos)
}

// ============================================================================
// ORACLE VERDICT
// ============================================================================

/// Resolution choices the oracle may return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Close the first memory in favor of the second
    SupersedeA,
    /// Close the second memory in favor of the first
    SupersedeB,
    /// Both stand; no mutation
    KeepBoth,
    /// Replace both with merged content
    Merge,
}

/// Parsed oracle judgement on a contradiction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleVerdict {
    /// Whether the oracle confirms the conflict
    pub is_real_conflict: bool,
    /// What to do about it
    pub resolution: Resolution,
    /// Replacement content for `merge`
    #[serde(default)]
    pub merged_content: Option<String>,
    /// The oracle's explanation
    #[serde(default)]
    pub reasoning: String,
    /// The oracle's confidence
    #[serde(default)]
    pub confidence: f64,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn mem(id: &str, memory_type: MemoryType, content: &str, days_ago: i64) -> Memory {
        let mut m = Memory::new(content)
            .with_type(memory_type)
            .with_tags(["database"])
            .with_project("backend");
        m.id = id.to_string();
        m.timestamp = Utc::now() - Duration::days(days_ago);
        m
    }

    #[test]
    fn test_temporal_conflict_detected() {
        let old = mem("old", MemoryType::Decision, "We use MongoDB", 10);
        let new = mem(
            "new",
            MemoryType::Decision,
            "We switched from MongoDB to PostgreSQL",
            1,
        );

        let conflicts = detect(&[old, new]);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.kind, ContradictionKind::Temporal);
        assert_eq!(conflict.confidence, 0.7);
        assert_eq!(conflict.newer_id, "new");
        assert_eq!(conflict.older_id, "old");
    }

    #[test]
    fn test_temporal_needs_shared_tag() {
        let mut a = mem("a", MemoryType::Decision, "We switched from REST to gRPC", 1);
        a.tags = vec!["api".to_string()];
        let b = mem("b", MemoryType::Decision, "We use MongoDB for storage", 10);
        assert!(detect(&[a, b]).is_empty());
    }

    #[test]
    fn test_temporal_needs_same_project() {
        let a = mem("a", MemoryType::Decision, "We switched from npm to pnpm", 1);
        let mut b = mem("b", MemoryType::Decision, "We use npm workspaces", 10);
        b.project = Some("frontend".to_string());
        assert!(detect(&[a, b]).is_empty());
    }

    #[test]
    fn test_temporal_needs_change_phrase() {
        let a = mem("a", MemoryType::Decision, "We use MongoDB", 10);
        let b = mem("b", MemoryType::Decision, "We use PostgreSQL", 1);
        // Without change phrasing these are not a temporal conflict, and
        // neither matches a negation pair
        assert!(detect(&[a, b]).is_empty());
    }

    #[test]
    fn test_direct_conflict_use_dont_use() {
        let a = mem("a", MemoryType::Context, "Use tabs in this repo", 5);
        let b = mem("b", MemoryType::Context, "Don't use tabs anywhere", 1);

        let conflicts = detect(&[a, b]);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.kind, ContradictionKind::Direct);
        assert_eq!(conflict.confidence, 0.85);
        assert_eq!(conflict.subject.as_deref(), Some("tabs"));
    }

    #[test]
    fn test_direct_conflict_always_never() {
        let a = mem("a", MemoryType::Context, "Always rebase before merging", 5);
        let b = mem("b", MemoryType::Context, "Never rebase shared branches", 1);
        let conflicts = detect(&[a, b]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].subject.as_deref(), Some("rebase"));
    }

    #[test]
    fn test_direct_requires_same_subject() {
        let a = mem("a", MemoryType::Context, "Use tabs for indentation", 5);
        let b = mem("b", MemoryType::Context, "Don't use spaces for alignment", 1);
        assert!(detect(&[a, b]).is_empty());
    }

    #[test]
    fn test_two_negatives_do_not_conflict() {
        let a = mem("a", MemoryType::Context, "Don't use tabs here", 5);
        let b = mem("b", MemoryType::Context, "Don't use tabs there", 1);
        assert!(detect(&[a, b]).is_empty());
    }

    #[test]
    fn test_foundational_pairs_skipped() {
        let mut a = mem("a", MemoryType::Foundational, "Always prioritize safety", 5);
        a.tags = vec!["values".to_string()];
        let mut b = mem("b", MemoryType::Foundational, "Never prioritize speed", 1);
        b.tags = vec!["values".to_string()];
        assert!(detect(&[a, b]).is_empty());
    }

    #[test]
    fn test_verdict_parsing() {
        let verdict: OracleVerdict = serde_json::from_str(
            r#"{
                "is_real_conflict": true,
                "resolution": "supersede_b",
                "reasoning": "the newer decision stands",
                "confidence": 0.9
            }"#,
        )
        .unwrap();
        assert!(verdict.is_real_conflict);
        assert_eq!(verdict.resolution, Resolution::SupersedeB);
        assert!(verdict.merged_content.is_none());
    }
}
