//! Consolidation
//!
//! Greedy clustering of near-duplicate memories followed by candidate
//! construction: the cluster's strongest member (importance, then length,
//! then recency) becomes the primary, and novel sentences from the others
//! are appended as a bracketed supplement. The merged record takes the
//! maximum importance and the tag union; non-primary members are
//! superseded into it.
//!
//! A Jaccard text-similarity fallback serves when embeddings are absent.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::embeddings::cosine_similarity;
use crate::memory::Memory;
use crate::text::{jaccard, overlap_ratio, split_sentences};

/// Cluster threshold for the text-similarity fallback
const TEXT_FALLBACK_THRESHOLD: f64 = 0.5;
/// A sentence with word overlap below this against the primary is novel
const NOVELTY_MAX_OVERLAP: f64 = 0.7;
/// Additions this similar to an accepted one are duplicates
const ADDITION_DEDUP_JACCARD: f64 = 0.7;

// ============================================================================
// CONFIG & CANDIDATES
// ============================================================================

/// Consolidation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Cosine threshold for cluster membership
    pub threshold: f32,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self { threshold: 0.85 }
    }
}

/// A planned merge of one cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationCandidate {
    /// The member kept as the backbone of the merge
    pub primary_id: String,
    /// Members to supersede into the merged memory
    pub member_ids: Vec<String>,
    /// Primary content plus bracketed novel additions
    pub merged_content: String,
    /// Why the cluster merged
    pub merge_rationale: String,
    /// Maximum importance across the cluster
    pub importance: f64,
    /// Tag union across the cluster
    pub tags: Vec<String>,
}

// ============================================================================
// CLUSTERING
// ============================================================================

/// Greedy clustering by cosine similarity.
///
/// Memories are visited in input order; each unvisited one seeds a
/// cluster collecting every still-unvisited memory within the threshold.
/// Entries without embeddings never cluster.
pub fn find_clusters(
    inputs: &[(Memory, Vec<f32>)],
    config: &ConsolidationConfig,
) -> Vec<Vec<usize>> {
    let mut visited = vec![false; inputs.len()];
    let mut clusters = vec![];

    for i in 0..inputs.len() {
        if visited[i] || inputs[i].1.is_empty() {
            continue;
        }
        visited[i] = true;
        let mut cluster = vec![i];
        for j in (i + 1)..inputs.len() {
            if visited[j] || inputs[j].1.is_empty() {
                continue;
            }
            if cosine_similarity(&inputs[i].1, &inputs[j].1) >= config.threshold {
                visited[j] = true;
                cluster.push(j);
            }
        }
        if cluster.len() >= 2 {
            clusters.push(cluster);
        }
    }
    clusters
}

/// Text-similarity fallback for snapshots without embeddings
pub fn find_clusters_by_text(memories: &[Memory]) -> Vec<Vec<usize>> {
    let mut visited = vec![false; memories.len()];
    let mut clusters = vec![];

    for i in 0..memories.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let mut cluster = vec![i];
        for j in (i + 1)..memories.len() {
            if visited[j] {
                continue;
            }
            if jaccard(&memories[i].content, &memories[j].content) >= TEXT_FALLBACK_THRESHOLD {
                visited[j] = true;
                cluster.push(j);
            }
        }
        if cluster.len() >= 2 {
            clusters.push(cluster);
        }
    }
    clusters
}

// ============================================================================
// CANDIDATE CONSTRUCTION
// ============================================================================

/// Build the merge plan for one cluster of memories.
///
/// Members sort by importance desc, then content length desc, then
/// recency desc; the head is the primary. Sentences from the rest are
/// appended when novel against the primary (word overlap < 70%) and not
/// near-duplicates of already-accepted additions (Jaccard > 0.7).
pub fn build_candidate(cluster: &[&Memory]) -> Option<ConsolidationCandidate> {
    if cluster.len() < 2 {
        return None;
    }

    let mut ordered: Vec<&Memory> = cluster.to_vec();
    ordered.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.content.len().cmp(&a.content.len()))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
    let primary = ordered[0];
    let others = &ordered[1..];

    let mut additions: Vec<String> = vec![];
    for member in others {
        for sentence in split_sentences(&member.content) {
            if overlap_ratio(sentence, &primary.content) >= NOVELTY_MAX_OVERLAP {
                continue;
            }
            let duplicate = additions
                .iter()
                .any(|seen| jaccard(seen, sentence) > ADDITION_DEDUP_JACCARD);
            if !duplicate {
                additions.push(sentence.to_string());
            }
        }
    }

    let merged_content = if additions.is_empty() {
        primary.content.clone()
    } else {
        format!("{}\n\n[Also noted: {}]", primary.content, additions.join(". "))
    };

    let importance = ordered
        .iter()
        .map(|m| m.importance)
        .fold(f64::MIN, f64::max);

    let mut tags: Vec<String> = vec![];
    let mut seen: HashSet<&str> = HashSet::new();
    for member in &ordered {
        for tag in &member.tags {
            if seen.insert(tag.as_str()) {
                tags.push(tag.clone());
            }
        }
    }

    Some(ConsolidationCandidate {
        primary_id: primary.id.clone(),
        member_ids: others.iter().map(|m| m.id.clone()).collect(),
        merge_rationale: format!(
            "{} near-duplicate memories merged around {} ({} novel additions)",
            cluster.len(),
            primary.id,
            additions.len()
        ),
        merged_content,
        importance,
        tags,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::normalize;
    use chrono::{Duration, Utc};

    fn mem(id: &str, content: &str, importance: f64, days_ago: i64) -> Memory {
        let mut m = Memory::new(content)
            .with_importance(importance)
            .with_tags([id]);
        m.id = format!("mem_{}_000000", id);
        m.timestamp = Utc::now() - Duration::days(days_ago);
        m
    }

    fn with_vec(m: Memory, v: &[f32]) -> (Memory, Vec<f32>) {
        (m, normalize(v))
    }

    #[test]
    fn test_greedy_clustering() {
        let inputs = vec![
            with_vec(mem("a", "postgres choice", 3.0, 3), &[1.0, 0.0, 0.0]),
            with_vec(mem("b", "postgres decision", 4.0, 2), &[0.99, 0.1, 0.0]),
            with_vec(mem("c", "unrelated frontend", 3.0, 1), &[0.0, 1.0, 0.0]),
            with_vec(mem("d", "postgres again", 3.0, 1), &[0.98, 0.12, 0.0]),
        ];

        let clusters = find_clusters(&inputs, &ConsolidationConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], vec![0, 1, 3]);
    }

    #[test]
    fn test_singletons_are_not_candidates() {
        let inputs = vec![
            with_vec(mem("a", "alpha", 3.0, 1), &[1.0, 0.0]),
            with_vec(mem("b", "beta", 3.0, 1), &[0.0, 1.0]),
        ];
        assert!(find_clusters(&inputs, &ConsolidationConfig::default()).is_empty());
    }

    #[test]
    fn test_text_fallback_clusters() {
        let memories = vec![
            mem("a", "connection pool exhausted under load spikes", 3.0, 2),
            mem("b", "connection pool exhausted during load spikes", 3.0, 1),
            mem("c", "css grid alignment bug", 3.0, 1),
        ];
        let clusters = find_clusters_by_text(&memories);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], vec![0, 1]);
    }

    #[test]
    fn test_primary_selection_by_importance() {
        let a = mem("a", "short but important postgres note", 4.0, 5);
        let b = mem(
            "b",
            "longer but less important postgres note with extra words",
            3.0,
            1,
        );
        let candidate = build_candidate(&[&a, &b]).unwrap();
        assert_eq!(candidate.primary_id, a.id);
        assert_eq!(candidate.member_ids, vec![b.id.clone()]);
        assert_eq!(candidate.importance, 4.0);
    }

    #[test]
    fn test_length_breaks_importance_ties() {
        let a = mem("a", "short note", 3.0, 1);
        let b = mem("b", "a much longer note with considerably more detail", 3.0, 5);
        let candidate = build_candidate(&[&a, &b]).unwrap();
        assert_eq!(candidate.primary_id, b.id);
    }

    #[test]
    fn test_tags_unioned_importance_maxed() {
        let mut a = mem("a", "postgres is our database", 3.0, 3);
        a.tags = vec!["database".to_string(), "postgres".to_string()];
        let mut b = mem("b", "postgres handles our relational data", 4.0, 2);
        b.tags = vec!["database".to_string(), "architecture".to_string()];

        let candidate = build_candidate(&[&a, &b]).unwrap();
        assert_eq!(candidate.importance, 4.0);
        assert_eq!(candidate.tags.len(), 3);
        assert!(candidate.tags.contains(&"postgres".to_string()));
        assert!(candidate.tags.contains(&"architecture".to_string()));
    }

    #[test]
    fn test_novel_sentences_appended() {
        let primary = mem(
            "a",
            "We chose PostgreSQL as the primary data store for the backend services",
            4.0,
            3,
        );
        let other = mem(
            "b",
            "We chose PostgreSQL as the primary data store. Replication uses two standby nodes in other regions",
            3.0,
            1,
        );
        let candidate = build_candidate(&[&primary, &other]).unwrap();
        assert!(candidate.merged_content.starts_with(&primary.content));
        assert!(candidate.merged_content.contains("standby nodes"));
        // The duplicated first sentence is not appended
        assert_eq!(candidate.merged_content.matches("primary data store").count(), 1);
    }

    #[test]
    fn test_duplicate_additions_collapse() {
        let primary = mem("a", "The deploy pipeline runs on merge to main", 4.0, 3);
        let b = mem("b", "Canary rollout takes thirty minutes to finish", 3.0, 2);
        let c = mem("c", "Canary rollout takes about thirty minutes to finish", 3.0, 1);

        let candidate = build_candidate(&[&primary, &b, &c]).unwrap();
        assert_eq!(candidate.merged_content.matches("thirty minutes").count(), 1);
    }

    #[test]
    fn test_no_additions_keeps_primary_content() {
        let a = mem("a", "exactly the same sentence here", 4.0, 2);
        let b = mem("b", "exactly the same sentence here", 3.0, 1);
        let candidate = build_candidate(&[&a, &b]).unwrap();
        assert_eq!(candidate.merged_content, a.content);
    }
}
