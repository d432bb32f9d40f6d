//! Small text helpers shared by the trigger detector and the dream engine

use std::collections::HashSet;

/// Split a passage on sentence terminators and newlines, trimmed and
/// empties dropped
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercased word set, words longer than 2 characters
pub fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the two word sets
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Fraction of `a`'s words also present in `b`
pub fn overlap_ratio(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    if set_a.is_empty() {
        return 0.0;
    }
    let set_b = word_set(b);
    let shared = set_a.iter().filter(|w| set_b.contains(*w)).count();
    shared as f64 / set_a.len() as f64
}

// ============================================================================
// TESTS
// ============================================================================
