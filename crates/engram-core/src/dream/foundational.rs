//! Foundational ingest
//!
//! Parses a structured identity document - category headers over bullet
//! items - into foundational memories: importance 5, confidence 1,
//! foundational layer, exempt from decay and deletion. Items already in
//! the store (similarity >= 0.9 against an existing memory) are skipped.

use serde::{Deserialize, Serialize};

use crate::ids;
use crate::memory::{Memory, MemoryLayer, MemorySource, MemoryType};

/// Recognized category headers
pub const CATEGORIES: &[&str] = &["identity", "goals", "values", "constraints", "style"];

/// Similarity at or above which an item is a duplicate of an existing
/// memory
pub const DUPLICATE_SIMILARITY: f32 = 0.9;

/// One parsed bullet item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundationalItem {
    /// Category the item appeared under
    pub category: String,
    /// The item text
    pub content: String,
}

/// Parse a category-header document into items.
///
/// Headers are lines naming a category (`# Identity`, `identity:`,
/// `## Values`); bullets are `-`, `*` or `•` lines beneath them. Bullets
/// before any header are ignored.
pub fn parse_document(text: &str) -> Vec<FoundationalItem> {
    let mut items = vec![];
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(category) = header_category(line) {
            current = Some(category);
            continue;
        }
        let Some(bullet) = line
            .strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .or_else(|| line.strip_prefix("• "))
        else {
            continue;
        };
        let Some(category) = &current else {
            continue;
        };
        let content = bullet.trim();
        if !content.is_empty() {
            items.push(FoundationalItem {
                category: category.clone(),
                content: content.to_string(),
            });
        }
    }
    items
}

fn header_category(line: &str) -> Option<String> {
    let stripped = line
        .trim_start_matches('#')
        .trim()
        .trim_end_matches(':')
        .to_lowercase();
    CATEGORIES
        .iter()
        .find(|c| **c == stripped)
        .map(|c| c.to_string())
}

/// Build the foundational memory for one item
pub fn item_to_memory(item: &FoundationalItem) -> Memory {
    let mut memory = Memory::new(&item.content).with_type(MemoryType::Foundational);
    memory.id = ids::new_id(ids::FOUNDATIONAL_ID_PREFIX);
    memory.layer = MemoryLayer::Foundational;
    memory.source = MemorySource::System;
    memory.importance = 5.0;
    memory.confidence = 1.0;
    memory.tags = vec![item.category.clone(), "foundational".to_string()];
    memory
}

// ============================================================================
// TESTS
// ============================================================================
