//! Memory codec
//!
//! Lossless round-trip between the rich `Memory` record and the flat
//! `{string -> scalar}` metadata map the vector store accepts. Lists are
//! comma-joined; structured blocks travel as JSON strings under stable
//! `*_json` keys. Decoding is total: a malformed JSON block is logged as a
//! parsing error against its field and dropped, never aborting the record.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::warn;

use super::{Memory, MemoryLayer, MemoryLink, MemoryScope, MemorySource, MemoryType};

/// Metadata key for the rich link list
pub const LINKS_KEY: &str = "links_json";

/// Context blocks carried as JSON strings, with their metadata keys
const CONTEXT_KEYS: &[&str] = &[
    "emotional_context_json",
    "narrative_context_json",
    "multi_agent_context_json",
    "social_context_json",
    "metadata_json",
];

// ============================================================================
// ENCODE
// ============================================================================

/// Encode a memory into `(document, metadata)` for the vector store
pub fn encode(memory: &Memory) -> (String, Map<String, Value>) {
    let mut meta = Map::new();

    meta.insert("type".into(), json!(memory.memory_type.as_str()));
    meta.insert("tags".into(), json!(memory.tags.join(",")));
    meta.insert("timestamp".into(), json!(memory.timestamp.to_rfc3339()));
    meta.insert(
        "ingestion_time".into(),
        json!(memory.ingestion_time.to_rfc3339()),
    );
    meta.insert("importance".into(), json!(memory.importance));
    meta.insert("access_count".into(), json!(memory.access_count));
    if let Some(t) = memory.last_accessed {
        meta.insert("last_accessed".into(), json!(t.to_rfc3339()));
    }
    if let Some(p) = &memory.project {
        meta.insert("project".into(), json!(p));
    }
    if let Some(s) = &memory.session_id {
        meta.insert("session_id".into(), json!(s));
    }
    meta.insert("layer".into(), json!(memory.layer.as_str()));
    meta.insert("scope".into(), json!(memory.scope.as_str()));
    meta.insert("source".into(), json!(memory.source.as_str()));
    meta.insert("confidence".into(), json!(memory.confidence));
    if let Some(t) = memory.valid_from {
        meta.insert("valid_from".into(), json!(t.to_rfc3339()));
    }
    if let Some(t) = memory.valid_until {
        meta.insert("valid_until".into(), json!(t.to_rfc3339()));
    }
    if let Some(id) = &memory.supersedes {
        meta.insert("supersedes".into(), json!(id));
    }
    if let Some(id) = &memory.superseded_by {
        meta.insert("superseded_by".into(), json!(id));
    }
    if !memory.related_memories.is_empty() {
        meta.insert(
            "related_memories".into(),
            json!(memory.related_memories.join(",")),
        );
    }
    if !memory.links.is_empty() {
        // Serialization of plain data structs cannot fail
        if let Ok(links) = serde_json::to_string(&memory.links) {
            meta.insert(LINKS_KEY.into(), json!(links));
        }
    }

    let blocks = [
        ("emotional_context_json", &memory.emotional_context),
        ("narrative_context_json", &memory.narrative_context),
        ("multi_agent_context_json", &memory.multi_agent_context),
        ("social_context_json", &memory.social_context),
        ("metadata_json", &memory.metadata),
    ];
    for (key, block) in blocks {
        if let Some(value) = block {
            meta.insert(key.into(), json!(value.to_string()));
        }
    }

    (memory.content.clone(), meta)
}

// ============================================================================
// DECODE
// ============================================================================

/// Decode a memory from its stored `(id, document, metadata)` triple.
///
/// Missing fields take their documented defaults (`type=context`,
/// `importance=3`, `confidence=1`, `layer=long_term`, `scope=personal`,
/// `source=human`). Malformed JSON blocks are dropped with a warning.
pub fn decode(id: &str, document: &str, meta: &Map<String, Value>) -> Memory {
    let now = Utc::now();

    let timestamp = get_datetime(meta, "timestamp").unwrap_or(now);
    let mut memory = Memory {
        id: id.to_string(),
        content: document.to_string(),
        memory_type: get_str(meta, "type")
            .map(MemoryType::parse_name)
            .unwrap_or_default(),
        tags: get_list(meta, "tags"),
        timestamp,
        ingestion_time: get_datetime(meta, "ingestion_time").unwrap_or(timestamp),
        importance: get_f64(meta, "importance").unwrap_or(super::DEFAULT_IMPORTANCE),
        access_count: get_f64(meta, "access_count").unwrap_or(0.0).max(0.0) as u32,
        last_accessed: get_datetime(meta, "last_accessed"),
        project: get_str(meta, "project").map(str::to_string),
        session_id: get_str(meta, "session_id").map(str::to_string),
        layer: get_str(meta, "layer")
            .map(MemoryLayer::parse_name)
            .unwrap_or_default(),
        scope: get_str(meta, "scope")
            .map(MemoryScope::parse_name)
            .unwrap_or_default(),
        source: get_str(meta, "source")
            .map(MemorySource::parse_name)
            .unwrap_or_default(),
        confidence: get_f64(meta, "confidence").unwrap_or(1.0),
        valid_from: get_datetime(meta, "valid_from"),
        valid_until: get_datetime(meta, "valid_until"),
        supersedes: get_str(meta, "supersedes").map(str::to_string),
        superseded_by: get_str(meta, "superseded_by").map(str::to_string),
        related_memories: get_list(meta, "related_memories"),
        links: decode_links(meta),
        ..Default::default()
    };

    let mut blocks = CONTEXT_KEYS.iter().map(|key| decode_block(meta, key));
    memory.emotional_context = blocks.next().flatten();
    memory.narrative_context = blocks.next().flatten();
    memory.multi_agent_context = blocks.next().flatten();
    memory.social_context = blocks.next().flatten();
    memory.metadata = blocks.next().flatten();

    memory
}

fn decode_links(meta: &Map<String, Value>) -> Vec<MemoryLink> {
    let Some(raw) = get_str(meta, LINKS_KEY) else {
        return vec![];
    };
    match serde_json::from_str::<Vec<MemoryLink>>(raw) {
        Ok(mut links) => {
            for link in &mut links {
                if let Some(s) = link.strength {
                    link.strength = Some(s.clamp(0.0, 1.0));
                }
            }
            links
        }
        Err(err) => {
            warn!(field = LINKS_KEY, error = %err, "dropping malformed link block");
            vec![]
        }
    }
}

fn decode_block(meta: &Map<String, Value>, key: &str) -> Option<Value> {
    let raw = get_str(meta, key)?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(field = key, error = %err, "dropping malformed context block");
            None
        }
    }
}

fn get_str<'a>(meta: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    meta.get(key).and_then(Value::as_str)
}

fn get_f64(meta: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = meta.get(key)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn get_datetime(meta: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = get_str(meta, key)?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(err) => {
            warn!(field = key, raw, error = %err, "dropping unparseable timestamp");
            None
        }
    }
}

fn get_list(meta: &Map<String, Value>, key: &str) -> Vec<String> {
    get_str(meta, key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// TESTS
// ============================================================================
