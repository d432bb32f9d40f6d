//! Memory records - the fundamental unit of the graph
//!
//! Each memory is an immutable-identity record with mutable metadata:
//! - Content, type, tags and grouping labels
//! - Bi-temporal validity (event time vs. ingestion time)
//! - Importance, access tracking and decay exemptions
//! - Supersession chains and rich typed links

pub mod codec;
pub mod shadow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MemoryError, Result};

/// Importance floor
pub const MIN_IMPORTANCE: f64 = 1.0;
/// Importance ceiling
pub const MAX_IMPORTANCE: f64 = 5.0;
/// Default importance for new memories
pub const DEFAULT_IMPORTANCE: f64 = 3.0;
/// Soft cap on tag count
pub const MAX_TAGS: usize = 20;

// ============================================================================
// CLOSED ENUMS
// ============================================================================

/// Types of memories
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// A choice that was made
    Decision,
    /// A recurring structure or behavior
    Pattern,
    /// Something learned from experience
    Learning,
    /// Background context
    #[default]
    Context,
    /// A user or project preference
    Preference,
    /// A condensed summary of other memories
    Summary,
    /// An open action item
    Todo,
    /// A pointer to external material
    Reference,
    /// Core identity/values; exempt from decay and deletion
    Foundational,
    /// A promoted working-memory aggregate
    Shadow,
    /// A recorded conflict between memories
    Contradiction,
}

impl MemoryType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Decision => "decision",
            MemoryType::Pattern => "pattern",
            MemoryType::Learning => "learning",
            MemoryType::Context => "context",
            MemoryType::Preference => "preference",
            MemoryType::Summary => "summary",
            MemoryType::Todo => "todo",
            MemoryType::Reference => "reference",
            MemoryType::Foundational => "foundational",
            MemoryType::Shadow => "shadow",
            MemoryType::Contradiction => "contradiction",
        }
    }

    /// Parse from string name; unknown names fall back to `Context`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "decision" => MemoryType::Decision,
            "pattern" => MemoryType::Pattern,
            "learning" => MemoryType::Learning,
            "context" => MemoryType::Context,
            "preference" => MemoryType::Preference,
            "summary" => MemoryType::Summary,
            "todo" => MemoryType::Todo,
            "reference" => MemoryType::Reference,
            "foundational" => MemoryType::Foundational,
            "shadow" => MemoryType::Shadow,
            "contradiction" => MemoryType::Contradiction,
            _ => MemoryType::Context,
        }
    }

    /// All variants, in declaration order
    pub fn all() -> &'static [MemoryType] {
        &[
            MemoryType::Decision,
            MemoryType::Pattern,
            MemoryType::Learning,
            MemoryType::Context,
            MemoryType::Preference,
            MemoryType::Summary,
            MemoryType::Todo,
            MemoryType::Reference,
            MemoryType::Foundational,
            MemoryType::Shadow,
            MemoryType::Contradiction,
        ]
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage layer of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayer {
    /// Recently formed; first candidate for decay
    ShortTerm,
    /// Settled knowledge
    #[default]
    LongTerm,
    /// Core identity; never decayed, never pruned
    Foundational,
}

impl MemoryLayer {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLayer::ShortTerm => "short_term",
            MemoryLayer::LongTerm => "long_term",
            MemoryLayer::Foundational => "foundational",
        }
    }

    /// Parse from string name; unknown names fall back to `LongTerm`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "short_term" => MemoryLayer::ShortTerm,
            "long_term" => MemoryLayer::LongTerm,
            "foundational" => MemoryLayer::Foundational,
            _ => MemoryLayer::LongTerm,
        }
    }
}

/// Visibility scope of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Visible to the owning user only
    #[default]
    Personal,
    /// Shared across agents/sessions
    Shared,
}

impl MemoryScope {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryScope::Personal => "personal",
            MemoryScope::Shared => "shared",
        }
    }

    /// Parse from string name; unknown names fall back to `Personal`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "personal" => MemoryScope::Personal,
            "shared" => MemoryScope::Shared,
            _ => MemoryScope::Personal,
        }
    }
}

/// Origin of a memory
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// Recorded directly by the human
    #[default]
    Human,
    /// Recorded by the assistant
    Claude,
    /// Produced by heuristic consolidation
    Consolidated,
    /// Produced by oracle-driven consolidation
    LlmConsolidated,
    /// Produced by an interactive merge walk
    ConsciousMerge,
    /// Produced by an interactive consolidation walk
    ConsciousConsolidation,
    /// Produced by the system itself (foundational ingest, repairs)
    System,
}

impl MemorySource {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::Human => "human",
            MemorySource::Claude => "claude",
            MemorySource::Consolidated => "consolidated",
            MemorySource::LlmConsolidated => "llm_consolidated",
            MemorySource::ConsciousMerge => "conscious_merge",
            MemorySource::ConsciousConsolidation => "conscious_consolidation",
            MemorySource::System => "system",
        }
    }

    /// Parse from string name; unknown names fall back to `Human`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "human" => MemorySource::Human,
            "claude" => MemorySource::Claude,
            "consolidated" => MemorySource::Consolidated,
            "llm_consolidated" => MemorySource::LlmConsolidated,
            "conscious_merge" => MemorySource::ConsciousMerge,
            "conscious_consolidation" => MemorySource::ConsciousConsolidation,
            "system" => MemorySource::System,
            _ => MemorySource::Human,
        }
    }
}

// ============================================================================
// RICH LINKS
// ============================================================================

/// Directional semantics of a typed link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Source depends on target
    DependsOn,
    /// Source supports target
    Supports,
    /// Source was caused by target
    CausedBy,
    /// Source extends target with more detail
    Extends,
    /// Source is an example of target
    ExampleOf,
    /// Source supersedes target
    Supersedes,
    /// Source contradicts target
    Contradicts,
    /// Undirected association
    #[default]
    Related,
}

impl LinkType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::DependsOn => "depends_on",
            LinkType::Supports => "supports",
            LinkType::CausedBy => "caused_by",
            LinkType::Extends => "extends",
            LinkType::ExampleOf => "example_of",
            LinkType::Supersedes => "supersedes",
            LinkType::Contradicts => "contradicts",
            LinkType::Related => "related",
        }
    }

    /// Parse from string name; unknown names fall back to `Related`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "depends_on" => LinkType::DependsOn,
            "supports" => LinkType::Supports,
            "caused_by" => LinkType::CausedBy,
            "extends" => LinkType::Extends,
            "example_of" => LinkType::ExampleOf,
            "supersedes" => LinkType::Supersedes,
            "contradicts" => LinkType::Contradicts,
            "related" => LinkType::Related,
            _ => LinkType::Related,
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rich typed link from one memory to another
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryLink {
    /// Id of the linked memory
    pub target_id: String,
    /// Link semantics
    #[serde(rename = "type")]
    pub link_type: LinkType,
    /// Why the link exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Bounded strength in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    /// Who created the link (walker name, "human", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// When the link was created
    pub created_at: DateTime<Utc>,
}

impl MemoryLink {
    /// Create a link with the given target and type
    pub fn new(target_id: impl Into<String>, link_type: LinkType) -> Self {
        Self {
            target_id: target_id.into(),
            link_type,
            reason: None,
            strength: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a strength, clamped into [0, 1]
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength.clamp(0.0, 1.0));
        self
    }

    /// Attach a reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach a creator label
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// A memory in the graph
///
/// Identity (`id`) is immutable once assigned; everything else mutates
/// through the store's operations, which maintain the invariants (link
/// symmetry, linear supersession chains, access monotonicity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique id, `mem_<ms>_<rand6>`, never reused
    pub id: String,
    /// The textual observation; non-empty
    pub content: String,
    /// Memory type
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Short lowercase tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Event time - when the fact occurred
    pub timestamp: DateTime<Utc>,
    /// System time - when the record was written
    pub ingestion_time: DateTime<Utc>,
    /// Importance in [1, 5]; fractional after decay
    pub importance: f64,
    /// Monotonically non-decreasing retrieval counter
    pub access_count: u32,
    /// When the memory was last retrieved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    /// Optional project grouping label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Optional session grouping label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Storage layer
    #[serde(default)]
    pub layer: MemoryLayer,
    /// Visibility scope
    #[serde(default)]
    pub scope: MemoryScope,
    /// Origin
    #[serde(default)]
    pub source: MemorySource,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Start of the validity interval (event time)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    /// End of the validity interval; empty means still current
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Id of the memory this one replaced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    /// Id of the memory that replaced this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    /// Flat back-compat fan-out of linked ids
    #[serde(default)]
    pub related_memories: Vec<String>,
    /// Rich typed links
    #[serde(default)]
    pub links: Vec<MemoryLink>,
    /// Opaque context block, carried untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotional_context: Option<Value>,
    /// Opaque context block, carried untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_context: Option<Value>,
    /// Opaque context block, carried untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_agent_context: Option<Value>,
    /// Opaque context block, carried untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_context: Option<Value>,
    /// Opaque free-form metadata, carried untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Default for Memory {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            content: String::new(),
            memory_type: MemoryType::Context,
            tags: vec![],
            timestamp: now,
            ingestion_time: now,
            importance: DEFAULT_IMPORTANCE,
            access_count: 0,
            last_accessed: None,
            project: None,
            session_id: None,
            layer: MemoryLayer::LongTerm,
            scope: MemoryScope::Personal,
            source: MemorySource::Human,
            confidence: 1.0,
            valid_from: None,
            valid_until: None,
            supersedes: None,
            superseded_by: None,
            related_memories: vec![],
            links: vec![],
            emotional_context: None,
            narrative_context: None,
            multi_agent_context: None,
            social_context: None,
            metadata: None,
        }
    }
}

impl Memory {
    /// Create a new memory with the given content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Builder-style type setter. Foundational type pins the layer.
    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        if memory_type == MemoryType::Foundational {
            self.layer = MemoryLayer::Foundational;
        }
        self
    }

    /// Builder-style tag setter; tags are lowercased
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    /// Builder-style importance setter
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Builder-style project setter
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Builder-style event-time setter
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder-style source setter
    pub fn with_source(mut self, source: MemorySource) -> Self {
        self.source = source;
        self
    }

    /// Check structural validity; called by the store before any write
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(MemoryError::invalid_field("content", "must not be empty"));
        }
        if !(MIN_IMPORTANCE..=MAX_IMPORTANCE).contains(&self.importance) {
            return Err(MemoryError::invalid_field(
                "importance",
                format!(
                    "must be in [{}, {}], got {}",
                    MIN_IMPORTANCE, MAX_IMPORTANCE, self.importance
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(MemoryError::invalid_field(
                "confidence",
                format!("must be in [0, 1], got {}", self.confidence),
            ));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(MemoryError::invalid_field(
                "tags",
                format!("at most {} tags, got {}", MAX_TAGS, self.tags.len()),
            ));
        }
        if self.superseded_by.as_deref() == Some(self.id.as_str()) && !self.id.is_empty() {
            return Err(MemoryError::invalid_field(
                "superseded_by",
                "a memory cannot supersede itself",
            ));
        }
        Ok(())
    }

    /// Whether this memory is exempt from decay and deletion
    pub fn is_foundational(&self) -> bool {
        self.memory_type == MemoryType::Foundational || self.layer == MemoryLayer::Foundational
    }

    /// Whether the validity interval covers `time`
    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        let after_start = self.valid_from.map(|t| time >= t).unwrap_or(true);
        let before_end = self.valid_until.map(|t| time <= t).unwrap_or(true);
        after_start && before_end
    }

    /// Whether the memory is still current (not closed, not superseded)
    pub fn is_current(&self) -> bool {
        self.superseded_by.is_none() && self.is_valid_at(Utc::now())
    }

    /// Find a link by target and type
    pub fn find_link(&self, target_id: &str, link_type: LinkType) -> Option<&MemoryLink> {
        self.links
            .iter()
            .find(|l| l.target_id == target_id && l.link_type == link_type)
    }

    /// Append a link, keeping the `related_memories` mirror consistent.
    ///
    /// Idempotent on `(target_id, type)`; returns whether anything changed.
    pub fn push_link(&mut self, link: MemoryLink) -> bool {
        if self.find_link(&link.target_id, link.link_type).is_some() {
            return false;
        }
        if !self.related_memories.contains(&link.target_id) {
            self.related_memories.push(link.target_id.clone());
        }
        self.links.push(link);
        true
    }

    /// Remove links to `target_id`, optionally filtered by type.
    ///
    /// The `related_memories` mirror drops the id when no link remains.
    /// Returns whether anything was removed.
    pub fn drop_link(&mut self, target_id: &str, link_type: Option<LinkType>) -> bool {
        let before = self.links.len();
        self.links.retain(|l| {
            l.target_id != target_id || link_type.map(|t| l.link_type != t).unwrap_or(false)
        });
        let removed = self.links.len() < before;
        if removed && !self.links.iter().any(|l| l.target_id == target_id) {
            self.related_memories.retain(|id| id != target_id);
        }
        removed
    }

    /// Record a retrieval: bump the counter, advance `last_accessed`
    pub fn touch_access(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        match self.last_accessed {
            Some(prev) if prev >= now => {}
            _ => self.last_accessed = Some(now),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_roundtrips() {
        for mt in MemoryType::all() {
            assert_eq!(MemoryType::parse_name(mt.as_str()), *mt);
        }
        for lt in [
            LinkType::DependsOn,
            LinkType::Supports,
            LinkType::CausedBy,
            LinkType::Extends,
            LinkType::ExampleOf,
            LinkType::Supersedes,
            LinkType::Contradicts,
            LinkType::Related,
        ] {
            assert_eq!(LinkType::parse_name(lt.as_str()), lt);
        }
        assert_eq!(MemoryLayer::parse_name("short_term"), MemoryLayer::ShortTerm);
        assert_eq!(MemoryScope::parse_name("shared"), MemoryScope::Shared);
        assert_eq!(
            MemorySource::parse_name("llm_consolidated"),
            MemorySource::LlmConsolidated
        );
    }

    #[test]
    fn test_unknown_names_fall_back_to_defaults() {
        assert_eq!(MemoryType::parse_name("telepathy"), MemoryType::Context);
        assert_eq!(MemoryLayer::parse_name("medium_term"), MemoryLayer::LongTerm);
        assert_eq!(MemoryScope::parse_name("global"), MemoryScope::Personal);
        assert_eq!(MemorySource::parse_name("alien"), MemorySource::Human);
        assert_eq!(LinkType::parse_name("friends_with"), LinkType::Related);
    }

    #[test]
    fn test_validation() {
        let mut m = Memory::new("we decided to use postgres");
        assert!(m.validate().is_ok());

        m.content = "   ".to_string();
        assert!(m.validate().is_err());

        let mut m = Memory::new("x").with_importance(6.0);
        assert!(m.validate().is_err());
        m.importance = 0.5;
        assert!(m.validate().is_err());
        m.importance = 1.0;
        assert!(m.validate().is_ok());

        let mut m = Memory::new("x");
        m.confidence = 1.5;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_self_supersession_rejected() {
        let mut m = Memory::new("x");
        m.id = "mem_1_aaaaaa".to_string();
        m.superseded_by = Some("mem_1_aaaaaa".to_string());
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_foundational_type_pins_layer() {
        let m = Memory::new("I value directness").with_type(MemoryType::Foundational);
        assert_eq!(m.layer, MemoryLayer::Foundational);
        assert!(m.is_foundational());
    }

    #[test]
    fn test_push_link_idempotent_and_mirrored() {
        let mut m = Memory::new("a");
        assert!(m.push_link(MemoryLink::new("mem_2_bbbbbb", LinkType::Supports)));
        assert!(!m.push_link(MemoryLink::new("mem_2_bbbbbb", LinkType::Supports)));
        // Same target, different type is a distinct link
        assert!(m.push_link(MemoryLink::new("mem_2_bbbbbb", LinkType::Extends)));

        assert_eq!(m.links.len(), 2);
        assert_eq!(m.related_memories, vec!["mem_2_bbbbbb".to_string()]);
    }

    #[test]
    fn test_drop_link_updates_mirror() {
        let mut m = Memory::new("a");
        m.push_link(MemoryLink::new("mem_2_bbbbbb", LinkType::Supports));
        m.push_link(MemoryLink::new("mem_2_bbbbbb", LinkType::Extends));

        // Removing one type keeps the mirror entry
        assert!(m.drop_link("mem_2_bbbbbb", Some(LinkType::Supports)));
        assert!(m.related_memories.contains(&"mem_2_bbbbbb".to_string()));

        // Removing the last link clears it
        assert!(m.drop_link("mem_2_bbbbbb", None));
        assert!(m.related_memories.is_empty());

        assert!(!m.drop_link("mem_9_zzzzzz", None));
    }

    #[test]
    fn test_access_monotonicity() {
        let mut m = Memory::new("a");
        let t1 = Utc::now();
        m.touch_access(t1);
        assert_eq!(m.access_count, 1);
        assert_eq!(m.last_accessed, Some(t1));

        // An earlier clock reading never moves last_accessed backwards
        let earlier = t1 - chrono::Duration::seconds(30);
        m.touch_access(earlier);
        assert_eq!(m.access_count, 2);
        assert_eq!(m.last_accessed, Some(t1));
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let mut m = Memory::new("a");
        assert!(m.is_valid_at(now));

        m.valid_from = Some(now + chrono::Duration::days(1));
        assert!(!m.is_valid_at(now));

        m.valid_from = Some(now - chrono::Duration::days(2));
        m.valid_until = Some(now - chrono::Duration::days(1));
        assert!(!m.is_valid_at(now));
        assert!(m.is_valid_at(now - chrono::Duration::hours(30)));
    }

    #[test]
    fn test_link_strength_clamped() {
        let link = MemoryLink::new("mem_2_bbbbbb", LinkType::Related).with_strength(1.7);
        assert_eq!(link.strength, Some(1.0));
        let link = MemoryLink::new("mem_2_bbbbbb", LinkType::Related).with_strength(-0.2);
        assert_eq!(link.strength, Some(0.0));
    }
}
