//! Vector-store seam
//!
//! The vector database is an external collaborator consumed through a
//! narrow interface: add / get / query / update / delete over
//! `{id, vector, document, metadata}` tuples, with a small recursive
//! predicate language for metadata filtering.
//!
//! Two implementations live here: [`ChromaClient`] speaks the REST API of
//! a Chroma-compatible server, and [`InMemoryStore`] is an exact in-process
//! double used by tests and offline runs.

pub mod chroma;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::error::Result;

pub use chroma::ChromaClient;
pub use memory::InMemoryStore;

/// Primary collection holding memory records
pub const COLLECTION_MEMORIES: &str = "claude_memories";
/// Session records, written with a placeholder zero-vector
pub const COLLECTION_SESSIONS: &str = "claude_sessions";
/// Project contexts, written with a placeholder zero-vector
pub const COLLECTION_PROJECTS: &str = "claude_projects";

// ============================================================================
// PREDICATE LANGUAGE
// ============================================================================

/// Recursive metadata predicate.
///
/// Mirrors the store's `where` language: equality, `$in`, `$gte` and
/// `$and`. Metadata values are scalars (string/number/bool).
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    /// `{field: value}`
    Eq(String, Value),
    /// `{field: {"$in": [...]}}`
    In(String, Vec<Value>),
    /// `{field: {"$gte": n}}`
    Gte(String, f64),
    /// `{"$and": [...]}`
    And(Vec<Where>),
}

impl Where {
    /// Equality shorthand
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// Membership shorthand
    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Greater-or-equal shorthand
    pub fn gte(field: impl Into<String>, value: f64) -> Self {
        Self::Gte(field.into(), value)
    }

    /// Conjunction; a single clause collapses to itself
    pub fn and(clauses: Vec<Where>) -> Option<Self> {
        let mut clauses = clauses;
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Self::And(clauses)),
        }
    }

    /// Render as the store's JSON `where` document
    pub fn to_json(&self) -> Value {
        match self {
            Where::Eq(field, value) => json!({ field: value }),
            Where::In(field, values) => json!({ field: { "$in": values } }),
            Where::Gte(field, value) => json!({ field: { "$gte": value } }),
            Where::And(clauses) => {
                json!({ "$and": clauses.iter().map(Where::to_json).collect::<Vec<_>>() })
            }
        }
    }

    /// Evaluate against a metadata map (used by the in-memory store)
    pub fn matches(&self, meta: &Map<String, Value>) -> bool {
        match self {
            Where::Eq(field, value) => meta.get(field).map(|v| v == value).unwrap_or(false),
            Where::In(field, values) => meta
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Where::Gte(field, value) => meta
                .get(field)
                .and_then(Value::as_f64)
                .map(|v| v >= *value)
                .unwrap_or(false),
            Where::And(clauses) => clauses.iter().all(|c| c.matches(meta)),
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// A stored `{id, vector, document, metadata}` tuple
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Record id
    pub id: String,
    /// Embedding; empty means "placeholder" (sessions, projects) or
    /// "not requested" on reads
    pub embedding: Vec<f32>,
    /// Document text
    pub document: String,
    /// Flat scalar metadata
    pub metadata: Map<String, Value>,
}

/// One k-NN hit
#[derive(Debug, Clone)]
pub struct QueryHit {
    /// Record id
    pub id: String,
    /// Document text
    pub document: String,
    /// Flat scalar metadata
    pub metadata: Map<String, Value>,
    /// Cosine distance to the query (similarity = 1 - distance)
    pub distance: f32,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// The narrow vector-store interface the engine consumes.
///
/// Implementations map failures to `MemoryError::Database`, marking
/// connection/timeout/502/503 causes transient so the retry wrapper can
/// retry them.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    /// Insert records
    async fn add(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Fetch by ids and/or metadata filter.
    ///
    /// `include_embeddings` controls whether vectors are returned (they are
    /// large; most callers skip them).
    async fn get(
        &self,
        collection: &str,
        ids: Option<&[String]>,
        filter: Option<&Where>,
        limit: Option<usize>,
        include_embeddings: bool,
    ) -> Result<Vec<VectorRecord>>;

    /// k-NN query with optional metadata filter
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&Where>,
    ) -> Result<Vec<QueryHit>>;

    /// Overwrite existing records (embedding may be empty to keep the old one)
    async fn update(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Hard-delete by ids
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// Number of records in the collection
    async fn count(&self, collection: &str) -> Result<usize>;
}

// ============================================================================
// TESTS
// ============================================================================
