//! Memory store
//!
//! CRUD over memories on top of the vector-store and embedder seams, plus
//! the graph invariants the rest of the engine relies on: bidirectional
//! link maintenance, linear supersession chains, access-count updates.
//!
//! Collections are created lazily behind a one-shot latch on first use;
//! every store call is wrapped in the exponential-backoff retry policy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::embeddings::Embedder;
use crate::error::{MemoryError, Result};
use crate::ids;
use crate::memory::codec;
use crate::memory::{Memory, MemoryLink, MemoryType};
use crate::retry::{RetryPolicy, with_retry};
use crate::vector::{
    COLLECTION_MEMORIES, COLLECTION_PROJECTS, COLLECTION_SESSIONS, VectorRecord, VectorStore,
    Where,
};

// ============================================================================
// OPTIONS & RESULTS
// ============================================================================

/// Options for [`MemoryStore::save`]
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Maintain back-links on the targets of `related_memories`
    pub bidirectional_link: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            bidirectional_link: true,
        }
    }
}

/// Sort order for [`MemoryStore::list`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Newest event time first
    #[default]
    Recent,
    /// Highest importance first
    Importance,
    /// Most retrieved first
    Accessed,
}

/// Options for [`MemoryStore::list`]
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Maximum records returned
    pub limit: usize,
    /// Restrict to a project
    pub project: Option<String>,
    /// Restrict to a type
    pub memory_type: Option<MemoryType>,
    /// Sort order
    pub sort_by: SortBy,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            project: None,
            memory_type: None,
            sort_by: SortBy::Recent,
        }
    }
}

/// Partial update for [`MemoryStore::update`].
///
/// `None` fields are left untouched. `timestamp`, `ingestion_time` and
/// `access_count` are always preserved.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    /// Replace the content (triggers re-embedding)
    pub content: Option<String>,
    /// Replace the type
    pub memory_type: Option<MemoryType>,
    /// Replace the tag set
    pub tags: Option<Vec<String>>,
    /// Replace the importance
    pub importance: Option<f64>,
    /// Replace the confidence
    pub confidence: Option<f64>,
    /// Replace the project label
    pub project: Option<String>,
    /// Replace the validity start
    pub valid_from: Option<DateTime<Utc>>,
    /// Replace the validity end
    pub valid_until: Option<DateTime<Utc>>,
    /// Replace the opaque metadata block
    pub metadata: Option<serde_json::Value>,
}

/// Aggregate counts over the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Total records
    pub total: usize,
    /// Count per memory type
    pub by_type: HashMap<String, usize>,
    /// Count per project label
    pub by_project: HashMap<String, usize>,
    /// Records with event time within the last 7 days
    pub recent_count: usize,
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// CRUD and graph maintenance over the memory collections
pub struct MemoryStore {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
    init: OnceCell<()>,
}

impl MemoryStore {
    /// Create a store over the given seams
    pub fn new(vectors: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vectors,
            embedder,
            retry: RetryPolicy::default(),
            init: OnceCell::new(),
        }
    }

    /// Override the retry policy (tests use [`RetryPolicy::none`])
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The embedder this store writes with
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Lazily create the collections, once per process.
    ///
    /// Concurrent first calls await the same initialization; a failure
    /// leaves the latch empty so the next call retries.
    async fn ensure_init(&self) -> Result<()> {
        self.init
            .get_or_try_init(|| async {
                for name in [COLLECTION_MEMORIES, COLLECTION_SESSIONS, COLLECTION_PROJECTS] {
                    self.retried_ensure_collection(name).await?;
                }
                debug!("vector collections ready");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    // ------------------------------------------------------------------
    // Retried primitives
    // ------------------------------------------------------------------

    async fn retried_ensure_collection(&self, name: &'static str) -> Result<()> {
        let vectors = self.vectors.clone();
        with_retry(&self.retry, "ensure_collection", move || {
            let vectors = vectors.clone();
            async move { vectors.ensure_collection(name).await }
        })
        .await
    }

    async fn retried_add(&self, collection: &'static str, record: VectorRecord) -> Result<()> {
        let vectors = self.vectors.clone();
        with_retry(&self.retry, "add", move || {
            let vectors = vectors.clone();
            let record = record.clone();
            async move { vectors.add(collection, vec![record]).await }
        })
        .await
    }

    async fn retried_update(&self, collection: &'static str, record: VectorRecord) -> Result<()> {
        let vectors = self.vectors.clone();
        with_retry(&self.retry, "update", move || {
            let vectors = vectors.clone();
            let record = record.clone();
            async move { vectors.update(collection, vec![record]).await }
        })
        .await
    }

    async fn retried_get(
        &self,
        collection: &'static str,
        ids: Option<Vec<String>>,
        filter: Option<Where>,
        limit: Option<usize>,
        include_embeddings: bool,
    ) -> Result<Vec<VectorRecord>> {
        let vectors = self.vectors.clone();
        with_retry(&self.retry, "get", move || {
            let vectors = vectors.clone();
            let ids = ids.clone();
            let filter = filter.clone();
            async move {
                vectors
                    .get(
                        collection,
                        ids.as_deref(),
                        filter.as_ref(),
                        limit,
                        include_embeddings,
                    )
                    .await
            }
        })
        .await
    }

    async fn retried_delete(&self, collection: &'static str, ids: Vec<String>) -> Result<()> {
        let vectors = self.vectors.clone();
        with_retry(&self.retry, "delete", move || {
            let vectors = vectors.clone();
            let ids = ids.clone();
            async move { vectors.delete(collection, &ids).await }
        })
        .await
    }

    /// k-NN over the memory collection; used by the retrieval engine
    pub async fn query_memories(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: Option<Where>,
    ) -> Result<Vec<(Memory, f32)>> {
        self.ensure_init().await?;
        let vectors = self.vectors.clone();
        let embedding = embedding.to_vec();
        let hits = with_retry(&self.retry, "query", move || {
            let vectors = vectors.clone();
            let embedding = embedding.clone();
            let filter = filter.clone();
            async move {
                vectors
                    .query(COLLECTION_MEMORIES, &embedding, n_results, filter.as_ref())
                    .await
            }
        })
        .await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let memory = codec::decode(&hit.id, &hit.document, &hit.metadata);
                (memory, 1.0 - hit.distance)
            })
            .collect())
    }

    fn to_record(memory: &Memory, embedding: Vec<f32>) -> VectorRecord {
        let (document, metadata) = codec::encode(memory);
        VectorRecord {
            id: memory.id.clone(),
            embedding,
            document,
            metadata,
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Save a new memory, returning its id.
    ///
    /// Generates the id, embeds the content and writes the record. When
    /// `bidirectional_link` is set and `related_memories` is non-empty,
    /// each target gains a back-reference; failures there are logged and
    /// swallowed - the primary save still succeeds.
    pub async fn save(&self, mut memory: Memory, options: SaveOptions) -> Result<String> {
        self.ensure_init().await?;
        if memory.id.is_empty() {
            memory.id = ids::new_memory_id();
        }
        memory.validate()?;

        let embedding = self.embedder.embed(&memory.content).await?;
        self.retried_add(COLLECTION_MEMORIES, Self::to_record(&memory, embedding))
            .await?;
        debug!(id = %memory.id, memory_type = %memory.memory_type, "memory saved");

        if options.bidirectional_link && !memory.related_memories.is_empty() {
            for target_id in memory.related_memories.clone() {
                if let Err(err) = self.backlink(&target_id, &memory.id).await {
                    warn!(
                        source = %memory.id,
                        target = %target_id,
                        error = %err,
                        "bidirectional link failed"
                    );
                }
            }
        }

        Ok(memory.id)
    }

    /// Add `source_id` to `target_id.related_memories` unless already present
    async fn backlink(&self, target_id: &str, source_id: &str) -> Result<()> {
        let Some(mut target) = self.get_raw(target_id).await? else {
            return Err(MemoryError::not_found("memory", target_id));
        };
        if target.related_memories.iter().any(|id| id == source_id) {
            return Ok(());
        }
        target.related_memories.push(source_id.to_string());
        self.retried_update(COLLECTION_MEMORIES, Self::to_record(&target, vec![]))
            .await
    }

    /// Fetch a memory and record the access.
    ///
    /// Increments `access_count` and advances `last_accessed`, writing
    /// back best-effort, and returns the post-increment view. Not
    /// idempotent by design; use [`MemoryStore::get_raw`] for reads that
    /// must not count.
    pub async fn get(&self, id: &str) -> Result<Option<Memory>> {
        let Some(mut memory) = self.get_raw(id).await? else {
            return Ok(None);
        };
        memory.touch_access(Utc::now());
        if let Err(err) = self
            .retried_update(COLLECTION_MEMORIES, Self::to_record(&memory, vec![]))
            .await
        {
            warn!(id, error = %err, "access update failed");
        }
        Ok(Some(memory))
    }

    /// Fetch a memory without touching access counters
    pub async fn get_raw(&self, id: &str) -> Result<Option<Memory>> {
        self.ensure_init().await?;
        let records = self
            .retried_get(
                COLLECTION_MEMORIES,
                Some(vec![id.to_string()]),
                None,
                None,
                false,
            )
            .await?;
        Ok(records
            .first()
            .map(|r| codec::decode(&r.id, &r.document, &r.metadata)))
    }

    /// Apply a partial update.
    ///
    /// Re-embeds only when the content changed. `valid_from` defaults to
    /// the event time when still unset after the patch.
    pub async fn update(&self, id: &str, patch: MemoryPatch) -> Result<()> {
        let Some(mut memory) = self.get_raw(id).await? else {
            return Err(MemoryError::not_found("memory", id));
        };

        let content_changed = patch
            .content
            .as_ref()
            .map(|c| *c != memory.content)
            .unwrap_or(false);

        if let Some(content) = patch.content {
            memory.content = content;
        }
        if let Some(memory_type) = patch.memory_type {
            memory.memory_type = memory_type;
        }
        if let Some(tags) = patch.tags {
            memory.tags = tags.into_iter().map(|t| t.to_lowercase()).collect();
        }
        if let Some(importance) = patch.importance {
            memory.importance = importance;
        }
        if let Some(confidence) = patch.confidence {
            memory.confidence = confidence;
        }
        if let Some(project) = patch.project {
            memory.project = Some(project);
        }
        if let Some(valid_from) = patch.valid_from {
            memory.valid_from = Some(valid_from);
        }
        if let Some(valid_until) = patch.valid_until {
            memory.valid_until = Some(valid_until);
        }
        if let Some(metadata) = patch.metadata {
            memory.metadata = Some(metadata);
        }
        if memory.valid_from.is_none() {
            memory.valid_from = Some(memory.timestamp);
        }
        memory.validate()?;

        let embedding = if content_changed {
            self.embedder.embed(&memory.content).await?
        } else {
            vec![]
        };
        self.retried_update(COLLECTION_MEMORIES, Self::to_record(&memory, embedding))
            .await
    }

    /// Close `old_id` and chain it to `new_id`.
    ///
    /// Sets `old.superseded_by`, `old.valid_until = now`, `new.supersedes`
    /// and `new.valid_from = now`. Both sides are written; a failure after
    /// the first write surfaces so callers can retry the operation.
    pub async fn supersede(&self, old_id: &str, new_id: &str) -> Result<()> {
        if old_id == new_id {
            return Err(MemoryError::invalid_field(
                "superseded_by",
                "a memory cannot supersede itself",
            ));
        }
        let Some(mut old) = self.get_raw(old_id).await? else {
            return Err(MemoryError::not_found("memory", old_id));
        };
        let Some(mut new) = self.get_raw(new_id).await? else {
            return Err(MemoryError::not_found("memory", new_id));
        };

        let now = Utc::now();
        old.superseded_by = Some(new_id.to_string());
        old.valid_until = Some(now);
        new.supersedes = Some(old_id.to_string());
        new.valid_from = Some(now);

        self.retried_update(COLLECTION_MEMORIES, Self::to_record(&old, vec![]))
            .await?;
        self.retried_update(COLLECTION_MEMORIES, Self::to_record(&new, vec![]))
            .await?;
        debug!(old = old_id, new = new_id, "supersession recorded");
        Ok(())
    }

    /// Hard-delete a memory.
    ///
    /// Foundational protection is the policy engine's job, not this
    /// primitive's.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_init().await?;
        self.retried_delete(COLLECTION_MEMORIES, vec![id.to_string()])
            .await
    }

    /// List memories without touching access counters
    pub async fn list(&self, options: ListOptions) -> Result<Vec<Memory>> {
        self.ensure_init().await?;
        let mut clauses = vec![];
        if let Some(project) = &options.project {
            clauses.push(Where::eq("project", project.as_str()));
        }
        if let Some(memory_type) = options.memory_type {
            clauses.push(Where::eq("type", memory_type.as_str()));
        }
        let filter = Where::and(clauses);

        let records = self
            .retried_get(COLLECTION_MEMORIES, None, filter, None, false)
            .await?;
        let mut memories: Vec<Memory> = records
            .iter()
            .map(|r| codec::decode(&r.id, &r.document, &r.metadata))
            .collect();

        match options.sort_by {
            SortBy::Recent => memories.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            SortBy::Importance => memories.sort_by(|a, b| {
                b.importance
                    .partial_cmp(&a.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.timestamp.cmp(&a.timestamp))
            }),
            SortBy::Accessed => memories.sort_by(|a, b| {
                b.access_count
                    .cmp(&a.access_count)
                    .then_with(|| b.timestamp.cmp(&a.timestamp))
            }),
        }
        memories.truncate(options.limit);
        Ok(memories)
    }

    /// Dump the full memory set, optionally with embeddings.
    ///
    /// The dream and enrichment engines operate on this snapshot.
    pub async fn dump(&self, include_embeddings: bool) -> Result<Vec<(Memory, Vec<f32>)>> {
        self.ensure_init().await?;
        let records = self
            .retried_get(COLLECTION_MEMORIES, None, None, None, include_embeddings)
            .await?;
        Ok(records
            .into_iter()
            .map(|r| {
                let memory = codec::decode(&r.id, &r.document, &r.metadata);
                (memory, r.embedding)
            })
            .collect())
    }

    /// Attach a rich link to `source_id`.
    ///
    /// Idempotent on `(target_id, type)`; keeps the `related_memories`
    /// mirror consistent.
    pub async fn add_link(&self, source_id: &str, link: MemoryLink) -> Result<()> {
        let Some(mut source) = self.get_raw(source_id).await? else {
            return Err(MemoryError::not_found("memory", source_id));
        };
        if !source.push_link(link) {
            return Ok(());
        }
        self.retried_update(COLLECTION_MEMORIES, Self::to_record(&source, vec![]))
            .await
    }

    /// Remove links from `source_id` to `target_id`, optionally narrowed
    /// by type. Returns whether anything was removed.
    pub async fn remove_link(
        &self,
        source_id: &str,
        target_id: &str,
        link_type: Option<crate::memory::LinkType>,
    ) -> Result<bool> {
        let Some(mut source) = self.get_raw(source_id).await? else {
            return Err(MemoryError::not_found("memory", source_id));
        };
        if !source.drop_link(target_id, link_type) {
            return Ok(false);
        }
        self.retried_update(COLLECTION_MEMORIES, Self::to_record(&source, vec![]))
            .await?;
        Ok(true)
    }

    /// Aggregate counts over the store
    pub async fn stats(&self) -> Result<MemoryStats> {
        let memories = self.dump(false).await?;
        let week_ago = Utc::now() - Duration::days(7);

        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut by_project: HashMap<String, usize> = HashMap::new();
        let mut recent_count = 0;
        for (memory, _) in &memories {
            *by_type
                .entry(memory.memory_type.as_str().to_string())
                .or_default() += 1;
            if let Some(project) = &memory.project {
                *by_project.entry(project.clone()).or_default() += 1;
            }
            if memory.timestamp >= week_ago {
                recent_count += 1;
            }
        }

        Ok(MemoryStats {
            total: memories.len(),
            by_type,
            by_project,
            recent_count,
        })
    }

    /// Rebuild link symmetry across the whole store.
    ///
    /// For every rich link `A -> B`, ensure `B.related_memories` carries
    /// `A`. Returns the number of back-links added.
    pub async fn repair_links(&self) -> Result<usize> {
        let memories = self.dump(false).await?;
        let mut by_id: HashMap<String, Memory> =
            memories.into_iter().map(|(m, _)| (m.id.clone(), m)).collect();

        let mut fixes: Vec<(String, String)> = vec![];
        for memory in by_id.values() {
            for link in &memory.links {
                if let Some(target) = by_id.get(&link.target_id) {
                    if !target.related_memories.contains(&memory.id) {
                        fixes.push((link.target_id.clone(), memory.id.clone()));
                    }
                }
            }
        }

        let repaired = fixes.len();
        for (target_id, source_id) in fixes {
            if let Some(target) = by_id.get_mut(&target_id) {
                if !target.related_memories.contains(&source_id) {
                    target.related_memories.push(source_id);
                    self.retried_update(COLLECTION_MEMORIES, Self::to_record(target, vec![]))
                        .await?;
                }
            }
        }
        if repaired > 0 {
            debug!(repaired, "link symmetry repaired");
        }
        Ok(repaired)
    }

    // ------------------------------------------------------------------
    // Session / project records
    // ------------------------------------------------------------------

    /// Upsert a session record (placeholder vector)
    pub async fn record_session(
        &self,
        session_id: &str,
        summary: &str,
        project: Option<&str>,
    ) -> Result<()> {
        self.ensure_init().await?;
        let mut metadata = serde_json::Map::new();
        metadata.insert("last_active".into(), json!(Utc::now().to_rfc3339()));
        if let Some(project) = project {
            metadata.insert("project".into(), json!(project));
        }
        let record = VectorRecord {
            id: session_id.to_string(),
            embedding: vec![0.0; self.embedder.dimensions()],
            document: summary.to_string(),
            metadata,
        };

        let existing = self
            .retried_get(
                COLLECTION_SESSIONS,
                Some(vec![session_id.to_string()]),
                None,
                None,
                false,
            )
            .await?;
        if existing.is_empty() {
            self.retried_add(COLLECTION_SESSIONS, record).await
        } else {
            self.retried_update(COLLECTION_SESSIONS, record).await
        }
    }

    /// Upsert a project context record (placeholder vector)
    pub async fn record_project(&self, name: &str, description: &str) -> Result<()> {
        self.ensure_init().await?;
        let mut metadata = serde_json::Map::new();
        metadata.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
        let record = VectorRecord {
            id: format!("proj_{}", name.to_lowercase().replace(' ', "_")),
            embedding: vec![0.0; self.embedder.dimensions()],
            document: description.to_string(),
            metadata,
        };

        let existing = self
            .retried_get(
                COLLECTION_PROJECTS,
                Some(vec![record.id.clone()]),
                None,
                None,
                false,
            )
            .await?;
        if existing.is_empty() {
            self.retried_add(COLLECTION_PROJECTS, record).await
        } else {
            self.retried_update(COLLECTION_PROJECTS, record).await
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LinkType;
    use crate::vector::InMemoryStore;
    use async_trait::async_trait;

    /// Deterministic bag-of-words embedder for tests
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; 32];
            for word in text.to_lowercase().split_whitespace() {
                let mut h: u32 = 2166136261;
                for b in word.bytes() {
                    h = (h ^ b as u32).wrapping_mul(16777619);
                }
                v[(h % 32) as usize] += 1.0;
            }
            Ok(crate::embeddings::normalize(&v))
        }

        fn dimensions(&self) -> usize {
            32
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(InMemoryStore::new()), Arc::new(StubEmbedder))
            .with_retry_policy(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_roundtrips() {
        let store = store();
        let memory = Memory::new("we decided to use postgres")
            .with_type(MemoryType::Decision)
            .with_tags(["database"]);
        let id = store.save(memory, SaveOptions::default()).await.unwrap();
        assert!(id.starts_with("mem_"));

        let got = store.get_raw(&id).await.unwrap().unwrap();
        assert_eq!(got.content, "we decided to use postgres");
        assert_eq!(got.memory_type, MemoryType::Decision);
        assert_eq!(got.access_count, 0);
    }

    #[tokio::test]
    async fn test_save_rejects_empty_content() {
        let store = store();
        let err = store
            .save(Memory::new("   "), SaveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_get_counts_access_get_raw_does_not() {
        let store = store();
        let id = store
            .save(Memory::new("observe me"), SaveOptions::default())
            .await
            .unwrap();

        let first = store.get(&id).await.unwrap().unwrap();
        assert_eq!(first.access_count, 1);
        assert!(first.last_accessed.is_some());

        let second = store.get(&id).await.unwrap().unwrap();
        assert_eq!(second.access_count, 2);

        let raw = store.get_raw(&id).await.unwrap().unwrap();
        assert_eq!(raw.access_count, 2);
    }

    #[tokio::test]
    async fn test_get_miss_returns_none() {
        let store = store();
        assert!(store.get("mem_0_nothere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bidirectional_link_on_save() {
        let store = store();
        let target_id = store
            .save(Memory::new("original fact"), SaveOptions::default())
            .await
            .unwrap();

        let mut memory = Memory::new("follow-up fact");
        memory.related_memories.push(target_id.clone());
        let source_id = store.save(memory, SaveOptions::default()).await.unwrap();

        let target = store.get_raw(&target_id).await.unwrap().unwrap();
        assert!(target.related_memories.contains(&source_id));
    }

    #[tokio::test]
    async fn test_bidirectional_link_failure_is_swallowed() {
        let store = store();
        let mut memory = Memory::new("points at a ghost");
        memory.related_memories.push("mem_0_ghost1".to_string());
        // Save still succeeds even though the target does not exist
        let id = store.save(memory, SaveOptions::default()).await.unwrap();
        assert!(store.get_raw(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_patches_and_preserves() {
        let store = store();
        let id = store
            .save(
                Memory::new("old words").with_importance(2.0),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        store.get(&id).await.unwrap(); // access_count -> 1
        let before = store.get_raw(&id).await.unwrap().unwrap();

        store
            .update(
                &id,
                MemoryPatch {
                    content: Some("new words entirely".to_string()),
                    importance: Some(4.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let after = store.get_raw(&id).await.unwrap().unwrap();
        assert_eq!(after.content, "new words entirely");
        assert_eq!(after.importance, 4.0);
        assert_eq!(after.access_count, before.access_count);
        assert_eq!(after.timestamp, before.timestamp);
        assert_eq!(after.ingestion_time, before.ingestion_time);
        // valid_from defaulted to the event time
        assert_eq!(after.valid_from, Some(before.timestamp));
    }

    #[tokio::test]
    async fn test_update_missing_errors() {
        let store = store();
        let err = store
            .update("mem_0_ghost1", MemoryPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_supersede_sets_both_sides() {
        let store = store();
        let old_id = store
            .save(Memory::new("we use mongodb"), SaveOptions::default())
            .await
            .unwrap();
        let new_id = store
            .save(Memory::new("we switched to postgres"), SaveOptions::default())
            .await
            .unwrap();

        store.supersede(&old_id, &new_id).await.unwrap();

        let old = store.get_raw(&old_id).await.unwrap().unwrap();
        let new = store.get_raw(&new_id).await.unwrap().unwrap();
        assert_eq!(old.superseded_by.as_deref(), Some(new_id.as_str()));
        assert!(old.valid_until.is_some());
        assert_eq!(new.supersedes.as_deref(), Some(old_id.as_str()));
        assert!(new.valid_from.is_some());
    }

    #[tokio::test]
    async fn test_supersede_self_rejected() {
        let store = store();
        let id = store
            .save(Memory::new("loop"), SaveOptions::default())
            .await
            .unwrap();
        assert!(store.supersede(&id, &id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_removes() {
        let store = store();
        let id = store
            .save(Memory::new("ephemeral"), SaveOptions::default())
            .await
            .unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.get_raw(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let store = store();
        for (content, importance, project) in [
            ("low note", 2.0, "alpha"),
            ("high note", 5.0, "alpha"),
            ("other project", 4.0, "beta"),
        ] {
            store
                .save(
                    Memory::new(content)
                        .with_importance(importance)
                        .with_project(project),
                    SaveOptions::default(),
                )
                .await
                .unwrap();
        }

        let listed = store
            .list(ListOptions {
                project: Some("alpha".to_string()),
                sort_by: SortBy::Importance,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "high note");
    }

    #[tokio::test]
    async fn test_add_link_idempotent_and_remove() {
        let store = store();
        let a = store
            .save(Memory::new("alpha"), SaveOptions::default())
            .await
            .unwrap();
        let b = store
            .save(Memory::new("beta"), SaveOptions::default())
            .await
            .unwrap();

        store
            .add_link(&a, MemoryLink::new(&b, LinkType::Supports))
            .await
            .unwrap();
        store
            .add_link(&a, MemoryLink::new(&b, LinkType::Supports))
            .await
            .unwrap();

        let got = store.get_raw(&a).await.unwrap().unwrap();
        assert_eq!(got.links.len(), 1);
        assert!(got.related_memories.contains(&b));

        assert!(store.remove_link(&a, &b, None).await.unwrap());
        assert!(!store.remove_link(&a, &b, None).await.unwrap());
        let got = store.get_raw(&a).await.unwrap().unwrap();
        assert!(got.links.is_empty());
        assert!(got.related_memories.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = store();
        store
            .save(
                Memory::new("d1").with_type(MemoryType::Decision).with_project("p"),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        store
            .save(
                Memory::new("d2").with_type(MemoryType::Decision),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        let mut old = Memory::new("ancient");
        old.timestamp = Utc::now() - Duration::days(30);
        store.save(old, SaveOptions::default()).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_type.get("decision"), Some(&2));
        assert_eq!(stats.by_project.get("p"), Some(&1));
        assert_eq!(stats.recent_count, 2);
    }

    #[tokio::test]
    async fn test_repair_links_rebuilds_mirror() {
        let store = store();
        let a = store
            .save(Memory::new("alpha"), SaveOptions::default())
            .await
            .unwrap();
        let b = store
            .save(Memory::new("beta"), SaveOptions::default())
            .await
            .unwrap();
        // add_link writes only the source side; the repair pass owes the
        // target its back-reference
        store
            .add_link(&a, MemoryLink::new(&b, LinkType::Related))
            .await
            .unwrap();

        let repaired = store.repair_links().await.unwrap();
        assert_eq!(repaired, 1);
        let target = store.get_raw(&b).await.unwrap().unwrap();
        assert!(target.related_memories.contains(&a));

        // Second pass finds nothing to fix
        assert_eq!(store.repair_links().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_session_and_project_records_upsert() {
        let store = store();
        store
            .record_session("sess_1_abc123", "worked on auth", Some("backend"))
            .await
            .unwrap();
        // Second write must update, not duplicate
        store
            .record_session("sess_1_abc123", "worked on auth and billing", None)
            .await
            .unwrap();
        store
            .record_project("backend", "API server for the product")
            .await
            .unwrap();
    }
}
