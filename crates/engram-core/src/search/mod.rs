//! Retrieval engine
//!
//! Hybrid search over the memory store:
//!
//! 1. Embed the query (memoized in an LRU cache) and over-fetch 2x the
//!    limit from the vector store with a pushed-down metadata predicate
//! 2. Filter tags in-process (the store's contains-operator is unreliable)
//! 3. Rescale by time decay, importance boost and access boost
//! 4. Optionally blend in BM25 and graph-distance components
//! 5. Optionally append graph-neighbor expansions below the main results
//!
//! Search never writes; concurrent calls are safe.

pub mod bm25;

use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::memory::{Memory, MemoryType};
use crate::store::{ListOptions, MemoryStore, SortBy};
use crate::vector::Where;

use bm25::Bm25;

/// Capacity of the query-embedding cache
const QUERY_CACHE_SIZE: usize = 100;

// ============================================================================
// OPTIONS
// ============================================================================

/// Weights and bounds for hybrid scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Weight of the raw semantic similarity
    pub semantic_weight: f64,
    /// Weight of the BM25 lexical score
    pub bm25_weight: f64,
    /// Weight of the graph-distance boost
    pub graph_weight: f64,
    /// Maximum link distance considered for the graph boost
    pub graph_max_distance: usize,
    /// How many recent same-project memories feed the BM25 corpus
    pub corpus_limit: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.6,
            bm25_weight: 0.3,
            graph_weight: 0.1,
            graph_max_distance: 2,
            corpus_limit: 500,
        }
    }
}

/// Options for [`RetrievalEngine::search`]
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum main results
    pub limit: usize,
    /// Restrict to these types (pushed down to the store)
    pub types: Option<Vec<MemoryType>>,
    /// Keep only memories sharing at least one of these tags
    pub tags: Option<Vec<String>>,
    /// Restrict to a project (pushed down)
    pub project: Option<String>,
    /// Minimum importance (pushed down)
    pub min_importance: Option<f64>,
    /// Skip the decay rescale even when decay is enabled
    pub include_decayed: bool,
    /// Blend BM25 and graph components into the score
    pub use_hybrid: bool,
    /// Hybrid weights
    pub hybrid: HybridConfig,
    /// Append link-neighbors of the top results
    pub expand_graph: bool,
    /// Maximum appended neighbors
    pub graph_expansion_limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            types: None,
            tags: None,
            project: None,
            min_importance: None,
            include_decayed: false,
            use_hybrid: false,
            hybrid: HybridConfig::default(),
            expand_graph: false,
            graph_expansion_limit: 3,
        }
    }
}

/// How a result entered the set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Scored by the main pipeline
    Semantic,
    /// Appended as a link-neighbor of a top result
    GraphExpansion,
}

/// A memory with its final retrieval score
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    /// The retrieved memory
    pub memory: Memory,
    /// Final score after all rescaling
    pub score: f32,
    /// How the result entered the set
    pub match_kind: MatchKind,
}

/// Decay applied at retrieval time
#[derive(Debug, Clone)]
pub struct RetrievalDecay {
    /// Whether retrieval rescales by age at all
    pub enabled: bool,
    /// Half-life in days for the age factor
    pub half_life_days: f64,
}

impl Default for RetrievalDecay {
    fn default() -> Self {
        Self {
            enabled: true,
            half_life_days: 30.0,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Read-only hybrid retrieval over a [`MemoryStore`]
pub struct RetrievalEngine {
    store: Arc<MemoryStore>,
    decay: RetrievalDecay,
    /// Query embeddings are memoized; repeated queries skip the embedder
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl RetrievalEngine {
    /// Create an engine with default decay settings
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self::with_decay(store, RetrievalDecay::default())
    }

    /// Create an engine with explicit decay settings
    pub fn with_decay(store: Arc<MemoryStore>, decay: RetrievalDecay) -> Self {
        Self {
            store,
            decay,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        }
    }

    /// Search the store, returning scored memories best-first.
    ///
    /// The main results are truncated to `opts.limit`; graph expansions,
    /// when requested, are appended after them with a fixed low score.
    pub async fn search(&self, query: &str, opts: SearchOptions) -> Result<Vec<ScoredMemory>> {
        let embedding = self.embed_query(query).await?;

        // Over-fetch so in-process filters have something to drop
        let filter = Self::build_filter(&opts);
        let fetched = self
            .store
            .query_memories(&embedding, opts.limit * 2, filter)
            .await?;

        let mut candidates: Vec<ScoredMemory> = fetched
            .into_iter()
            .map(|(memory, similarity)| ScoredMemory {
                memory,
                score: similarity,
                match_kind: MatchKind::Semantic,
            })
            .collect();

        if let Some(tags) = &opts.tags {
            let wanted: HashSet<&str> = tags.iter().map(String::as_str).collect();
            candidates.retain(|c| c.memory.tags.iter().any(|t| wanted.contains(t.as_str())));
        }

        if self.decay.enabled && !opts.include_decayed {
            let now = Utc::now();
            for candidate in &mut candidates {
                candidate.score =
                    Self::decayed_score(candidate.score, &candidate.memory, now, &self.decay);
            }
        }

        if opts.use_hybrid {
            self.apply_hybrid(query, &mut candidates, &opts).await?;
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.ingestion_time.cmp(&a.memory.ingestion_time))
        });
        candidates.truncate(opts.limit);

        if opts.expand_graph {
            let expansions = self.expand_neighbors(&candidates, &opts).await?;
            candidates.extend(expansions);
        }

        debug!(query, results = candidates.len(), "search complete");
        Ok(candidates)
    }

    // ------------------------------------------------------------------
    // Pipeline stages
    // ------------------------------------------------------------------

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.query_cache.lock().await.get(query) {
            return Ok(hit.clone());
        }
        let embedding = self.store.embedder().embed(query).await?;
        self.query_cache
            .lock()
            .await
            .put(query.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn build_filter(opts: &SearchOptions) -> Option<Where> {
        let mut clauses = vec![];
        if let Some(types) = &opts.types {
            clauses.push(Where::is_in(
                "type",
                types.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            ));
        }
        if let Some(project) = &opts.project {
            clauses.push(Where::eq("project", project.as_str()));
        }
        if let Some(min) = opts.min_importance {
            clauses.push(Where::gte("importance", min));
        }
        Where::and(clauses)
    }

    /// Decay rescale: `score * age_decay * importance_boost + access_boost`
    fn decayed_score(
        score: f32,
        memory: &Memory,
        now: chrono::DateTime<Utc>,
        decay: &RetrievalDecay,
    ) -> f32 {
        let age_days = (now - memory.timestamp).num_seconds().max(0) as f64 / 86_400.0;
        let age_decay = 0.5f64.powf(age_days / decay.half_life_days);
        let importance_boost = 1.0 + (memory.importance - 3.0) * 0.1;
        let access_boost = (memory.access_count as f64 * 0.02).min(0.2);
        (score as f64 * age_decay * importance_boost + access_boost) as f32
    }

    async fn apply_hybrid(
        &self,
        query: &str,
        candidates: &mut [ScoredMemory],
        opts: &SearchOptions,
    ) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }

        // Recent same-project memories are the lexical + graph context
        let corpus = self
            .store
            .list(ListOptions {
                limit: opts.hybrid.corpus_limit,
                project: opts.project.clone(),
                memory_type: None,
                sort_by: SortBy::Recent,
            })
            .await?;

        let corpus_docs: Vec<&str> = corpus.iter().map(|m| m.content.as_str()).collect();
        let bm25 = Bm25::new(&corpus_docs);
        let raw_bm25: Vec<f64> = candidates
            .iter()
            .map(|c| bm25.score(query, &c.memory.content))
            .collect();
        let max_bm25 = raw_bm25.iter().cloned().fold(0.0f64, f64::max).max(1e-9);

        let adjacency = Self::build_adjacency(candidates, &corpus);
        let candidate_ids: HashSet<String> =
            candidates.iter().map(|c| c.memory.id.clone()).collect();

        for (i, candidate) in candidates.iter_mut().enumerate() {
            let graph = Self::graph_boost(
                &candidate.memory.id,
                &candidate_ids,
                &adjacency,
                opts.hybrid.graph_max_distance,
            );
            let semantic = candidate.score as f64;
            let lexical = raw_bm25[i] / max_bm25;
            candidate.score = (opts.hybrid.semantic_weight * semantic
                + opts.hybrid.bm25_weight * lexical
                + opts.hybrid.graph_weight * graph) as f32;
        }
        Ok(())
    }

    /// Undirected link adjacency over candidates plus the corpus
    fn build_adjacency(
        candidates: &[ScoredMemory],
        corpus: &[Memory],
    ) -> HashMap<String, Vec<String>> {
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut add_edge = |a: &str, b: &str| {
            adjacency
                .entry(a.to_string())
                .or_default()
                .push(b.to_string());
            adjacency
                .entry(b.to_string())
                .or_default()
                .push(a.to_string());
        };
        for memory in candidates
            .iter()
            .map(|c| &c.memory)
            .chain(corpus.iter())
        {
            for link in &memory.links {
                add_edge(&memory.id, &link.target_id);
            }
            for related in &memory.related_memories {
                add_edge(&memory.id, related);
            }
        }
        adjacency
    }

    /// 1/d for the closest other candidate within `max_distance`, else 0
    fn graph_boost(
        start: &str,
        candidate_ids: &HashSet<String>,
        adjacency: &HashMap<String, Vec<String>>,
        max_distance: usize,
    ) -> f64 {
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut frontier: VecDeque<(&str, usize)> = VecDeque::from([(start, 0)]);

        while let Some((node, distance)) = frontier.pop_front() {
            if distance >= max_distance {
                continue;
            }
            let Some(neighbors) = adjacency.get(node) else {
                continue;
            };
            for neighbor in neighbors {
                if !visited.insert(neighbor.as_str()) {
                    continue;
                }
                let d = distance + 1;
                if candidate_ids.contains(neighbor.as_str()) {
                    return 1.0 / d as f64;
                }
                frontier.push_back((neighbor.as_str(), d));
            }
        }
        0.0
    }

    /// Fetch immediate neighbors of the results, fixed score 0.1
    async fn expand_neighbors(
        &self,
        results: &[ScoredMemory],
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredMemory>> {
        let in_set: HashSet<&str> = results.iter().map(|r| r.memory.id.as_str()).collect();
        let mut neighbor_ids: Vec<String> = vec![];
        let mut seen: HashSet<String> = HashSet::new();

        for result in results {
            for id in result
                .memory
                .links
                .iter()
                .map(|l| l.target_id.as_str())
                .chain(result.memory.related_memories.iter().map(String::as_str))
            {
                if in_set.contains(id) || !seen.insert(id.to_string()) {
                    continue;
                }
                neighbor_ids.push(id.to_string());
                if neighbor_ids.len() >= opts.graph_expansion_limit {
                    break;
                }
            }
            if neighbor_ids.len() >= opts.graph_expansion_limit {
                break;
            }
        }

        let mut expansions = vec![];
        for id in neighbor_ids {
            if let Some(memory) = self.store.get_raw(&id).await? {
                expansions.push(ScoredMemory {
                    memory,
                    score: 0.1,
                    match_kind: MatchKind::GraphExpansion,
                });
            }
        }
        Ok(expansions)
    }
}

// ============================================================================
// TESTS
// ============================================================================
