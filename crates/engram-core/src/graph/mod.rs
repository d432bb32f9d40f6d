//! Graph enrichment
//!
//! Offline pass over the full memory set with embeddings:
//!
//! 1. Cosine k-NN per memory (top-k above a similarity floor)
//! 2. Union-Find clustering over the high-similarity edges
//! 3. Centrality scoring with a cross-cluster bonus
//! 4. Highway identification (the top bridges between clusters)
//! 5. Typed link inference over the retained edges
//!
//! The engine proposes; it never writes. Callers route accepted proposals
//! through the store's `add_link`, usually gated by the trust policy.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::embeddings::cosine_similarity;
use crate::memory::{LinkType, Memory, MemoryLink, MemoryType};

/// Phrases that mark newer content as replacing older content
const REPLACEMENT_PHRASES: &[&str] = &[
    "replaced",
    "updated",
    "instead of",
    "no longer",
    "switched to",
    "migrated to",
];

/// Phrases that mark content as an example
const EXAMPLE_PHRASES: &[&str] = &["for example", "e.g.", "for instance"];

/// Longer-by-half counts as "significantly longer" for `extends`
const EXTENDS_LENGTH_RATIO: f64 = 1.5;

/// Minimum word overlap for "references" checks
const REFERENCE_OVERLAP: f64 = 0.3;

// ============================================================================
// CONFIG & OUTPUT
// ============================================================================

/// Tunables for an enrichment pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Neighbors retained per memory
    pub top_k: usize,
    /// Similarity floor for any retained edge
    pub min_similarity: f32,
    /// Similarity floor for clustering edges
    pub cluster_threshold: f32,
    /// Centrality bonus per cross-cluster neighbor
    pub cross_cluster_bonus: f64,
    /// Strongest proposed links kept per memory
    pub max_links_per_memory: usize,
    /// Highways are the top N by centrality, N = min(cap, fraction of set)
    pub highway_cap: usize,
    /// Fraction of the memory set eligible as highways
    pub highway_fraction: f64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.5,
            cluster_threshold: 0.7,
            cross_cluster_bonus: 0.5,
            max_links_per_memory: 5,
            highway_cap: 10,
            highway_fraction: 0.05,
        }
    }
}

/// A retained k-NN edge between two memories (indices into the input)
#[derive(Debug, Clone)]
pub struct NeighborEdge {
    /// Source index
    pub source: usize,
    /// Target index
    pub target: usize,
    /// Cosine similarity of the pair
    pub similarity: f32,
}

/// A memory acting as a bridge between clusters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Highway {
    /// Memory id
    pub memory_id: String,
    /// Centrality score it earned
    pub centrality: f64,
    /// Neighbors in other clusters
    pub cross_cluster_neighbors: usize,
}

/// A link the engine suggests persisting
#[derive(Debug, Clone)]
pub struct ProposedLink {
    /// Memory the link starts from
    pub source_id: String,
    /// The link itself (target, type, strength)
    pub link: MemoryLink,
    /// Raw similarity the proposal came from
    pub similarity: f32,
}

/// Output of an enrichment pass
#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    /// Cluster id per input index
    pub cluster_of: Vec<usize>,
    /// Number of distinct clusters
    pub cluster_count: usize,
    /// Bridge memories, strongest first
    pub highways: Vec<Highway>,
    /// Typed links to consider persisting
    pub proposed_links: Vec<ProposedLink>,
}

// ============================================================================
// UNION-FIND
// ============================================================================

/// Union-Find with path compression and union by size
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cursor = x;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}

// ============================================================================
// ENRICHER
// ============================================================================

/// The enrichment engine; stateless apart from its config
#[derive(Debug, Clone, Default)]
pub struct GraphEnricher {
    config: EnrichmentConfig,
}

impl GraphEnricher {
    /// Create with default tunables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with explicit tunables
    pub fn with_config(config: EnrichmentConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Run the full pass over `(memory, embedding)` pairs.
    ///
    /// Entries with empty embeddings take part in nothing and land in
    /// singleton clusters.
    pub fn enrich(&self, inputs: &[(Memory, Vec<f32>)]) -> EnrichmentReport {
        let n = inputs.len();
        if n == 0 {
            return EnrichmentReport::default();
        }

        let edges = self.knn_edges(inputs);
        let cluster_of = self.cluster(n, &edges);
        let cluster_count = cluster_of.iter().collect::<HashSet<_>>().len();
        let (centrality, cross_counts) = self.centrality(n, &edges, &cluster_of);
        let highways = self.highways(inputs, &centrality, &cross_counts);
        let proposed_links = self.infer_links(inputs, &edges);

        EnrichmentReport {
            cluster_of,
            cluster_count,
            highways,
            proposed_links,
        }
    }

    // ------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------

    /// Top-k cosine neighbors per memory above the similarity floor.
    ///
    /// Edges are directional here (each memory keeps its own top-k); the
    /// clustering stage treats them as undirected.
    fn knn_edges(&self, inputs: &[(Memory, Vec<f32>)]) -> Vec<NeighborEdge> {
        let mut edges = vec![];
        for (i, (_, embedding_i)) in inputs.iter().enumerate() {
            if embedding_i.is_empty() {
                continue;
            }
            let mut neighbors: Vec<(usize, f32)> = inputs
                .iter()
                .enumerate()
                .filter(|(j, (_, embedding_j))| *j != i && !embedding_j.is_empty())
                .map(|(j, (_, embedding_j))| (j, cosine_similarity(embedding_i, embedding_j)))
                .filter(|(_, similarity)| *similarity >= self.config.min_similarity)
                .collect();
            neighbors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            neighbors.truncate(self.config.top_k);
            edges.extend(neighbors.into_iter().map(|(j, similarity)| NeighborEdge {
                source: i,
                target: j,
                similarity,
            }));
        }
        edges
    }

    /// Union-Find over edges at or above the cluster threshold
    fn cluster(&self, n: usize, edges: &[NeighborEdge]) -> Vec<usize> {
        let mut uf = UnionFind::new(n);
        for edge in edges {
            if edge.similarity >= self.config.cluster_threshold {
                uf.union(edge.source, edge.target);
            }
        }
        // Remap roots to dense cluster ids
        let mut ids: HashMap<usize, usize> = HashMap::new();
        (0..n)
            .map(|i| {
                let root = uf.find(i);
                let next = ids.len();
                *ids.entry(root).or_insert(next)
            })
            .collect()
    }

    /// Sum of edge similarities plus a bonus per cross-cluster neighbor
    fn centrality(
        &self,
        n: usize,
        edges: &[NeighborEdge],
        cluster_of: &[usize],
    ) -> (Vec<f64>, Vec<usize>) {
        let mut centrality = vec![0.0f64; n];
        let mut cross_counts = vec![0usize; n];
        for edge in edges {
            centrality[edge.source] += edge.similarity as f64;
            if cluster_of[edge.source] != cluster_of[edge.target] {
                centrality[edge.source] += self.config.cross_cluster_bonus;
                cross_counts[edge.source] += 1;
            }
        }
        (centrality, cross_counts)
    }

    /// Top-N by centrality, N = min(cap, fraction of the set), minimum 1
    fn highways(
        &self,
        inputs: &[(Memory, Vec<f32>)],
        centrality: &[f64],
        cross_counts: &[usize],
    ) -> Vec<Highway> {
        let budget = self
            .config
            .highway_cap
            .min(((inputs.len() as f64 * self.config.highway_fraction).floor() as usize).max(1));

        let mut ranked: Vec<usize> = (0..inputs.len()).collect();
        ranked.sort_by(|&a, &b| {
            centrality[b]
                .partial_cmp(&centrality[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
            .into_iter()
            .take(budget)
            .filter(|&i| centrality[i] > 0.0)
            .map(|i| Highway {
                memory_id: inputs[i].0.id.clone(),
                centrality: centrality[i],
                cross_cluster_neighbors: cross_counts[i],
            })
            .collect()
    }

    /// Infer a typed link per retained edge, keeping the strongest
    /// `max_links_per_memory` per source
    fn infer_links(
        &self,
        inputs: &[(Memory, Vec<f32>)],
        edges: &[NeighborEdge],
    ) -> Vec<ProposedLink> {
        let mut per_source: HashMap<usize, Vec<ProposedLink>> = HashMap::new();

        for edge in edges {
            let a = &inputs[edge.source].0;
            let b = &inputs[edge.target].0;
            let link_type = Self::infer_link_type(a, b);
            let strength =
                (edge.similarity as f64 * Self::type_bonus(link_type)).clamp(0.0, 1.0);

            per_source
                .entry(edge.source)
                .or_default()
                .push(ProposedLink {
                    source_id: a.id.clone(),
                    link: MemoryLink::new(&b.id, link_type)
                        .with_strength(strength)
                        .with_created_by("enrichment"),
                    similarity: edge.similarity,
                });
        }

        let mut proposals = vec![];
        for (_, mut links) in per_source {
            links.sort_by(|a, b| {
                b.link
                    .strength
                    .partial_cmp(&a.link.strength)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            links.truncate(self.config.max_links_per_memory);
            proposals.extend(links);
        }
        proposals
    }

    /// The ordered selection table; first match wins
    fn infer_link_type(a: &Memory, b: &Memory) -> LinkType {
        use MemoryType::*;

        if b.is_foundational() && !a.is_foundational() {
            return LinkType::DependsOn;
        }
        if a.is_foundational() && !b.is_foundational() {
            return LinkType::Supports;
        }
        match (a.memory_type, b.memory_type) {
            (Decision, Context) => return LinkType::DependsOn,
            (Context, Decision) => return LinkType::Supports,
            (Learning, Decision) => return LinkType::CausedBy,
            (Todo, Decision) => return LinkType::DependsOn,
            _ => {}
        }
        if a.timestamp > b.timestamp && contains_any(&a.content, REPLACEMENT_PHRASES) {
            return LinkType::Supersedes;
        }
        if a.memory_type == b.memory_type
            && a.content.len() as f64 > b.content.len() as f64 * EXTENDS_LENGTH_RATIO
        {
            return LinkType::Extends;
        }
        if contains_any(&a.content, EXAMPLE_PHRASES) && references(&a.content, &b.content) {
            return LinkType::ExampleOf;
        }
        LinkType::Related
    }

    /// Strength multiplier per inferred type, capped at 1.0 downstream
    fn type_bonus(link_type: LinkType) -> f64 {
        match link_type {
            LinkType::Contradicts => 1.2,
            LinkType::Supersedes => 1.15,
            LinkType::DependsOn | LinkType::Supports => 1.1,
            LinkType::CausedBy | LinkType::Extends => 1.05,
            LinkType::ExampleOf | LinkType::Related => 1.0,
        }
    }
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    let lower = text.to_lowercase();
    phrases.iter().any(|p| lower.contains(p))
}

/// Word-set overlap of `b`'s content words found in `a`
fn references(a: &str, b: &str) -> bool {
    let words_a: HashSet<String> = content_words(a);
    let words_b: HashSet<String> = content_words(b);
    if words_b.is_empty() {
        return false;
    }
    let shared = words_b.iter().filter(|w| words_a.contains(*w)).count();
    shared as f64 / words_b.len() as f64 >= REFERENCE_OVERLAP
}

fn content_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_string)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
