//! # Engram Core
//!
//! Semantic long-term memory engine for AI assistants. The distinguishing
//! machinery is not chat plumbing but the lifecycle of a memory:
//!
//! - **Typed memory graph**: bi-temporal records, rich typed links,
//!   linear supersession chains, bidirectional link maintenance
//! - **Hybrid retrieval**: vector similarity blended with BM25 and
//!   graph-distance boosts, with time decay, importance and access boosts,
//!   and optional graph-neighbor expansion
//! - **Dream maintenance**: offline contradiction detection, near-duplicate
//!   consolidation and exponential importance decay
//! - **Graph enrichment**: cosine k-NN, Union-Find clustering, centrality
//!   scoring with highway (bridge) identification, typed link inference
//! - **Trigger detection**: regex-driven classification of incoming text
//!   into save / recall / synthesize / align intents
//! - **Trust policy**: learned per-action approval rates gating autonomous
//!   graph mutations behind `auto | review | deny`
//!
//! The embedding model, the vector database and the optional LLM oracle
//! are external collaborators consumed through the narrow traits in
//! [`embeddings`], [`vector`] and [`oracle`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::prelude::*;
//! use std::sync::Arc;
//!
//! let vectors = Arc::new(ChromaClient::new("localhost", 8000)?);
//! let store = Arc::new(MemoryStore::new(vectors, embedder));
//!
//! // Save a memory
//! let id = store
//!     .save(
//!         Memory::new("We decided to use PostgreSQL")
//!             .with_type(MemoryType::Decision)
//!             .with_tags(["database"]),
//!         SaveOptions::default(),
//!     )
//!     .await?;
//!
//! // Retrieve it
//! let engine = RetrievalEngine::new(store.clone());
//! let results = engine.search("database choice", SearchOptions::default()).await?;
//!
//! // Run an offline dream cycle
//! let dreams = DreamEngine::new(Arc::new(NullOracle));
//! let report = dreams.run(&store, DreamOptions::default()).await?;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod dream;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod ids;
pub mod memory;
pub mod oracle;
pub mod retry;
pub mod search;
pub mod session;
pub mod store;
pub mod text;
pub mod trigger;
pub mod trust;
pub mod vector;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Errors
pub use error::{MemoryError, Result};

// Memory types
pub use memory::{
    LinkType, MAX_IMPORTANCE, MIN_IMPORTANCE, Memory, MemoryLayer, MemoryLink, MemoryScope,
    MemorySource, MemoryType,
    shadow::{ShadowActivity, ShadowConfig, ShadowOutcome, ShadowSlot, ShadowTracker},
};

// Store layer
pub use store::{
    ListOptions, MemoryPatch, MemoryStats, MemoryStore, SaveOptions, SortBy,
};

// Retrieval
pub use search::{
    HybridConfig, MatchKind, RetrievalDecay, RetrievalEngine, ScoredMemory, SearchOptions,
    bm25::Bm25,
};

// Graph enrichment
pub use graph::{EnrichmentConfig, EnrichmentReport, GraphEnricher, Highway, ProposedLink};

// Dream engine
pub use dream::{
    ConsolidationCandidate, ConsolidationConfig, Contradiction, ContradictionKind, DecayConfig,
    DecayUpdate, DreamEngine, DreamOperation, DreamOptions, DreamReport, FoundationalReport,
    ResolutionAction, calculate_decay,
};

// Trigger detection
pub use trigger::{
    MemorablePoint, SemanticSignal, SignalLevel, TriggerDetector, TriggerKind, TriggerMatch,
};

// Trust policy
pub use trust::{
    ActionPolicy, Decision, DecisionContext, Outcome, Proposal, ProposalStatus, RiskLevel,
    TrustEngine, TrustPolicyConfig, TrustScore,
};

// External seams
pub use embeddings::{EMBEDDING_DIMENSIONS, Embedder, cosine_similarity};
pub use oracle::{
    Completion, CompletionRequest, NullOracle, Oracle, OracleConfig, OracleProvider, build_oracle,
};
pub use vector::{
    ChromaClient, InMemoryStore, QueryHit, VectorRecord, VectorStore, Where,
};

// Config & sessions
pub use config::Settings;
pub use session::{ReviewItem, ReviewSession, SessionManager};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        ChromaClient, DreamEngine, DreamOptions, Embedder, InMemoryStore, Memory, MemoryError,
        MemoryLink, MemoryStore, MemoryType, NullOracle, Oracle, Result, RetrievalEngine,
        SaveOptions, SearchOptions, SessionManager, Settings, TriggerDetector, TrustEngine,
        VectorStore,
    };
}
