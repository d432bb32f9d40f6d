//! Dream maintenance engine
//!
//! The offline batch phase over the memory set: contradiction detection
//! and resolution, consolidation of near-duplicates, and importance
//! decay, plus foundational-document ingest. Operations are idempotent
//! with respect to the same input snapshot and all support dry-run, which
//! never mutates.
//!
//! An LLM oracle, when configured and reachable, arbitrates conflicts and
//! may override merges; when absent, temporal conflicts auto-resolve by
//! recency and direct conflicts are reported only. Oracle failures always
//! fall back to the heuristics - never a fatal error.

pub mod consolidate;
pub mod contradiction;
pub mod decay;
pub mod foundational;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::embeddings::cosine_similarity;
use crate::error::Result;
use crate::memory::{Memory, MemorySource};
use crate::oracle::{CompletionRequest, Oracle};
use crate::store::{MemoryStore, MemoryPatch, SaveOptions};
use crate::text::jaccard;

pub use consolidate::{ConsolidationCandidate, ConsolidationConfig};
pub use contradiction::{Contradiction, ContradictionKind, OracleVerdict, Resolution};
pub use decay::{DecayConfig, DecayUpdate, calculate_decay, plan_decay};
pub use foundational::{FoundationalItem, parse_document};

/// Jaccard fallback threshold for foundational duplicate detection
const FOUNDATIONAL_TEXT_DUPLICATE: f64 = 0.9;

// ============================================================================
// OPTIONS & REPORT
// ============================================================================

/// Which phases a dream run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DreamOperation {
    /// Detect and resolve conflicting memories
    Contradictions,
    /// Merge near-duplicate clusters
    Consolidation,
    /// Recompute decayed importance
    Decay,
}

/// Options for a dream run
#[derive(Debug, Clone)]
pub struct DreamOptions {
    /// Phases to run, in this order
    pub operations: Vec<DreamOperation>,
    /// Report only; never mutate
    pub dry_run: bool,
    /// Consult the oracle when it is available
    pub use_llm: bool,
}

impl Default for DreamOptions {
    fn default() -> Self {
        Self {
            operations: vec![
                DreamOperation::Contradictions,
                DreamOperation::Consolidation,
                DreamOperation::Decay,
            ],
            dry_run: false,
            use_llm: false,
        }
    }
}

/// A mutation the run performed (or planned, in dry-run)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ResolutionAction {
    /// One memory closed in favor of another
    Superseded {
        /// Closed memory
        old_id: String,
        /// Its replacement
        new_id: String,
    },
    /// Members merged into a fresh memory
    Merged {
        /// The merged memory
        new_id: String,
        /// Members superseded into it
        superseded: Vec<String>,
    },
    /// Conflict surfaced for a human; nothing mutated
    Reported {
        /// The more recent memory
        newer_id: String,
        /// The older memory
        older_id: String,
        /// Why it was only reported
        reason: String,
    },
}

/// A resolution decided but not yet written; carries the merge payload
/// the public action type does not need
#[derive(Debug, Clone)]
enum PlannedResolution {
    Supersede {
        old_id: String,
        new_id: String,
    },
    Merge {
        content: String,
        member_ids: Vec<String>,
    },
    Report {
        newer_id: String,
        older_id: String,
        reason: String,
    },
}

impl PlannedResolution {
    /// Render as the public action; `merged_id` fills the id a dry run
    /// never allocated
    fn into_action(self, merged_id: String) -> ResolutionAction {
        match self {
            Self::Supersede { old_id, new_id } => {
                ResolutionAction::Superseded { old_id, new_id }
            }
            Self::Merge { member_ids, .. } => ResolutionAction::Merged {
                new_id: merged_id,
                superseded: member_ids,
            },
            Self::Report {
                newer_id,
                older_id,
                reason,
            } => ResolutionAction::Reported {
                newer_id,
                older_id,
                reason,
            },
        }
    }
}

/// Outcome of a dream run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DreamReport {
    /// Conflicts found
    pub contradictions: Vec<Contradiction>,
    /// Mutations performed or planned
    pub resolutions: Vec<ResolutionAction>,
    /// Merge plans produced
    pub consolidation_candidates: Vec<ConsolidationCandidate>,
    /// Merges actually written
    pub memories_merged: usize,
    /// Importance write-backs
    pub decay_updates: Vec<DecayUpdate>,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Wall time of the run
    pub duration_ms: u64,
}

/// Outcome of a foundational ingest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoundationalReport {
    /// Ids of created memories
    pub created: Vec<String>,
    /// Items skipped as duplicates of existing memories
    pub skipped_duplicates: usize,
}

// ============================================================================
// ENGINE
// ============================================================================

/// The dream engine
pub struct DreamEngine {
    oracle: Arc<dyn Oracle>,
    decay_config: DecayConfig,
    consolidation_config: ConsolidationConfig,
}

impl DreamEngine {
    /// Create an engine with the given oracle (use the null oracle for
    /// heuristics-only operation)
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            decay_config: DecayConfig::default(),
            consolidation_config: ConsolidationConfig::default(),
        }
    }

    /// Override the decay parameters
    pub fn with_decay_config(mut self, config: DecayConfig) -> Self {
        self.decay_config = config;
        self
    }

    /// Override the consolidation parameters
    pub fn with_consolidation_config(mut self, config: ConsolidationConfig) -> Self {
        self.consolidation_config = config;
        self
    }

    /// Run the selected phases over the store's current snapshot
    pub async fn run(&self, store: &MemoryStore, options: DreamOptions) -> Result<DreamReport> {
        let started = Instant::now();
        let snapshot = store.dump(true).await?;

        let mut report = DreamReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        let oracle_ready = options.use_llm && self.oracle.is_available().await;
        if options.use_llm && !oracle_ready {
            debug!(oracle = self.oracle.name(), "oracle unavailable, using heuristics");
        }

        for operation in &options.operations {
            match operation {
                DreamOperation::Contradictions => {
                    self.run_contradictions(store, &snapshot, &options, oracle_ready, &mut report)
                        .await?;
                }
                DreamOperation::Consolidation => {
                    self.run_consolidation(store, &snapshot, &options, oracle_ready, &mut report)
                        .await?;
                }
                DreamOperation::Decay => {
                    self.run_decay(store, &snapshot, &options, &mut report).await?;
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            contradictions = report.contradictions.len(),
            merged = report.memories_merged,
            decayed = report.decay_updates.len(),
            dry_run = report.dry_run,
            "dream cycle complete"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Contradictions
    // ------------------------------------------------------------------

    async fn run_contradictions(
        &self,
        store: &MemoryStore,
        snapshot: &[(Memory, Vec<f32>)],
        options: &DreamOptions,
        oracle_ready: bool,
        report: &mut DreamReport,
    ) -> Result<()> {
        let current: Vec<Memory> = snapshot
            .iter()
            .map(|(m, _)| m.clone())
            .filter(|m| m.superseded_by.is_none())
            .collect();
        let conflicts = contradiction::detect(&current);

        for conflict in &conflicts {
            let planned = if oracle_ready {
                match self.arbitrate(&current, conflict).await {
                    Ok(planned) => planned,
                    Err(err) => {
                        warn!(error = %err, "oracle arbitration failed, using heuristic");
                        Self::heuristic_plan(conflict)
                    }
                }
            } else {
                Self::heuristic_plan(conflict)
            };

            let action = if options.dry_run {
                planned.into_action(String::new())
            } else {
                self.apply_plan(store, &current, planned).await?
            };
            report.resolutions.push(action);
        }

        report.contradictions = conflicts;
        Ok(())
    }

    /// Recency resolves temporal conflicts; direct conflicts are only
    /// reported
    fn heuristic_plan(conflict: &Contradiction) -> PlannedResolution {
        match conflict.kind {
            ContradictionKind::Temporal => PlannedResolution::Supersede {
                old_id: conflict.older_id.clone(),
                new_id: conflict.newer_id.clone(),
            },
            ContradictionKind::Direct => PlannedResolution::Report {
                newer_id: conflict.newer_id.clone(),
                older_id: conflict.older_id.clone(),
                reason: "direct conflicts need a human or an oracle".to_string(),
            },
        }
    }

    async fn arbitrate(
        &self,
        memories: &[Memory],
        conflict: &Contradiction,
    ) -> Result<PlannedResolution> {
        let older = find(memories, &conflict.older_id);
        let newer = find(memories, &conflict.newer_id);
        let (Some(older), Some(newer)) = (older, newer) else {
            return Ok(Self::heuristic_plan(conflict));
        };

        let request = CompletionRequest::new(format!(
            "Two stored memories appear to conflict.\n\n\
             Memory A (older, {a_time}): {a}\n\
             Memory B (newer, {b_time}): {b}\n\n\
             Reply with JSON: {{\"is_real_conflict\": bool, \
             \"resolution\": \"supersede_a\"|\"supersede_b\"|\"keep_both\"|\"merge\", \
             \"merged_content\": string|null, \"reasoning\": string, \
             \"confidence\": number}}",
            a_time = older.timestamp.to_rfc3339(),
            b_time = newer.timestamp.to_rfc3339(),
            a = older.content,
            b = newer.content,
        ))
        .with_system("You arbitrate conflicts in an assistant's long-term memory. Be conservative: only real conflicts get resolved.")
        .json();

        let completion = self.oracle.complete(&request).await?;
        let verdict: OracleVerdict = parse_json_response(&completion.content)?;

        if !verdict.is_real_conflict {
            return Ok(PlannedResolution::Report {
                newer_id: newer.id.clone(),
                older_id: older.id.clone(),
                reason: "oracle judged this a false positive".to_string(),
            });
        }
        Ok(match verdict.resolution {
            Resolution::SupersedeA => PlannedResolution::Supersede {
                old_id: older.id.clone(),
                new_id: newer.id.clone(),
            },
            Resolution::SupersedeB => PlannedResolution::Supersede {
                old_id: newer.id.clone(),
                new_id: older.id.clone(),
            },
            Resolution::KeepBoth => PlannedResolution::Report {
                newer_id: newer.id.clone(),
                older_id: older.id.clone(),
                reason: verdict.reasoning,
            },
            Resolution::Merge => match verdict.merged_content {
                Some(content) if !content.trim().is_empty() => PlannedResolution::Merge {
                    content,
                    member_ids: vec![older.id.clone(), newer.id.clone()],
                },
                // A merge with nothing to merge falls back to keeping both
                _ => PlannedResolution::Report {
                    newer_id: newer.id.clone(),
                    older_id: older.id.clone(),
                    reason: "oracle requested a merge without content".to_string(),
                },
            },
        })
    }

    async fn apply_plan(
        &self,
        store: &MemoryStore,
        memories: &[Memory],
        planned: PlannedResolution,
    ) -> Result<ResolutionAction> {
        match planned {
            PlannedResolution::Supersede { old_id, new_id } => {
                store.supersede(&old_id, &new_id).await?;
                Ok(ResolutionAction::Superseded { old_id, new_id })
            }
            PlannedResolution::Merge { content, member_ids } => {
                // The most recent member is the template for type/project
                let template = member_ids
                    .iter()
                    .filter_map(|id| find(memories, id))
                    .max_by(|a, b| a.timestamp.cmp(&b.timestamp));

                let mut merged =
                    Memory::new(&content).with_source(MemorySource::LlmConsolidated);
                if let Some(template) = template {
                    merged.memory_type = template.memory_type;
                    merged.project = template.project.clone();
                }
                merged.tags = union_tags(member_ids.iter().filter_map(|id| find(memories, id)));
                merged.importance = member_ids
                    .iter()
                    .filter_map(|id| find(memories, id))
                    .map(|m| m.importance)
                    .fold(1.0, f64::max);

                let new_id = store.save(merged, SaveOptions::default()).await?;
                for old_id in &member_ids {
                    store.supersede(old_id, &new_id).await?;
                }
                Ok(ResolutionAction::Merged {
                    new_id,
                    superseded: member_ids,
                })
            }
            PlannedResolution::Report {
                newer_id,
                older_id,
                reason,
            } => Ok(ResolutionAction::Reported {
                newer_id,
                older_id,
                reason,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Consolidation
    // ------------------------------------------------------------------

    async fn run_consolidation(
        &self,
        store: &MemoryStore,
        snapshot: &[(Memory, Vec<f32>)],
        options: &DreamOptions,
        oracle_ready: bool,
        report: &mut DreamReport,
    ) -> Result<()> {
        let current: Vec<(Memory, Vec<f32>)> = snapshot
            .iter()
            .filter(|(m, _)| m.superseded_by.is_none() && !m.is_foundational())
            .cloned()
            .collect();

        let have_embeddings = current.iter().any(|(_, v)| !v.is_empty());
        let clusters = if have_embeddings {
            consolidate::find_clusters(&current, &self.consolidation_config)
        } else {
            consolidate::find_clusters_by_text(
                &current.iter().map(|(m, _)| m.clone()).collect::<Vec<_>>(),
            )
        };

        for cluster in clusters {
            let members: Vec<&Memory> = cluster.iter().map(|&i| &current[i].0).collect();
            let Some(mut candidate) = consolidate::build_candidate(&members) else {
                continue;
            };

            let mut source = MemorySource::Consolidated;
            if oracle_ready {
                match self.review_merge(&members, &candidate).await {
                    Ok(Some(content)) => {
                        candidate.merged_content = content;
                        source = MemorySource::LlmConsolidated;
                    }
                    Ok(None) => {
                        debug!(primary = %candidate.primary_id, "oracle declined merge");
                        continue;
                    }
                    Err(err) => {
                        warn!(error = %err, "oracle merge review failed, keeping heuristic merge");
                    }
                }
            }

            if !options.dry_run {
                let new_id = self.apply_candidate(store, &members, &candidate, source).await?;
                report.resolutions.push(ResolutionAction::Merged {
                    new_id,
                    superseded: candidate.member_ids.clone(),
                });
                report.memories_merged += 1;
            }
            report.consolidation_candidates.push(candidate);
        }
        Ok(())
    }

    /// Ask the oracle to approve, override or decline a merge.
    ///
    /// `Ok(Some(content))` approves with the given content, `Ok(None)`
    /// declines.
    async fn review_merge(
        &self,
        members: &[&Memory],
        candidate: &ConsolidationCandidate,
    ) -> Result<Option<String>> {
        let listing = members
            .iter()
            .map(|m| format!("- {}", m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let request = CompletionRequest::new(format!(
            "These memories look like near-duplicates:\n{listing}\n\n\
             Proposed merged content:\n{merged}\n\n\
             Reply with JSON: {{\"merge\": bool, \"content\": string|null, \
             \"reasoning\": string}}. Set merge=false if they should stay \
             separate; set content to override the merged text.",
            merged = candidate.merged_content,
        ))
        .with_system("You curate an assistant's long-term memory.")
        .json();

        let completion = self.oracle.complete(&request).await?;
        let review: MergeReview = parse_json_response(&completion.content)?;
        if !review.merge {
            return Ok(None);
        }
        Ok(Some(
            review
                .content
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| candidate.merged_content.clone()),
        ))
    }

    async fn apply_candidate(
        &self,
        store: &MemoryStore,
        members: &[&Memory],
        candidate: &ConsolidationCandidate,
        source: MemorySource,
    ) -> Result<String> {
        let primary = members
            .iter()
            .find(|m| m.id == candidate.primary_id)
            .copied();

        let mut merged = Memory::new(&candidate.merged_content).with_source(source);
        if let Some(primary) = primary {
            merged.memory_type = primary.memory_type;
            merged.project = primary.project.clone();
            merged.session_id = primary.session_id.clone();
        }
        merged.importance = candidate.importance;
        merged.tags = candidate.tags.clone();

        let new_id = store.save(merged, SaveOptions::default()).await?;
        for member_id in &candidate.member_ids {
            store.supersede(member_id, &new_id).await?;
        }
        Ok(new_id)
    }

    // ------------------------------------------------------------------
    // Decay
    // ------------------------------------------------------------------

    async fn run_decay(
        &self,
        store: &MemoryStore,
        snapshot: &[(Memory, Vec<f32>)],
        options: &DreamOptions,
        report: &mut DreamReport,
    ) -> Result<()> {
        let memories: Vec<Memory> = snapshot.iter().map(|(m, _)| m.clone()).collect();
        let updates = plan_decay(&memories, chrono::Utc::now(), &self.decay_config);

        if !options.dry_run {
            for update in &updates {
                store
                    .update(
                        &update.memory_id,
                        MemoryPatch {
                            importance: Some(update.new_importance),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }
        report.decay_updates = updates;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Foundational ingest
    // ------------------------------------------------------------------

    /// Ingest a category-header document as foundational memories.
    ///
    /// Items duplicating an existing memory (cosine >= 0.9, or Jaccard
    /// when the snapshot has no embeddings) are skipped.
    pub async fn ingest_foundational(
        &self,
        store: &MemoryStore,
        document: &str,
    ) -> Result<FoundationalReport> {
        let items = foundational::parse_document(document);
        let mut report = FoundationalReport::default();
        if items.is_empty() {
            return Ok(report);
        }

        let existing = store.dump(true).await?;
        for item in items {
            let embedding = store.embedder().embed(&item.content).await?;
            let duplicate = existing.iter().any(|(memory, vector)| {
                if !vector.is_empty() && !embedding.is_empty() {
                    cosine_similarity(&embedding, vector) >= foundational::DUPLICATE_SIMILARITY
                } else {
                    jaccard(&item.content, &memory.content) >= FOUNDATIONAL_TEXT_DUPLICATE
                }
            });
            if duplicate {
                report.skipped_duplicates += 1;
                continue;
            }
            let memory = foundational::item_to_memory(&item);
            let id = store.save(memory, SaveOptions::default()).await?;
            report.created.push(id);
        }
        Ok(report)
    }
}

fn find<'a>(memories: &'a [Memory], id: &str) -> Option<&'a Memory> {
    memories.iter().find(|m| m.id == id)
}

fn union_tags<'a>(members: impl Iterator<Item = &'a Memory>) -> Vec<String> {
    let mut tags: Vec<String> = vec![];
    for member in members {
        for tag in &member.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
    }
    tags
}

/// Oracle response shape for merge review
#[derive(Debug, Deserialize)]
struct MergeReview {
    merge: bool,
    #[serde(default)]
    content: Option<String>,
}

/// Parse a JSON body the oracle returned, tolerating markdown fences
fn parse_json_response<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    serde_json::from_str(body)
        .map_err(|e| crate::error::MemoryError::parsing("oracle_response", e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
