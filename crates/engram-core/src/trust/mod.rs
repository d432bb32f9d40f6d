//! Trust policy engine
//!
//! Gates autonomous graph-mutating actions behind learned per-action
//! approval rates. Every action accumulates a trust score blending the
//! observed approval ratio with a 0.3 prior, weighted by how many human
//! reviews have happened; `decide` turns the score, the action's risk
//! profile and the mutation context into `auto`, `review` or `deny`.
//!
//! Scores persist as a serialized array in a JSON file under the user
//! state directory. Proposals pending longer than 7 days expire.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{MemoryError, Result};
use crate::ids;
use crate::memory::MemoryType;

/// The trust prior blended in while reviews are few
const TRUST_PRIOR: f64 = 0.3;
/// Human reviews needed for full confidence in the observed ratio
const FULL_CONFIDENCE_REVIEWS: f64 = 10.0;
/// Trust needed to auto-run an irreversible action
const IRREVERSIBLE_AUTO_TRUST: f64 = 0.9;
/// Pending proposals expire after this many days
const PROPOSAL_TTL_DAYS: i64 = 7;

/// Actions whose foundational targets always escalate to review
const MODIFYING_ACTIONS: &[&str] = &["update_memory", "delete_memory", "supersede"];

// ============================================================================
// SCORES
// ============================================================================

/// Per-action trust state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScore {
    /// Human approvals
    pub approved: u32,
    /// Human rejections
    pub rejected: u32,
    /// Times the action ran without review
    pub auto_approved: u32,
    /// All recorded outcomes
    pub total: u32,
    /// Blended score in [0, 1]
    pub score: f64,
    /// Last outcome time
    pub last_updated: DateTime<Utc>,
}

impl Default for TrustScore {
    fn default() -> Self {
        Self {
            approved: 0,
            rejected: 0,
            auto_approved: 0,
            total: 0,
            score: TRUST_PRIOR,
            last_updated: Utc::now(),
        }
    }
}

impl TrustScore {
    /// Recompute the blended score from the counts
    fn recompute(&mut self) {
        let reviews = self.approved + self.rejected;
        let approval_ratio = self.approved as f64 / reviews.max(1) as f64;
        let confidence = (reviews as f64 / FULL_CONFIDENCE_REVIEWS).min(1.0);
        self.score = TRUST_PRIOR * (1.0 - confidence) + approval_ratio * confidence;
        self.last_updated = Utc::now();
    }
}

/// How an outcome was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// A human approved the action
    Approved,
    /// A human rejected the action
    Rejected,
    /// The action ran autonomously
    Auto,
}

// ============================================================================
// POLICY
// ============================================================================

/// Decision for a proposed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Run without review
    Auto,
    /// Queue for human review
    Review,
    /// Refuse outright
    Deny,
}

/// Risk band of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Easily undone bookkeeping
    Low,
    /// Content-changing but recoverable
    Medium,
    /// Destructive or hard to undo
    High,
}

/// Risk metadata for one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPolicy {
    /// Risk band
    pub risk: RiskLevel,
    /// Whether the action can be undone
    pub reversible: bool,
    /// Decision when trust is insufficient
    pub default_decision: Decision,
    /// Trust score at which the action may run unreviewed
    pub min_trust_for_auto: f64,
}

/// Per-action risk table plus explicit overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustPolicyConfig {
    /// Known actions and their risk metadata
    pub actions: HashMap<String, ActionPolicy>,
    /// Hard overrides; checked before anything else
    pub overrides: HashMap<String, Decision>,
}

impl Default for TrustPolicyConfig {
    fn default() -> Self {
        let policy = |risk, reversible, default_decision, min_trust_for_auto| ActionPolicy {
            risk,
            reversible,
            default_decision,
            min_trust_for_auto,
        };
        let actions = HashMap::from([
            (
                "add_link".to_string(),
                policy(RiskLevel::Low, true, Decision::Review, 0.5),
            ),
            (
                "remove_link".to_string(),
                policy(RiskLevel::Low, true, Decision::Review, 0.5),
            ),
            (
                "create_memory".to_string(),
                policy(RiskLevel::Low, true, Decision::Review, 0.6),
            ),
            (
                "update_memory".to_string(),
                policy(RiskLevel::Medium, true, Decision::Review, 0.7),
            ),
            (
                "supersede".to_string(),
                policy(RiskLevel::Medium, true, Decision::Review, 0.7),
            ),
            (
                "merge_memories".to_string(),
                policy(RiskLevel::High, false, Decision::Review, 0.8),
            ),
            (
                "delete_memory".to_string(),
                policy(RiskLevel::High, false, Decision::Deny, 0.9),
            ),
        ]);
        Self {
            actions,
            overrides: HashMap::new(),
        }
    }
}

/// What the proposed mutation touches
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    /// Importance of the target memory
    pub target_importance: Option<f64>,
    /// Type of the target memory
    pub target_type: Option<MemoryType>,
}

// ============================================================================
// PROPOSALS
// ============================================================================

/// Lifecycle state of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    /// Waiting on a human
    Pending,
    /// Human approved
    Approved,
    /// Human rejected
    Rejected,
    /// Ran without review
    Auto,
    /// Timed out pending
    Expired,
}

/// A proposed graph mutation from a walker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Proposal id (`prop_*`)
    pub id: String,
    /// Action name the trust table knows
    pub action: String,
    /// When it was proposed
    pub timestamp: DateTime<Utc>,
    /// Lifecycle state
    pub status: ProposalStatus,
    /// Proposing walker instance
    pub walker_id: String,
    /// Walker role ("linker", "consolidator", "pruner", ...)
    pub walker_type: String,
    /// Memories the mutation touches
    pub target_ids: Vec<String>,
    /// Human-readable summary
    pub description: String,
    /// Why the walker wants it
    pub reason: String,
}

// ============================================================================
// ENGINE
// ============================================================================

/// The trust policy engine
pub struct TrustEngine {
    config: TrustPolicyConfig,
    scores: RwLock<HashMap<String, TrustScore>>,
    proposals: RwLock<Vec<Proposal>>,
    state_path: Option<PathBuf>,
}

/// On-disk record shape: the score array carries its action name
#[derive(Debug, Serialize, Deserialize)]
struct TrustScoreRecord {
    action: String,
    #[serde(flatten)]
    score: TrustScore,
}

impl TrustEngine {
    /// Create an engine with no persistence (tests, dry runs)
    pub fn new(config: TrustPolicyConfig) -> Self {
        Self {
            config,
            scores: RwLock::new(HashMap::new()),
            proposals: RwLock::new(Vec::new()),
            state_path: None,
        }
    }

    /// Create an engine persisting scores at `path`, loading any
    /// existing state
    pub fn with_state_file(config: TrustPolicyConfig, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let scores = Self::load_scores(&path).unwrap_or_default();
        Self {
            config,
            scores: RwLock::new(scores),
            proposals: RwLock::new(Vec::new()),
            state_path: Some(path),
        }
    }

    fn load_scores(path: &Path) -> Option<HashMap<String, TrustScore>> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Vec<TrustScoreRecord>>(&raw) {
            Ok(records) => Some(
                records
                    .into_iter()
                    .map(|r| (r.action, r.score))
                    .collect(),
            ),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "trust state unreadable, starting fresh");
                None
            }
        }
    }

    async fn persist(&self) {
        let Some(path) = &self.state_path else {
            return;
        };
        let scores = self.scores.read().await;
        let records: Vec<TrustScoreRecord> = scores
            .iter()
            .map(|(action, score)| TrustScoreRecord {
                action: action.clone(),
                score: score.clone(),
            })
            .collect();
        match serde_json::to_string_pretty(&records) {
            Ok(body) => {
                if let Err(err) = std::fs::write(path, body) {
                    warn!(path = %path.display(), error = %err, "trust state write failed");
                }
            }
            Err(err) => warn!(error = %err, "trust state serialization failed"),
        }
    }

    /// Current trust score for an action (the prior when unseen)
    pub async fn trust_score(&self, action: &str) -> f64 {
        self.scores
            .read()
            .await
            .get(action)
            .map(|s| s.score)
            .unwrap_or(TRUST_PRIOR)
    }

    /// Decide whether a proposed action runs, queues or is refused.
    ///
    /// Order: explicit config override, then context escalations, then
    /// the trust threshold, then the action's default.
    pub async fn decide(&self, action: &str, ctx: &DecisionContext) -> Decision {
        if let Some(decision) = self.config.overrides.get(action) {
            return *decision;
        }

        let fallback = ActionPolicy {
            risk: RiskLevel::Medium,
            reversible: true,
            default_decision: Decision::Review,
            min_trust_for_auto: 0.7,
        };
        let policy = self.config.actions.get(action).unwrap_or(&fallback);
        let trust = self.trust_score(action).await;

        if self.escalates(action, policy, trust, ctx) {
            return Decision::Review;
        }
        if trust >= policy.min_trust_for_auto {
            return Decision::Auto;
        }
        policy.default_decision
    }

    /// Context escalations that force review regardless of trust
    fn escalates(
        &self,
        action: &str,
        policy: &ActionPolicy,
        trust: f64,
        ctx: &DecisionContext,
    ) -> bool {
        if ctx.target_importance.map(|i| i >= 5.0).unwrap_or(false) {
            return true;
        }
        if ctx.target_type == Some(MemoryType::Foundational)
            && MODIFYING_ACTIONS.contains(&action)
        {
            return true;
        }
        if !policy.reversible && trust < IRREVERSIBLE_AUTO_TRUST {
            return true;
        }
        false
    }

    /// Record an outcome and recompute the action's score
    pub async fn record_outcome(&self, action: &str, outcome: Outcome) {
        {
            let mut scores = self.scores.write().await;
            let score = scores.entry(action.to_string()).or_default();
            match outcome {
                Outcome::Approved => score.approved += 1,
                Outcome::Rejected => score.rejected += 1,
                Outcome::Auto => score.auto_approved += 1,
            }
            score.total += 1;
            score.recompute();
            debug!(action, score = score.score, "trust updated");
        }
        self.persist().await;
    }

    // ------------------------------------------------------------------
    // Proposals
    // ------------------------------------------------------------------

    /// File a proposal from a walker.
    ///
    /// A pending proposal for the same action and target set is a
    /// conflict.
    pub async fn propose(
        &self,
        action: &str,
        walker_id: &str,
        walker_type: &str,
        target_ids: Vec<String>,
        description: &str,
        reason: &str,
    ) -> Result<Proposal> {
        let mut proposals = self.proposals.write().await;
        let duplicate = proposals.iter().any(|p| {
            p.status == ProposalStatus::Pending
                && p.action == action
                && p.target_ids == target_ids
        });
        if duplicate {
            return Err(MemoryError::Conflict {
                kind: format!("pending proposal already exists for {}", action),
            });
        }

        let proposal = Proposal {
            id: ids::new_proposal_id(),
            action: action.to_string(),
            timestamp: Utc::now(),
            status: ProposalStatus::Pending,
            walker_id: walker_id.to_string(),
            walker_type: walker_type.to_string(),
            target_ids,
            description: description.to_string(),
            reason: reason.to_string(),
        };
        proposals.push(proposal.clone());
        Ok(proposal)
    }

    /// Resolve a pending proposal and feed the outcome back into trust
    pub async fn resolve_proposal(&self, proposal_id: &str, approved: bool) -> Result<Proposal> {
        let (action, resolved) = {
            let mut proposals = self.proposals.write().await;
            let Some(proposal) = proposals.iter_mut().find(|p| p.id == proposal_id) else {
                return Err(MemoryError::not_found("proposal", proposal_id));
            };
            if proposal.status != ProposalStatus::Pending {
                return Err(MemoryError::Conflict {
                    kind: format!("proposal {} is not pending", proposal_id),
                });
            }
            proposal.status = if approved {
                ProposalStatus::Approved
            } else {
                ProposalStatus::Rejected
            };
            (proposal.action.clone(), proposal.clone())
        };

        self.record_outcome(
            &action,
            if approved {
                Outcome::Approved
            } else {
                Outcome::Rejected
            },
        )
        .await;
        Ok(resolved)
    }

    /// Expire pending proposals older than 7 days; returns how many
    pub async fn expire_stale_proposals(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(PROPOSAL_TTL_DAYS);
        let mut proposals = self.proposals.write().await;
        let mut expired = 0;
        for proposal in proposals.iter_mut() {
            if proposal.status == ProposalStatus::Pending && proposal.timestamp < cutoff {
                proposal.status = ProposalStatus::Expired;
                expired += 1;
            }
        }
        expired
    }

    /// Snapshot of proposals, optionally filtered by status
    pub async fn proposals(&self, status: Option<ProposalStatus>) -> Vec<Proposal> {
        self.proposals
            .read()
            .await
            .iter()
            .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
            .cloned()
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
