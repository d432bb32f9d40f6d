//! Importance decay
//!
//! Exponential decay of importance with access resistance: the effective
//! age is the smaller of "days since creation" and "days since last
//! access plus the boost window", so recently-touched memories decay from
//! their last use, not their birth. Foundational and contradiction
//! records are exempt; shadow records decay at twice the speed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{MAX_IMPORTANCE, Memory, MemoryType};

/// Shadow memories halve the half-life
const SHADOW_HALF_LIFE_FACTOR: f64 = 0.5;
/// Shadow memories use a tighter access-boost window (days)
const SHADOW_ACCESS_BOOST_DAYS: f64 = 5.0;
/// Write-back threshold: smaller changes are ignored
const WRITE_THRESHOLD: f64 = 0.1;

// ============================================================================
// CONFIG
// ============================================================================

/// Decay parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Days for importance to halve
    pub half_life_days: f64,
    /// Grace window added after the last access
    pub access_boost_days: f64,
    /// Floor importance never decays below
    pub min_importance: f64,
    /// Types never decayed
    pub exempt_types: Vec<MemoryType>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            access_boost_days: 7.0,
            min_importance: 1.0,
            exempt_types: vec![MemoryType::Foundational, MemoryType::Contradiction],
        }
    }
}

/// A planned importance write-back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayUpdate {
    /// Memory to update
    pub memory_id: String,
    /// Importance before decay
    pub old_importance: f64,
    /// Importance after decay, rounded to one decimal
    pub new_importance: f64,
}

// ============================================================================
// CALCULATION
// ============================================================================

/// Compute the decayed importance of one memory.
///
/// Exempt types (and anything on the foundational layer) return their
/// importance unchanged. The result is clamped into
/// `[min_importance, 5]` and rounded to one decimal.
pub fn calculate_decay(memory: &Memory, now: DateTime<Utc>, config: &DecayConfig) -> f64 {
    if config.exempt_types.contains(&memory.memory_type) || memory.is_foundational() {
        return memory.importance;
    }

    let (half_life, boost_window) = if memory.memory_type == MemoryType::Shadow {
        (
            config.half_life_days * SHADOW_HALF_LIFE_FACTOR,
            SHADOW_ACCESS_BOOST_DAYS,
        )
    } else {
        (config.half_life_days, config.access_boost_days)
    };

    let days_since_creation = days_between(memory.timestamp, now);
    let days_since_access = memory
        .last_accessed
        .map(|t| days_between(t, now))
        .unwrap_or(days_since_creation);
    let effective_days = days_since_creation.min(days_since_access + boost_window);

    let decayed = memory.importance * 0.5f64.powf(effective_days / half_life);
    let boost = (memory.access_count as f64 * 0.1).min(1.0);
    let clamped = (decayed + boost).clamp(config.min_importance, MAX_IMPORTANCE);
    (clamped * 10.0).round() / 10.0
}

/// Plan write-backs over a snapshot; only changes past the threshold
/// are included
pub fn plan_decay(
    memories: &[Memory],
    now: DateTime<Utc>,
    config: &DecayConfig,
) -> Vec<DecayUpdate> {
    memories
        .iter()
        .filter_map(|memory| {
            let new_importance = calculate_decay(memory, now, config);
            if (new_importance - memory.importance).abs() > WRITE_THRESHOLD {
                Some(DecayUpdate {
                    memory_id: memory.id.clone(),
                    old_importance: memory.importance,
                    new_importance,
                })
            } else {
                None
            }
        })
        .collect()
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds().max(0) as f64 / 86_400.0
}

// ============================================================================
// TESTS
// ============================================================================
