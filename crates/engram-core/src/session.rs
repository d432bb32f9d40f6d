//! Session state
//!
//! One lazily-created `current_session_id` per process, plus the map of
//! interactive review sessions (contradiction/consolidation walks). Review
//! sessions idle out after an hour; a janitor sweep evicts stale entries
//! and is expected to run on a ~10-minute cadence by whoever owns the
//! event loop.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::dream::{ConsolidationCandidate, Contradiction};
use crate::error::{MemoryError, Result};
use crate::ids;

/// Review sessions idle out after this long
const REVIEW_IDLE_TIMEOUT_MINS: i64 = 60;

// ============================================================================
// REVIEW SESSIONS
// ============================================================================

/// One item in an interactive review walk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReviewItem {
    /// A contradiction awaiting a human verdict
    Contradiction(Contradiction),
    /// A merge candidate awaiting a human verdict
    Consolidation(ConsolidationCandidate),
}

/// An interactive walk over dream findings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSession {
    /// Session id (`sess_*`)
    pub id: String,
    /// Items to walk through
    pub items: Vec<ReviewItem>,
    /// Index of the next unreviewed item
    pub position: usize,
    /// When the walk started
    pub created_at: DateTime<Utc>,
    /// Last interaction
    pub last_activity: DateTime<Utc>,
}

impl ReviewSession {
    /// The item currently under review
    pub fn current(&self) -> Option<&ReviewItem> {
        self.items.get(self.position)
    }

    /// Whether the walk is finished
    pub fn is_done(&self) -> bool {
        self.position >= self.items.len()
    }
}

// ============================================================================
// MANAGER
// ============================================================================

/// Process-wide session state; owned by the single worker
#[derive(Debug, Default)]
pub struct SessionManager {
    current: RwLock<Option<String>>,
    reviews: RwLock<HashMap<String, ReviewSession>>,
}

impl SessionManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// The current session id, created lazily on first use
    pub async fn current_session(&self) -> String {
        if let Some(id) = self.current.read().await.clone() {
            return id;
        }
        let mut current = self.current.write().await;
        // A racing caller may have set it between the locks
        if let Some(id) = current.clone() {
            return id;
        }
        let id = ids::new_session_id();
        *current = Some(id.clone());
        id
    }

    /// Override the current session id
    pub async fn set_session(&self, session_id: impl Into<String>) {
        *self.current.write().await = Some(session_id.into());
    }

    /// Start a review walk over dream findings, returning its id
    pub async fn start_review(&self, items: Vec<ReviewItem>) -> String {
        let now = Utc::now();
        let session = ReviewSession {
            id: ids::new_session_id(),
            items,
            position: 0,
            created_at: now,
            last_activity: now,
        };
        let id = session.id.clone();
        self.reviews.write().await.insert(id.clone(), session);
        id
    }

    /// Fetch a review session, refreshing its idle clock
    pub async fn touch_review(&self, session_id: &str) -> Result<ReviewSession> {
        let mut reviews = self.reviews.write().await;
        let Some(session) = reviews.get_mut(session_id) else {
            return Err(MemoryError::not_found("review session", session_id));
        };
        session.last_activity = Utc::now();
        Ok(session.clone())
    }

    /// Advance a review walk past the current item.
    ///
    /// Returns the next item, or `None` when the walk is done (the
    /// session is then dropped).
    pub async fn advance_review(&self, session_id: &str) -> Result<Option<ReviewItem>> {
        let mut reviews = self.reviews.write().await;
        let Some(session) = reviews.get_mut(session_id) else {
            return Err(MemoryError::not_found("review session", session_id));
        };
        session.position += 1;
        session.last_activity = Utc::now();
        if session.is_done() {
            reviews.remove(session_id);
            return Ok(None);
        }
        Ok(session.current().cloned())
    }

    /// Evict review sessions idle past the timeout; returns how many
    pub async fn sweep_stale_reviews(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::minutes(REVIEW_IDLE_TIMEOUT_MINS);
        let mut reviews = self.reviews.write().await;
        let before = reviews.len();
        reviews.retain(|_, session| session.last_activity >= cutoff);
        before - reviews.len()
    }

    /// Number of live review sessions
    pub async fn review_count(&self) -> usize {
        self.reviews.read().await.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
