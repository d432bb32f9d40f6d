//! Id generation
//!
//! Every record id follows `<prefix>_<epoch_ms>_<6-char base36 random>`.
//! Prefixes are never parsed back; ids are opaque to everything but their
//! generator.

use rand::Rng;

/// Prefix for memory records
pub const MEMORY_ID_PREFIX: &str = "mem";
/// Prefix for session records
pub const SESSION_ID_PREFIX: &str = "sess";
/// Prefix for proposals
pub const PROPOSAL_ID_PREFIX: &str = "prop";
/// Prefix for foundational memories
pub const FOUNDATIONAL_ID_PREFIX: &str = "found";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// Generate a fresh id with the given prefix
pub fn new_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}_{}_{}", prefix, millis, suffix)
}

/// Generate a fresh memory id
pub fn new_memory_id() -> String {
    new_id(MEMORY_ID_PREFIX)
}

/// Generate a fresh session id
pub fn new_session_id() -> String {
    new_id(SESSION_ID_PREFIX)
}

/// Generate a fresh proposal id
pub fn new_proposal_id() -> String {
    new_id(PROPOSAL_ID_PREFIX)
}

// ============================================================================
// TESTS
// ============================================================================
