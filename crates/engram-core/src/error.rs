//! Error taxonomy
//!
//! A closed set of error kinds shared across the crate:
//!
//! - `Database` - any vector-store failure, carrying a transient bit that
//!   drives the retry wrapper
//! - `Parsing` - a corrupt metadata blob; the enclosing memory stays usable
//!   with the offending field dropped
//! - `Validation` - bad input, always propagated to the caller
//! - `NotFound` - explicit miss on a named resource
//! - `Conflict` - duplicate detection or constraint violation in the policy
//!   engine

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Memory engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Vector-store failure. `transient` marks causes worth retrying
    /// (connection refused, timeout, 502/503).
    #[error("database error: {message}")]
    Database {
        /// Human-readable cause
        message: String,
        /// Whether the retry wrapper may retry this failure
        transient: bool,
    },

    /// Corrupt metadata blob on a named field. Absorbed at the codec
    /// boundary: the field is dropped, the record survives.
    #[error("failed to parse field `{field}`: {message}")]
    Parsing {
        /// Metadata key that failed to parse
        field: String,
        /// Parse failure detail
        message: String,
    },

    /// Bad input (empty content, invalid enum, out-of-range importance)
    #[error("validation failed: {message}")]
    Validation {
        /// Offending field, when one can be named
        field: Option<String>,
        /// What was wrong with it
        message: String,
    },

    /// A named resource does not exist
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Resource kind ("memory", "session", "proposal", ...)
        resource: &'static str,
        /// The id that missed
        id: String,
    },

    /// Duplicate detection / constraint violation in the policy engine
    #[error("conflict: {kind}")]
    Conflict {
        /// Conflict kind description
        kind: String,
    },
}

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Substrings in a failure message that mark it as retriable
const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "timed out",
    "timeout",
    "502",
    "503",
];

impl MemoryError {
    /// Build a database error, classifying transience from the message
    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let transient = TRANSIENT_MARKERS.iter().any(|m| lower.contains(m));
        Self::Database { message, transient }
    }

    /// Build a database error with an explicit transient bit
    pub fn database_with_transience(message: impl Into<String>, transient: bool) -> Self {
        Self::Database {
            message: message.into(),
            transient,
        }
    }

    /// Build a validation error without a named field
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            field: None,
            message: message.into(),
        }
    }

    /// Build a validation error against a named field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Build a not-found error
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Build a parsing error for a named metadata field
    pub fn parsing(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parsing {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the retry wrapper may retry this failure
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database { transient: true, .. })
    }
}

impl From<reqwest::Error> for MemoryError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .map(|s| s.as_u16() == 502 || s.as_u16() == 503)
                .unwrap_or(false);
        Self::Database {
            message: err.to_string(),
            transient,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
