//! Error types for fancat-curator
//!
//! Failures are local to one entity. Batch drivers log them, count them, and
//! move on to the next entity.

use fancat_common::LinkState;
use thiserror::Error;
use uuid::Uuid;

/// Curation error taxonomy
#[derive(Debug, Error)]
pub enum CurationError {
    /// Referenced owner, episode, or entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Score fell below the reject threshold.
    ///
    /// The curation pipeline reports this as a normal `Rejected` outcome; the
    /// correction workflow returns it to refuse a low-confidence correction.
    #[error("Low confidence: score {score} is below reject threshold {threshold}")]
    LowConfidence { score: u8, threshold: i32 },

    /// External URL unreachable or describing a different place
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// More than one active record claims the same place; needs a human
    #[error("Conflicting canonical records (all active): {entity_ids:?}")]
    ConflictingCanonical { entity_ids: Vec<Uuid> },

    /// Collaborator timed out or errored after all retries
    #[error("External lookup unavailable: {0}")]
    ExternalLookupUnavailable(String),

    /// Link lifecycle transition not allowed from the current state
    #[error("Invalid link transition from {from} to {to}")]
    InvalidTransition { from: LinkState, to: LinkState },

    /// Malformed request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// fancat-common error (database, config, validation)
    #[error(transparent)]
    Common(#[from] fancat_common::Error),
}

impl From<sqlx::Error> for CurationError {
    fn from(err: sqlx::Error) -> Self {
        CurationError::Common(fancat_common::Error::Database(err))
    }
}

impl From<serde_json::Error> for CurationError {
    fn from(err: serde_json::Error) -> Self {
        CurationError::Common(fancat_common::Error::Serialization(err))
    }
}

impl CurationError {
    /// Short label used in per-entity outcome lines
    pub fn kind(&self) -> &'static str {
        match self {
            CurationError::NotFound(_) => "not_found",
            CurationError::LowConfidence { .. } => "low_confidence",
            CurationError::VerificationFailed(_) => "verification_failed",
            CurationError::ConflictingCanonical { .. } => "conflicting_canonical",
            CurationError::ExternalLookupUnavailable(_) => "lookup_unavailable",
            CurationError::InvalidTransition { .. } => "invalid_transition",
            CurationError::InvalidInput(_) => "invalid_input",
            CurationError::Common(_) => "internal",
        }
    }
}

/// Result type for curation operations
pub type CurationResult<T> = Result<T, CurationError>;
