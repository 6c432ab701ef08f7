//! Error types for the consent engine.
//!
//! The analyzer has no error type: it is total over its input. Storage
//! failures are absorbed by the verification service; only contract
//! violations reach the send flow.

use thiserror::Error;

/// Caller mistakes that would produce an unattributable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsentError {
    #[error("sender id is required for consent verification")]
    MissingSender,
    #[error("recipient id is required for consent verification")]
    MissingRecipient,
}

/// Why an audit write did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No backend configured, or it could not be reached.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    /// Backend answered but rejected or failed the write.
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("storage write timed out after {0} ms")]
    Timeout(u64),
}

impl StorageError {
    /// Short tag for structured logs and audit fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Backend(_) => "backend_error",
            Self::Timeout(_) => "timeout",
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Heuristic thresholds that would break the analyzer's invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThresholdError {
    #[error("{name} must be at most 100, got {value}")]
    OutOfRange { name: &'static str, value: u8 },
    #[error("negative_base must be at least 70, got {0}")]
    NegativeTooLow(u8),
    #[error("explicit_base must be above 50, got {0}")]
    ExplicitTooLow(u8),
    #[error("ambiguous_ceiling must be at most 50, got {0}")]
    AmbiguousTooHigh(u8),
    #[error("ambiguous_base ({base}) must not exceed ambiguous_ceiling ({ceiling})")]
    AmbiguousBaseAboveCeiling { base: u8, ceiling: u8 },
}
