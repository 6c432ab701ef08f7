//! Consent inference engine.
//!
//! Classifies a chat message's consent signal before a sensitive message is
//! sent, and records the classification as an auditable verification.
//!
//! ## Components
//! - [`ConsentAnalyzer`]: pure, deterministic keyword-rule classifier
//! - [`ConsentVerificationService`]: runs the analyzer, applies the
//!   fail-closed send policy and persists the outcome, degrading to an
//!   in-memory verdict when storage is unreachable

pub mod analyzer;
pub mod error;
pub mod normalize;
pub mod rules;
pub mod types;
pub mod verification;

pub use analyzer::{ConsentAnalyzer, ConsentThresholds};
pub use error::{ConsentError, StorageError, ThresholdError};
pub use types::{
    AnalyzeOptions, ConsentAnalysis, ConsentLevel, ConsentVerificationResult, MessageType,
    SuggestedAction, VerificationPayload, VerificationRecord, VerificationState,
    PENDING_MESSAGE_ID,
};
pub use verification::{is_verified, ConsentVerificationService};
