#![warn(clippy::all)]

pub mod config;
pub mod consent;
pub mod storage;

pub use config::ConsentConfig;
pub use consent::{
    AnalyzeOptions, ConsentAnalysis, ConsentAnalyzer, ConsentError, ConsentLevel,
    ConsentVerificationResult, ConsentVerificationService, MessageType,
};
pub use storage::VerificationStore;
