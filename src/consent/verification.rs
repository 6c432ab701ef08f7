//! Consent verification before a sensitive send.
//!
//! Runs the analyzer, decides whether the send may proceed unattended, and
//! writes an audit record through the injected [`VerificationStore`].
//!
//! ## Design
//! - Fail-closed: only `explicit` consent with no confirmation requirement
//!   verifies.
//! - Storage failures (unavailable, rejected, timed out) never reach the
//!   caller: the result degrades to `message_id = "pending"` and keeps the
//!   analyzer's verdict.
//! - Missing sender/recipient ids are caller errors and fail fast.
//! - No retries inside a call; callers re-run the whole flow if they want one.

use super::analyzer::ConsentAnalyzer;
use super::error::{ConsentError, StorageError};
use super::types::{
    AnalyzeOptions, ConsentAnalysis, ConsentLevel, ConsentVerificationResult, MessageType,
    VerificationPayload, VerificationRecord, VerificationState, PENDING_MESSAGE_ID,
};
use crate::config::ConsentConfig;
use crate::storage::{create_store, NoopStore, VerificationStore};
use std::sync::Arc;
use std::time::Duration;

/// Default bound for one audit write when none is configured.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(2_000);

const DEFAULT_CONTEXT: &str = "chat";

/// Whether an analysis lets the send flow proceed without the user.
pub fn is_verified(analysis: &ConsentAnalysis) -> bool {
    analysis.consent_level == ConsentLevel::Explicit && !analysis.requires_confirmation
}

pub struct ConsentVerificationService {
    analyzer: ConsentAnalyzer,
    store: Arc<dyn VerificationStore>,
    default_context: String,
    write_timeout: Duration,
}

impl ConsentVerificationService {
    pub fn new(analyzer: ConsentAnalyzer, store: Arc<dyn VerificationStore>) -> Self {
        Self {
            analyzer,
            store,
            default_context: DEFAULT_CONTEXT.to_string(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Service with no audit backend; every result degrades to `"pending"`.
    pub fn without_storage(analyzer: ConsentAnalyzer) -> Self {
        Self::new(analyzer, Arc::new(NoopStore::default()))
    }

    /// Build analyzer and store from config.
    pub fn from_config(config: &ConsentConfig) -> anyhow::Result<Self> {
        let analyzer = ConsentAnalyzer::new(config.thresholds.clone())?;
        let store = create_store(&config.storage);
        tracing::debug!(
            backend = store.name(),
            timeout_ms = config.storage.timeout_ms,
            "Consent verification service ready"
        );
        Ok(Self::new(analyzer, store)
            .with_default_context(config.default_context.clone())
            .with_write_timeout(Duration::from_millis(config.storage.timeout_ms)))
    }

    pub fn with_default_context(mut self, context: impl Into<String>) -> Self {
        self.default_context = context.into();
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Analyze `text`, decide whether the send may proceed and record the
    /// outcome. Only contract violations are returned as errors.
    pub async fn verify_consent_before_send(
        &self,
        sender_id: &str,
        recipient_id: &str,
        text: &str,
        message_type: &str,
        context: Option<&str>,
    ) -> Result<ConsentVerificationResult, ConsentError> {
        let sender_id = sender_id.trim();
        let recipient_id = recipient_id.trim();
        if sender_id.is_empty() {
            return Err(ConsentError::MissingSender);
        }
        if recipient_id.is_empty() {
            return Err(ConsentError::MissingRecipient);
        }

        tracing::debug!(
            sender_id,
            recipient_id,
            state = ?VerificationState::Pending,
            "Consent verification started"
        );

        let context = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(self.default_context.as_str());
        let message_type = MessageType::parse(message_type);
        let analysis = self.analyzer.analyze(
            text,
            context,
            &AnalyzeOptions::with_message_type(message_type.clone()),
        );
        let verified = is_verified(&analysis);

        tracing::debug!(
            sender_id,
            recipient_id,
            consent_level = analysis.consent_level.as_str(),
            confidence = analysis.confidence,
            requires_confirmation = analysis.requires_confirmation,
            verified,
            state = ?VerificationState::Analyzed,
            "Consent analyzed"
        );

        let payload = VerificationPayload {
            message_id: String::new(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            message_type,
            analysis,
            verified,
        };
        let record = VerificationRecord::from_payload(&payload);

        // The verdict survives a failed write unchanged.
        let (message_id, state) = match self.persist(&record).await {
            Ok(id) => (id, VerificationState::Persisted),
            Err(_) => (PENDING_MESSAGE_ID.to_string(), VerificationState::DegradedPersisted),
        };

        Ok(ConsentVerificationResult {
            verified,
            analysis: payload.analysis,
            message_id,
            state,
        })
    }

    /// Write one verification record. Never fails: on any storage problem
    /// the result has `message_id = "pending"` and `verified = false`.
    ///
    /// `payload.message_id` may be an empty placeholder.
    pub async fn save_verification(&self, payload: VerificationPayload) -> ConsentVerificationResult {
        let record = VerificationRecord::from_payload(&payload);

        match self.persist(&record).await {
            Ok(message_id) => ConsentVerificationResult {
                verified: payload.verified,
                analysis: payload.analysis,
                message_id,
                state: VerificationState::Persisted,
            },
            Err(_) => ConsentVerificationResult {
                verified: false,
                analysis: payload.analysis,
                message_id: PENDING_MESSAGE_ID.to_string(),
                state: VerificationState::DegradedPersisted,
            },
        }
    }

    /// One bounded write attempt. Logs the outcome; callers only branch on it.
    async fn persist(&self, record: &VerificationRecord) -> Result<String, StorageError> {
        let timeout_ms = u64::try_from(self.write_timeout.as_millis()).unwrap_or(u64::MAX);
        let outcome = match tokio::time::timeout(
            self.write_timeout,
            self.store.insert_verification_record(record),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(timeout_ms)),
        };

        match &outcome {
            Ok(message_id) => tracing::info!(
                backend = self.store.name(),
                message_id = %message_id,
                sender_id = %record.sender_id,
                recipient_id = %record.recipient_id,
                consent_level = record.consent_level.as_str(),
                verified = record.verified,
                "Consent verification persisted"
            ),
            Err(e) => tracing::warn!(
                backend = self.store.name(),
                error_kind = e.kind(),
                error = %e,
                sender_id = %record.sender_id,
                recipient_id = %record.recipient_id,
                consent_level = record.consent_level.as_str(),
                verified = record.verified,
                "Consent verification not persisted, returning degraded result"
            ),
        }

        outcome
    }
}
