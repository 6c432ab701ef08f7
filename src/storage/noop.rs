//! Degraded adapter used when no audit backend is available.

use super::VerificationStore;
use crate::consent::error::StorageError;
use crate::consent::types::VerificationRecord;
use async_trait::async_trait;

/// Store that refuses every write with [`StorageError::Unavailable`].
#[derive(Debug, Clone)]
pub struct NoopStore {
    reason: String,
}

impl NoopStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for NoopStore {
    fn default() -> Self {
        Self::new("no storage backend configured")
    }
}

#[async_trait]
impl VerificationStore for NoopStore {
    fn name(&self) -> &str {
        "noop"
    }

    async fn insert_verification_record(
        &self,
        _record: &VerificationRecord,
    ) -> Result<String, StorageError> {
        Err(StorageError::Unavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::analyzer::ConsentAnalyzer;
    use crate::consent::types::{AnalyzeOptions, MessageType, VerificationPayload};

    #[tokio::test]
    async fn rejection_carries_configured_reason() {
        let analysis = ConsentAnalyzer::default().analyze("ok", "chat", &AnalyzeOptions::default());
        let record = VerificationRecord::from_payload(&VerificationPayload {
            message_id: String::new(),
            sender_id: "u1".into(),
            recipient_id: "u2".into(),
            message_type: MessageType::Text,
            analysis,
            verified: true,
        });

        let err = NoopStore::new("storage disabled by config")
            .insert_verification_record(&record)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::Unavailable("storage disabled by config".into())
        );
    }
}
