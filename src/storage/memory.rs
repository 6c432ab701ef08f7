//! In-process store. Records live as long as the store does.

use super::VerificationStore;
use crate::consent::error::StorageError;
use crate::consent::types::VerificationRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Vec-backed store, handy for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<VerificationRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far, oldest first.
    pub async fn records(&self) -> Vec<VerificationRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<String, StorageError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        self.records.lock().await.push(stored);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::types::{ConsentLevel, SuggestedAction};
    use chrono::Utc;

    fn record(sender: &str) -> VerificationRecord {
        VerificationRecord {
            id: None,
            sender_id: sender.into(),
            recipient_id: "u2".into(),
            message_type: "text".into(),
            context: "chat".into(),
            consent_level: ConsentLevel::Explicit,
            confidence: 70,
            keywords: vec!["si".into()],
            requires_confirmation: false,
            suggested_action: SuggestedAction::Allow,
            explanation: "explicit rule: affirmative terms [si]".into(),
            verified: true,
            analyzed_at: Utc::now(),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn assigns_unique_ids_and_keeps_order() {
        let store = MemoryStore::new();
        let a = store.insert_verification_record(&record("u1")).await.unwrap();
        let b = store.insert_verification_record(&record("u3")).await.unwrap();
        assert_ne!(a, b);

        let records = store.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_deref(), Some(a.as_str()));
        assert_eq!(records[1].sender_id, "u3");
    }

    #[tokio::test]
    async fn clones_share_records() {
        let store = MemoryStore::new();
        let handle = store.clone();
        store.insert_verification_record(&record("u1")).await.unwrap();
        assert_eq!(handle.len().await, 1);
        assert!(!handle.is_empty().await);
    }
}
