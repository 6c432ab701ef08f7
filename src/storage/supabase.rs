//! Supabase audit store.
//!
//! Writes verification records to the `consent_verifications` table through
//! Supabase's PostgREST API.
//!
//! ## Design
//! - Service-key authentication (server-side only)
//! - `Prefer: return=representation` so the inserted row's `id` comes back
//! - HTTP client timeout bounds every write; transport failures map onto
//!   [`StorageError`] so the service can degrade

use super::VerificationStore;
use crate::consent::error::StorageError;
use crate::consent::types::VerificationRecord;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const VERIFICATIONS_TABLE: &str = "consent_verifications";

// ── Configuration ────────────────────────────────────────────────

/// Supabase connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SupabaseConfig {
    /// Supabase project URL (e.g., https://xxxx.supabase.co).
    pub url: String,
    /// Supabase service role key (server-side, never exposed to client).
    pub service_key: String,
}

impl SupabaseConfig {
    /// Build from `SUPABASE_URL` / `SUPABASE_SERVICE_KEY` / `SUPABASE_ANON_KEY`
    /// read through `lookup`. Returns `None` unless URL and service key are set.
    pub fn from_lookup<F>(lookup: &F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("SUPABASE_URL")?;
        let service_key = lookup("SUPABASE_SERVICE_KEY")?;

        if url.is_empty() || service_key.is_empty() {
            return None;
        }

        Some(Self {
            url: url.trim_end_matches('/').to_string(),
            service_key,
        })
    }
}

/// Row returned by PostgREST after an insert.
#[derive(Debug, Deserialize)]
struct InsertedRow {
    id: serde_json::Value,
}

// ── Store ────────────────────────────────────────────────────────

pub struct SupabaseStore {
    config: SupabaseConfig,
    http: reqwest::Client,
    timeout_ms: u64,
}

impl SupabaseStore {
    /// Create a new Supabase store whose requests time out after `timeout_ms`.
    pub fn new(config: SupabaseConfig, timeout_ms: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;

        Ok(Self {
            config,
            http,
            timeout_ms,
        })
    }

    /// Build the PostgREST URL for a table.
    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url, table)
    }

    /// Get the base headers for authenticated requests.
    fn auth_headers(&self) -> Vec<(&str, String)> {
        vec![
            ("apikey", self.config.service_key.clone()),
            (
                "Authorization",
                format!("Bearer {}", self.config.service_key),
            ),
        ]
    }

    fn transport_error(&self, err: reqwest::Error) -> StorageError {
        if err.is_timeout() {
            StorageError::Timeout(self.timeout_ms)
        } else if err.is_connect() {
            StorageError::Unavailable(err.to_string())
        } else {
            StorageError::Backend(err.to_string())
        }
    }
}

#[async_trait]
impl VerificationStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn insert_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<String, StorageError> {
        let mut request = self
            .http
            .post(self.table_url(VERIFICATIONS_TABLE))
            .json(record)
            .header("Prefer", "return=representation");

        for (key, value) in self.auth_headers() {
            request = request.header(key, value);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Backend(format!(
                "Insert into {VERIFICATIONS_TABLE} failed ({status}): {body}"
            )));
        }

        let rows: Vec<InsertedRow> = resp
            .json()
            .await
            .map_err(|e| StorageError::Backend(format!("Unreadable insert response: {e}")))?;

        match rows.into_iter().next().map(|row| row.id) {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(id),
            Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
            _ => Err(StorageError::Backend(
                "Insert returned no row id".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::types::{ConsentLevel, SuggestedAction};
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> SupabaseConfig {
        SupabaseConfig {
            url: url.into(),
            service_key: "test-service-key".into(),
        }
    }

    fn record() -> VerificationRecord {
        VerificationRecord {
            id: None,
            sender_id: "u1".into(),
            recipient_id: "u2".into(),
            message_type: "image".into(),
            context: "chat".into(),
            consent_level: ConsentLevel::Explicit,
            confidence: 70,
            keywords: vec!["si".into()],
            requires_confirmation: true,
            suggested_action: SuggestedAction::Confirm,
            explanation: "explicit rule: affirmative terms [si]".into(),
            verified: false,
            analyzed_at: Utc::now(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn table_url_construction() {
        let store = SupabaseStore::new(test_config("https://test-project.supabase.co"), 1000).unwrap();
        assert_eq!(
            store.table_url(VERIFICATIONS_TABLE),
            "https://test-project.supabase.co/rest/v1/consent_verifications"
        );
    }

    #[test]
    fn auth_headers_contain_key() {
        let store = SupabaseStore::new(test_config("https://x.supabase.co"), 1000).unwrap();
        let headers = store.auth_headers();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "apikey");
        assert_eq!(headers[0].1, "test-service-key");
        assert!(headers[1].1.starts_with("Bearer "));
    }

    #[test]
    fn config_from_lookup_requires_url_and_key() {
        let only_url = |key: &str| (key == "SUPABASE_URL").then(|| "https://x.supabase.co".to_string());
        assert!(SupabaseConfig::from_lookup(&only_url).is_none());

        let full = |key: &str| match key {
            "SUPABASE_URL" => Some("https://x.supabase.co/".to_string()),
            "SUPABASE_SERVICE_KEY" => Some("k".to_string()),
            _ => None,
        };
        let config = SupabaseConfig::from_lookup(&full).unwrap();
        assert_eq!(config.url, "https://x.supabase.co");
    }

    #[test]
    fn config_carries_only_server_side_credentials() {
        let config = test_config("https://x.supabase.co");
        let json = serde_json::to_value(&config).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["service_key", "url"]);
    }

    #[test]
    fn record_serialization_omits_unassigned_id() {
        let json = serde_json::to_value(record()).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["consent_level"], "explicit");
        assert_eq!(json["suggested_action"], "confirm");
    }

    #[tokio::test]
    async fn insert_returns_backend_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/consent_verifications"))
            .and(header("apikey", "test-service-key"))
            .and(header("Prefer", "return=representation"))
            .and(body_partial_json(serde_json::json!({"sender_id": "u1", "recipient_id": "u2"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!([{"id": "3f1c2d7e-row"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri()), 2000).unwrap();
        let id = store.insert_verification_record(&record()).await.unwrap();
        assert_eq!(id, "3f1c2d7e-row");
    }

    #[tokio::test]
    async fn numeric_ids_are_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([{"id": 42}])))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri()), 2000).unwrap();
        assert_eq!(store.insert_verification_record(&record()).await.unwrap(), "42");
    }

    #[tokio::test]
    async fn rejected_write_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri()), 2000).unwrap();
        let err = store.insert_verification_record(&record()).await.unwrap_err();
        match err {
            StorageError::Backend(msg) => assert!(msg.contains("403")),
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_representation_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(test_config(&server.uri()), 2000).unwrap();
        let err = store.insert_verification_record(&record()).await.unwrap_err();
        assert_eq!(err.kind(), "backend_error");
    }

    #[tokio::test]
    async fn unreachable_backend_is_not_a_panic() {
        // Port 9 (discard) is closed on test hosts; connection is refused.
        let store = SupabaseStore::new(test_config("http://127.0.0.1:9"), 500).unwrap();
        let err = store.insert_verification_record(&record()).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Unavailable(_) | StorageError::Timeout(_)
        ));
    }
}
