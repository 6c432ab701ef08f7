//! SQLite-backed audit store.
//!
//! Table: `consent_verifications` (one row per verification attempt that
//! reached the backend). Rows are append-only; the oldest rows are pruned
//! once `max_records` is exceeded.

use super::VerificationStore;
use crate::consent::error::StorageError;
use crate::consent::types::{ConsentLevel, SuggestedAction, VerificationRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;

/// Filters for listing stored verifications.
#[derive(Debug, Clone, Default)]
pub struct VerificationQuery {
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    pub consent_level: Option<ConsentLevel>,
    pub verified: Option<bool>,
    /// Records written at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Maximum results to return (default 100).
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    max_records: usize,
}

impl SqliteStore {
    /// Open (or create) the audit database at `db_path`.
    pub fn open(db_path: &Path, max_records: usize) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit dir: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open audit DB: {}", db_path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA busy_timeout = 1000;
             PRAGMA temp_store   = MEMORY;",
        )
        .with_context(|| format!("Failed to configure audit DB: {}", db_path.display()))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_records,
        })
    }

    /// In-memory database, for tests and throwaway runs.
    pub fn in_memory(max_records: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_records,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS consent_verifications (
                seq                   INTEGER PRIMARY KEY AUTOINCREMENT,
                id                    TEXT NOT NULL UNIQUE,
                sender_id             TEXT NOT NULL,
                recipient_id          TEXT NOT NULL,
                message_type          TEXT NOT NULL DEFAULT 'text',
                context               TEXT NOT NULL DEFAULT '',
                consent_level         TEXT NOT NULL,
                confidence            INTEGER NOT NULL,
                keywords              TEXT NOT NULL DEFAULT '[]',
                requires_confirmation INTEGER NOT NULL,
                suggested_action      TEXT NOT NULL,
                explanation           TEXT NOT NULL DEFAULT '',
                verified              INTEGER NOT NULL,
                analyzed_at           TEXT NOT NULL,
                recorded_at           TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_consent_sender ON consent_verifications(sender_id);
            CREATE INDEX IF NOT EXISTS idx_consent_recipient ON consent_verifications(recipient_id);
            CREATE INDEX IF NOT EXISTS idx_consent_recorded_at ON consent_verifications(recorded_at);",
        )
        .context("Failed to create consent_verifications schema")?;
        Ok(())
    }

    /// Synchronous insert; the async trait method runs this on the blocking pool.
    pub fn insert_blocking(&self, record: &VerificationRecord) -> Result<String, StorageError> {
        insert_row(&self.conn.lock(), record, self.max_records)
    }

    /// List stored verifications, newest first.
    pub fn query(&self, q: &VerificationQuery) -> Result<Vec<VerificationRecord>> {
        let conn = self.conn.lock();

        let mut sql = String::from(
            "SELECT id, sender_id, recipient_id, message_type, context, consent_level,
                    confidence, keywords, requires_confirmation, suggested_action,
                    explanation, verified, analyzed_at, recorded_at
             FROM consent_verifications WHERE 1=1",
        );
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut param_idx = 1;

        if let Some(ref sender_id) = q.sender_id {
            sql.push_str(&format!(" AND sender_id = ?{param_idx}"));
            bind_values.push(Box::new(sender_id.clone()));
            param_idx += 1;
        }
        if let Some(ref recipient_id) = q.recipient_id {
            sql.push_str(&format!(" AND recipient_id = ?{param_idx}"));
            bind_values.push(Box::new(recipient_id.clone()));
            param_idx += 1;
        }
        if let Some(level) = q.consent_level {
            sql.push_str(&format!(" AND consent_level = ?{param_idx}"));
            bind_values.push(Box::new(level.as_str()));
            param_idx += 1;
        }
        if let Some(verified) = q.verified {
            sql.push_str(&format!(" AND verified = ?{param_idx}"));
            bind_values.push(Box::new(verified));
            param_idx += 1;
        }
        if let Some(ref since) = q.since {
            sql.push_str(&format!(" AND recorded_at >= ?{param_idx}"));
            bind_values.push(Box::new(since.to_rfc3339()));
            param_idx += 1;
        }

        sql.push_str(" ORDER BY seq DESC");

        let limit = q.limit.unwrap_or(100);
        sql.push_str(&format!(" LIMIT ?{param_idx}"));
        bind_values.push(Box::new(limit));
        param_idx += 1;

        if let Some(offset) = q.offset {
            sql.push_str(&format!(" OFFSET ?{param_idx}"));
            bind_values.push(Box::new(offset));
        }

        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            let keywords: String = row.get(7)?;
            Ok(VerificationRecord {
                id: Some(row.get(0)?),
                sender_id: row.get(1)?,
                recipient_id: row.get(2)?,
                message_type: row.get(3)?,
                context: row.get(4)?,
                consent_level: ConsentLevel::from_str_lossy(&row.get::<_, String>(5)?),
                confidence: row.get::<_, i64>(6)?.clamp(0, 100) as u8,
                keywords: serde_json::from_str(&keywords).unwrap_or_default(),
                requires_confirmation: row.get(8)?,
                suggested_action: SuggestedAction::from_str_lossy(&row.get::<_, String>(9)?),
                explanation: row.get(10)?,
                verified: row.get(11)?,
                analyzed_at: parse_timestamp(row.get::<_, String>(12)?),
                recorded_at: parse_timestamp(row.get::<_, String>(13)?),
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM consent_verifications", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}

fn parse_timestamp(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn insert_row(
    conn: &Connection,
    record: &VerificationRecord,
    max_records: usize,
) -> Result<String, StorageError> {
    let id = uuid::Uuid::new_v4().to_string();
    let keywords = serde_json::to_string(&record.keywords)
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    conn.execute(
        "INSERT INTO consent_verifications
            (id, sender_id, recipient_id, message_type, context, consent_level,
             confidence, keywords, requires_confirmation, suggested_action,
             explanation, verified, analyzed_at, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            id,
            record.sender_id,
            record.recipient_id,
            record.message_type,
            record.context,
            record.consent_level.as_str(),
            i64::from(record.confidence),
            keywords,
            record.requires_confirmation,
            record.suggested_action.as_str(),
            record.explanation,
            record.verified,
            record.analyzed_at.to_rfc3339(),
            record.recorded_at.to_rfc3339(),
        ],
    )?;

    prune_if_needed(conn, max_records)?;

    Ok(id)
}

fn prune_if_needed(conn: &Connection, max_records: usize) -> Result<(), StorageError> {
    if max_records == 0 {
        return Ok(());
    }

    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM consent_verifications",
        [],
        |row| row.get(0),
    )?;

    let max_records = i64::try_from(max_records).unwrap_or(i64::MAX);
    if count > max_records {
        let excess = count - max_records;
        conn.execute(
            "DELETE FROM consent_verifications WHERE seq IN (
                SELECT seq FROM consent_verifications ORDER BY seq ASC LIMIT ?1
            )",
            params![excess],
        )?;
    }

    Ok(())
}

#[async_trait]
impl VerificationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<String, StorageError> {
        let conn = Arc::clone(&self.conn);
        let record = record.clone();
        let max_records = self.max_records;

        tokio::task::spawn_blocking(move || insert_row(&conn.lock(), &record, max_records))
            .await
            .map_err(|e| StorageError::Backend(format!("audit write task failed: {e}")))?
    }
}
