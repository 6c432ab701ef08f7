//! Audit backends for consent verification records.
//!
//! The verification service only sees the [`VerificationStore`] capability.
//! Which adapter sits behind it is decided once, at startup, by
//! [`create_store`]:
//! - `none` → [`NoopStore`] (every write degrades to `"pending"`)
//! - `memory` → [`MemoryStore`]
//! - `sqlite` → [`SqliteStore`]
//! - `supabase` → [`SupabaseStore`]
//!
//! A backend that cannot be opened is replaced by [`NoopStore`] with a
//! warning; consent checks keep working without an audit trail.

pub mod memory;
pub mod noop;
pub mod sqlite;
pub mod supabase;

pub use memory::MemoryStore;
pub use noop::NoopStore;
pub use sqlite::{SqliteStore, VerificationQuery};
pub use supabase::{SupabaseConfig, SupabaseStore};

use crate::config::{StorageBackend, StorageConfig};
use crate::consent::error::StorageError;
use crate::consent::types::VerificationRecord;
use async_trait::async_trait;
use std::sync::Arc;

/// Durable sink for verification records.
///
/// Implementations own their connection lifecycle and should bound their own
/// I/O; the service additionally wraps each call in a timeout.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Write one record and return its backend-assigned id.
    async fn insert_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<String, StorageError>;
}

/// Build the configured store, degrading to [`NoopStore`] when the backend
/// cannot be set up.
pub fn create_store(config: &StorageConfig) -> Arc<dyn VerificationStore> {
    match config.backend {
        StorageBackend::None => Arc::new(NoopStore::new("storage disabled by config")),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sqlite => {
            let opened = config
                .resolved_sqlite_path()
                .and_then(|path| SqliteStore::open(&path, config.max_records));
            match opened {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(
                        error = %format!("{e:#}"),
                        "SQLite audit store unavailable, continuing without audit trail"
                    );
                    Arc::new(NoopStore::new("sqlite store could not be opened"))
                }
            }
        }
        StorageBackend::Supabase => {
            let Some(supabase) = config.supabase.clone() else {
                tracing::warn!(
                    "Supabase backend selected but SUPABASE_URL/SUPABASE_SERVICE_KEY are not set"
                );
                return Arc::new(NoopStore::new("supabase not configured"));
            };
            match SupabaseStore::new(supabase, config.timeout_ms) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Supabase client could not be built, continuing without audit trail"
                    );
                    Arc::new(NoopStore::new("supabase client could not be built"))
                }
            }
        }
    }
}
