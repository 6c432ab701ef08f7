//! Configuration for the consent engine.
//!
//! Loaded from `~/.consent-guard/config.toml` (or an explicit path), then
//! overlaid with environment variables. Every field has a default, so a
//! missing file is not an error.

use crate::consent::analyzer::ConsentThresholds;
use crate::storage::supabase::SupabaseConfig;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under the user's home holding config and the local database.
const APP_DIR: &str = ".consent-guard";

const CONFIG_FILE: &str = "config.toml";

const DEFAULT_DB_FILE: &str = "verifications.db";

const DEFAULT_CONTEXT: &str = "chat";

/// Upper bound for one audit write.
const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 2_000;

/// Records kept by the SQLite backend before the oldest are pruned.
const DEFAULT_MAX_RECORDS: usize = 100_000;

/// Mask printed in place of secrets.
const REDACTED: &str = "***";

// ── Storage ──────────────────────────────────────────────────────

/// Which audit backend to write verification records to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// No backend; every verification degrades to `"pending"`.
    None,
    /// In-process only; lost on exit.
    Memory,
    /// Local SQLite database.
    Sqlite,
    /// Supabase PostgREST table.
    Supabase,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Supabase => "supabase",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "disabled" => Some(Self::None),
            "memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            "supabase" => Some(Self::Supabase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database path; `~` is expanded. Defaults to
    /// `~/.consent-guard/verifications.db`.
    pub sqlite_path: Option<String>,
    /// Timeout for one audit write, in milliseconds.
    pub timeout_ms: u64,
    /// Retention cap for the SQLite backend.
    pub max_records: usize,
    pub supabase: Option<SupabaseConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path: None,
            timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
            max_records: DEFAULT_MAX_RECORDS,
            supabase: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the SQLite database path, expanding `~`.
    pub fn resolved_sqlite_path(&self) -> Result<PathBuf> {
        match &self.sqlite_path {
            Some(raw) => {
                let expanded = shellexpand::tilde(raw);
                Ok(PathBuf::from(expanded.as_ref()))
            }
            None => Ok(app_dir()?.join(DEFAULT_DB_FILE)),
        }
    }
}

// ── Top-level config ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ConsentConfig {
    /// Context tag used when the caller does not supply one.
    pub default_context: String,
    pub thresholds: ConsentThresholds,
    pub storage: StorageConfig,
    /// Where this config was loaded from (not serialized).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            default_context: DEFAULT_CONTEXT.to_string(),
            thresholds: ConsentThresholds::default(),
            storage: StorageConfig::default(),
            config_path: None,
        }
    }
}

impl ConsentConfig {
    /// Load config from `path` (or the default location), apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().ok(),
        };

        let mut config = match &path {
            Some(p) if p.exists() => {
                let contents = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config: {}", p.display()))?;
                let mut config = Self::from_toml_str(&contents)
                    .with_context(|| format!("Failed to parse config: {}", p.display()))?;
                config.config_path = Some(p.clone());
                config
            }
            _ => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy safe to print: secrets are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(supabase) = copy.storage.supabase.as_mut() {
            if !supabase.service_key.is_empty() {
                supabase.service_key = REDACTED.to_string();
            }
        }
        copy
    }

    /// JSON schema of the config file, for editors and docs.
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(ConsentConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    /// Overlay environment variables, read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CONSENT_GUARD_STORAGE") {
            match StorageBackend::parse(&raw) {
                Some(backend) => self.storage.backend = backend,
                None => tracing::warn!(value = %raw, "Ignoring unknown CONSENT_GUARD_STORAGE"),
            }
        }
        if let Some(path) = lookup("CONSENT_GUARD_DB").filter(|p| !p.trim().is_empty()) {
            self.storage.sqlite_path = Some(path);
        }
        if let Some(raw) = lookup("CONSENT_GUARD_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.storage.timeout_ms = ms,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid CONSENT_GUARD_TIMEOUT_MS"),
            }
        }
        if let Some(supabase) = SupabaseConfig::from_lookup(&lookup) {
            self.storage.supabase = Some(supabase);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds
            .validate()
            .context("Invalid consent thresholds")?;
        if self.storage.timeout_ms == 0 {
            anyhow::bail!("storage.timeout_ms must be greater than zero");
        }
        if self.default_context.trim().is_empty() {
            anyhow::bail!("default_context must not be empty");
        }
        Ok(())
    }
}

fn app_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(APP_DIR))
}

/// `~/.consent-guard/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join(CONFIG_FILE))
}
