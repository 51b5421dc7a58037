//! Configuration management for the module engine
//!
//! Handles configuration loading (TOML or JSON) and validation.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Module catalog source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Seed file (`.toml`/`.json`) or directory of `module.toml` manifests
    #[serde(default = "default_catalog_path")]
    pub path: String,
}

fn default_catalog_path() -> String {
    "catalog/clinic.toml".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database backend selection
    #[serde(default = "default_database_backend")]
    pub database_backend: DatabaseBackendConfig,

    /// Storage path
    #[serde(default = "default_storage_path")]
    pub data_dir: String,
}

/// Database backend configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackendConfig {
    /// Process-local, lost on exit
    Memory,
    /// Use sled database (fallback)
    Sled,
    /// Use redb database (default, recommended)
    Redb,
    /// Auto-select based on availability
    Auto,
}

fn default_database_backend() -> DatabaseBackendConfig {
    DatabaseBackendConfig::Auto
}

fn default_storage_path() -> String {
    "data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_backend: DatabaseBackendConfig::Auto,
            data_dir: "data".to_string(),
        }
    }
}

/// Commit behaviour of the async engine wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound for a single commit (milliseconds)
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,

    /// Attempts after a version conflict (0 = never retry)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay (milliseconds), doubled on each retry
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
}

fn default_commit_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    10
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: 5_000,
            max_retries: 3,
            retry_initial_delay_ms: 10,
        }
    }
}

impl ResolverConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive (e.g. "info,clinic_modules=debug"); RUST_LOG wins
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

impl EngineConfig {
    /// Load configuration from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: EngineConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(anyhow::anyhow!(
                    "Unsupported config format {:?} for {}",
                    other,
                    path.display()
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.catalog.path.trim().is_empty() {
            return Err(anyhow::anyhow!("catalog.path must not be empty"));
        }

        if self.storage.database_backend != DatabaseBackendConfig::Memory
            && self.storage.data_dir.trim().is_empty()
        {
            return Err(anyhow::anyhow!(
                "storage.data_dir must not be empty for a persistent backend"
            ));
        }

        if self.resolver.commit_timeout_ms == 0 {
            return Err(anyhow::anyhow!(
                "resolver.commit_timeout_ms must be greater than 0"
            ));
        }

        if self.resolver.max_retries > 0 && self.resolver.retry_initial_delay_ms == 0 {
            return Err(anyhow::anyhow!(
                "resolver.retry_initial_delay_ms must be greater than 0 when retries are enabled"
            ));
        }

        #[cfg(not(feature = "json-logging"))]
        if self.logging.json_format {
            return Err(anyhow::anyhow!(
                "logging.json_format requires the 'json-logging' feature to be enabled"
            ));
        }

        Ok(())
    }
}
