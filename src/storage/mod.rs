//! Storage layer for tenant module state
//!
//! This module provides persistent storage for tenant snapshots and the
//! activation audit trail. Supports multiple database backends via feature
//! flags (redb, sled) plus a process-local memory backend.

pub mod database;
pub mod tenantstore;

pub use tenantstore::TenantStore;

use anyhow::Result;
use database::{create_database, default_backend, fallback_backend, Database, DatabaseBackend};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{DatabaseBackendConfig, StorageConfig};

/// Storage manager that owns the database and the stores built on it
pub struct Storage {
    db: Arc<dyn Database>,
    backend: DatabaseBackend,
    tenants: Arc<TenantStore>,
}

impl Storage {
    /// Create a new storage instance with default backend
    ///
    /// Attempts to use the default backend (redb), and gracefully falls back
    /// to sled if redb fails and sled is available.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let default = default_backend();

        match Self::with_backend(data_dir.as_ref(), default) {
            Ok(storage) => Ok(storage),
            Err(e) => {
                if let Some(fallback_backend) = fallback_backend(default) {
                    warn!(
                        "Failed to initialize {:?} backend: {}. Falling back to {:?}.",
                        default, e, fallback_backend
                    );
                    Self::with_backend(data_dir, fallback_backend)
                } else {
                    Err(anyhow::anyhow!(
                        "Failed to initialize {:?} backend: {}. No fallback backend available.",
                        default,
                        e
                    ))
                }
            }
        }
    }

    /// Create a new storage instance with specified backend
    pub fn with_backend<P: AsRef<Path>>(data_dir: P, backend: DatabaseBackend) -> Result<Self> {
        let db: Arc<dyn Database> = Arc::from(create_database(data_dir.as_ref(), backend)?);
        let tenants = Arc::new(TenantStore::new(Arc::clone(&db))?);
        info!(
            "Storage initialized with {:?} backend at {}",
            backend,
            data_dir.as_ref().display()
        );
        Ok(Self {
            db,
            backend,
            tenants,
        })
    }

    /// Process-local storage, nothing persisted
    pub fn in_memory() -> Result<Self> {
        Self::with_backend("", DatabaseBackend::Memory)
    }

    /// Open storage as described by the configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.database_backend {
            DatabaseBackendConfig::Auto => Self::new(&config.data_dir),
            DatabaseBackendConfig::Memory => Self::in_memory(),
            DatabaseBackendConfig::Sled => Self::with_backend(&config.data_dir, DatabaseBackend::Sled),
            DatabaseBackendConfig::Redb => Self::with_backend(&config.data_dir, DatabaseBackend::Redb),
        }
    }

    /// Backend actually in use (after any fallback)
    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    /// Get the tenant state store (as Arc for sharing)
    pub fn tenants(&self) -> Arc<TenantStore> {
        Arc::clone(&self.tenants)
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()
    }
}
