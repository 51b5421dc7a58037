//! Module system traits and shared types
//!
//! Defines the tenant state model, the error taxonomy returned to callers, and
//! the storage seam the resolver commits through.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::utils::retry::IsRetryable;

/// Requested direction of a module state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleAction {
    /// Turn the module on
    Activate,
    /// Turn the module off
    Deactivate,
}

impl ModuleAction {
    /// Map a desired `is_active` value to the matching action
    pub fn from_desired(desired_active: bool) -> Self {
        if desired_active {
            ModuleAction::Activate
        } else {
            ModuleAction::Deactivate
        }
    }

    /// The `is_active` value this action leads to
    pub fn desired_active(self) -> bool {
        matches!(self, ModuleAction::Activate)
    }
}

impl fmt::Display for ModuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleAction::Activate => write!(f, "activate"),
            ModuleAction::Deactivate => write!(f, "deactivate"),
        }
    }
}

impl std::str::FromStr for ModuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "activate" | "on" | "enable" => Ok(ModuleAction::Activate),
            "deactivate" | "off" | "disable" => Ok(ModuleAction::Deactivate),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// Per-tenant, per-module state
///
/// `is_subscribed` is owned by billing; `is_active` is the only flag the
/// resolver flips. `version` increases each time `is_active` changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantModuleState {
    /// Commercial entitlement (input fact)
    pub is_subscribed: bool,
    /// Operational on/off flag
    pub is_active: bool,
    /// Number of activation flips applied to this module
    pub version: u64,
}

/// All module states of a single tenant, as read at one point in time
///
/// `version` is the tenant-wide optimistic concurrency token: every
/// successful write to the tenant bumps it, so two commits that read the
/// same snapshot cannot both land.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    pub tenant_id: String,
    pub version: u64,
    pub modules: BTreeMap<String, TenantModuleState>,
}

impl TenantSnapshot {
    /// Empty snapshot for a tenant that has never been written
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            version: 0,
            modules: BTreeMap::new(),
        }
    }

    /// Builder used by seeding code and tests
    pub fn with_module(mut self, key: &str, is_subscribed: bool, is_active: bool) -> Self {
        self.modules.insert(
            key.to_string(),
            TenantModuleState {
                is_subscribed,
                is_active,
                version: 0,
            },
        );
        self
    }

    /// State of a module; absent modules are neither subscribed nor active
    pub fn module(&self, key: &str) -> TenantModuleState {
        self.modules.get(key).copied().unwrap_or_default()
    }

    #[inline]
    pub fn is_active(&self, key: &str) -> bool {
        self.modules.get(key).map_or(false, |m| m.is_active)
    }

    #[inline]
    pub fn is_subscribed(&self, key: &str) -> bool {
        self.modules.get(key).map_or(false, |m| m.is_subscribed)
    }

    /// Keys of all active modules, sorted
    pub fn active_modules(&self) -> BTreeSet<String> {
        self.modules
            .iter()
            .filter(|(_, m)| m.is_active)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Whether the tenant has ever been persisted
    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }
}

/// Audit trail entry written together with every applied activation change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub module: String,
    pub actor: String,
    pub previous: TenantModuleState,
    pub next: TenantModuleState,
    /// Tenant version after the commit (unique per tenant)
    pub tenant_version: u64,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
}

/// Storage seam for tenant module state
///
/// Implemented by `storage::TenantStore`. The resolver never writes
/// anything except through `commit`.
pub trait TenantStateStore: Send + Sync {
    /// Load the current snapshot (an empty one if the tenant is unknown)
    fn load(&self, tenant_id: &str) -> Result<TenantSnapshot, ModuleError>;

    /// Replace `expected` with `next` (plus the audit record, if any) in one
    /// transaction. Returns `false` without writing if the stored snapshot
    /// no longer equals `expected`.
    fn commit(
        &self,
        expected: &TenantSnapshot,
        next: &TenantSnapshot,
        audit: Option<&AuditRecord>,
    ) -> Result<bool, ModuleError>;

    /// Audit records of a tenant, oldest first
    fn audit_log(&self, tenant_id: &str) -> Result<Vec<AuditRecord>, ModuleError>;
}

/// Module engine errors
///
/// Every variant is a structured value; `code()` gives a stable identifier
/// for callers that serialize errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Module {module} is not subscribed")]
    NotSubscribed { module: String },

    #[error("Module {module} has unmet dependencies: {}", .missing.join(", "))]
    DependencyUnmet { module: String, missing: Vec<String> },

    #[error("Module {module} is required by active modules: {}", .blockers.join(", "))]
    BlockingDependents { module: String, blockers: Vec<String> },

    #[error("Module {module} cannot be disabled")]
    NotDisableable { module: String },

    #[error("Tenant {tenant} changed since version {expected} was read")]
    VersionConflict { tenant: String, expected: u64 },

    #[error("Module {module} is still active; deactivate it before revoking the subscription")]
    StillActive { module: String },

    #[error("Timeout waiting for commit to complete")]
    Timeout,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModuleError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ModuleError::UnknownModule(_) => "unknown_module",
            ModuleError::NotSubscribed { .. } => "not_subscribed",
            ModuleError::DependencyUnmet { .. } => "dependency_unmet",
            ModuleError::BlockingDependents { .. } => "blocking_dependents",
            ModuleError::NotDisableable { .. } => "not_disableable",
            ModuleError::VersionConflict { .. } => "version_conflict",
            ModuleError::StillActive { .. } => "still_active",
            ModuleError::Timeout => "timeout",
            ModuleError::Storage(_) => "storage",
            ModuleError::Serialization(_) => "serialization",
        }
    }
}

impl IsRetryable for ModuleError {
    /// Only a lost optimistic-concurrency race is worth retrying; every other
    /// rejection needs a different plan from the operator.
    fn is_retryable(&self) -> bool {
        matches!(self, ModuleError::VersionConflict { .. })
    }
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for ModuleError {
    fn from(e: bincode::Error) -> Self {
        ModuleError::Serialization(e.to_string())
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::Storage(e.to_string())
    }
}
