//! Permission model for module access
//!
//! Implements whitelist-only access control on top of the tenant's active
//! module set. The gate never reads shared state: callers hand it the set of
//! active modules they captured.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Permission string that grants every module
pub const UNIVERSAL_PERMISSION: &str = "*";

/// User role within a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// Clinic administrator: every active module
    Administrator,
    /// Staff member: active modules they were granted
    Member,
    /// Any role this engine does not know about
    Other(String),
}

impl std::str::FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "admin" | "administrator" => Role::Administrator,
            "member" | "user" => Role::Member,
            _ => Role::Other(s.to_string()),
        })
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Administrator => write!(f, "administrator"),
            Role::Member => write!(f, "member"),
            Role::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Set of module keys granted to a user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    permissions: HashSet<String>,
}

impl PermissionSet {
    /// Create a new empty permission set
    pub fn new() -> Self {
        Self {
            permissions: HashSet::new(),
        }
    }

    /// Create a permission set from a vector
    pub fn from_vec<S: Into<String>>(permissions: Vec<S>) -> Self {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// A set holding only the universal permission
    pub fn universal() -> Self {
        Self::from_vec(vec![UNIVERSAL_PERMISSION])
    }

    /// Add a permission
    pub fn add(&mut self, permission: impl Into<String>) {
        self.permissions.insert(permission.into());
    }

    /// Check if access to `key` is granted, directly or through `"*"`
    pub fn has(&self, key: &str) -> bool {
        self.permissions.contains(UNIVERSAL_PERMISSION) || self.permissions.contains(key)
    }

    /// Get all permissions, sorted
    pub fn to_vec(&self) -> Vec<String> {
        let mut all: Vec<String> = self.permissions.iter().cloned().collect();
        all.sort();
        all
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            permissions: iter.into_iter().collect(),
        }
    }
}

/// Pure access predicate
pub struct AccessGate;

impl AccessGate {
    /// Whether a user with `role` and `permissions` may use `key`, given the
    /// tenant's active modules
    #[inline]
    pub fn can_access(
        role: &Role,
        active_modules: &BTreeSet<String>,
        permissions: &PermissionSet,
        key: &str,
    ) -> bool {
        let allowed = match role {
            Role::Administrator => active_modules.contains(key),
            Role::Member => active_modules.contains(key) && permissions.has(key),
            Role::Other(_) => false,
        };
        debug!("Access check {} for role {}: {}", key, role, allowed);
        allowed
    }
}

/// Role, permissions and active-module set captured at one point in time
///
/// The active set is shared and immutable; a new snapshot is derived after
/// every successful commit instead of mutating this one.
#[derive(Debug, Clone)]
pub struct AccessSnapshot {
    role: Role,
    permissions: PermissionSet,
    active_modules: Arc<BTreeSet<String>>,
}

impl AccessSnapshot {
    pub fn new(role: Role, permissions: PermissionSet, active_modules: BTreeSet<String>) -> Self {
        Self {
            role,
            permissions,
            active_modules: Arc::new(active_modules),
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn active_modules(&self) -> &BTreeSet<String> {
        &self.active_modules
    }

    pub fn can_access(&self, key: &str) -> bool {
        AccessGate::can_access(&self.role, &self.active_modules, &self.permissions, key)
    }

    /// Same user, new active-module set
    pub fn with_active_modules(&self, active_modules: BTreeSet<String>) -> Self {
        Self {
            role: self.role.clone(),
            permissions: self.permissions.clone(),
            active_modules: Arc::new(active_modules),
        }
    }

    /// Modules this user can currently open, sorted
    pub fn accessible_modules(&self) -> Vec<&str> {
        self.active_modules
            .iter()
            .map(String::as_str)
            .filter(|key| self.can_access(key))
            .collect()
    }
}
