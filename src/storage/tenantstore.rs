//! Tenant module state storage
//!
//! Stores one bincode-encoded `TenantSnapshot` per tenant and the append-only
//! audit trail of activation changes. Commits are compare-and-swap on the
//! stored snapshot bytes, performed in the same transaction as the audit
//! insert.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::module::registry::DependencyGraph;
use crate::module::transition::invariant_violations;
use crate::module::traits::{AuditRecord, ModuleError, TenantSnapshot, TenantStateStore};
use crate::storage::database::{
    create_database, Database, DatabaseBackend, Tree, WriteGuard, WriteOp, MODULE_AUDIT_TREE,
    TENANT_MODULES_TREE,
};

/// Tenant state store backed by any `Database`
pub struct TenantStore {
    db: Arc<dyn Database>,
    tenants: Box<dyn Tree>,
    audit: Box<dyn Tree>,
}

impl TenantStore {
    /// Create a new tenant store
    pub fn new(db: Arc<dyn Database>) -> Result<Self> {
        let tenants = db.open_tree(TENANT_MODULES_TREE)?;
        let audit = db.open_tree(MODULE_AUDIT_TREE)?;
        Ok(Self { db, tenants, audit })
    }

    /// Store on a fresh in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::new(Arc::from(create_database("", DatabaseBackend::Memory)?))
    }

    /// Provision a tenant that has never been written
    ///
    /// The stored snapshot gets tenant version 1 when `snapshot` carries 0.
    /// Active modules must be subscribed and have every prerequisite in
    /// `graph` active; the first violation is returned and nothing is
    /// written. Fails with `VersionConflict` if the tenant already exists.
    pub fn seed(
        &self,
        graph: &DependencyGraph,
        snapshot: &TenantSnapshot,
    ) -> Result<TenantSnapshot, ModuleError> {
        if let Some(violation) = invariant_violations(graph, snapshot).into_iter().next() {
            warn!(
                "Refusing to seed tenant {}: {}",
                snapshot.tenant_id, violation
            );
            return Err(violation);
        }

        let mut seeded = snapshot.clone();
        seeded.version = seeded.version.max(1);
        let empty = TenantSnapshot::new(snapshot.tenant_id.clone());
        if !self.commit(&empty, &seeded, None)? {
            return Err(ModuleError::VersionConflict {
                tenant: snapshot.tenant_id.clone(),
                expected: 0,
            });
        }
        debug!(
            "Seeded tenant {} with {} modules",
            seeded.tenant_id,
            seeded.modules.len()
        );
        Ok(seeded)
    }

    /// Ids of all persisted tenants, sorted
    pub fn tenant_ids(&self) -> Result<Vec<String>, ModuleError> {
        self.tenants
            .iter()
            .map(|item| {
                let (key, _) = item?;
                String::from_utf8(key)
                    .map_err(|e| ModuleError::Serialization(format!("tenant id: {}", e)))
            })
            .collect()
    }

    /// Number of persisted tenants
    pub fn tenant_count(&self) -> Result<usize, ModuleError> {
        Ok(self.tenants.len()?)
    }

    /// Flush all pending writes
    pub fn flush(&self) -> Result<()> {
        self.db.flush()
    }

    fn tenant_key(tenant_id: &str) -> Result<&[u8], ModuleError> {
        // NUL separates tenant id and version in audit keys
        if tenant_id.is_empty() || tenant_id.contains('\0') {
            return Err(ModuleError::Storage(format!(
                "invalid tenant id: {:?}",
                tenant_id
            )));
        }
        Ok(tenant_id.as_bytes())
    }

    fn audit_prefix(tenant_id: &str) -> Result<Vec<u8>, ModuleError> {
        let mut prefix = Self::tenant_key(tenant_id)?.to_vec();
        prefix.push(0);
        Ok(prefix)
    }

    fn audit_key(record: &AuditRecord) -> Result<Vec<u8>, ModuleError> {
        let mut key = Self::audit_prefix(&record.tenant_id)?;
        // Big-endian so prefix scans return records in version order
        key.extend_from_slice(&record.tenant_version.to_be_bytes());
        Ok(key)
    }
}

impl TenantStateStore for TenantStore {
    fn load(&self, tenant_id: &str) -> Result<TenantSnapshot, ModuleError> {
        let key = Self::tenant_key(tenant_id)?;
        match self.tenants.get(key)? {
            Some(data) => Ok(bincode::deserialize(&data)?),
            None => Ok(TenantSnapshot::new(tenant_id)),
        }
    }

    fn commit(
        &self,
        expected: &TenantSnapshot,
        next: &TenantSnapshot,
        audit: Option<&AuditRecord>,
    ) -> Result<bool, ModuleError> {
        if expected.tenant_id != next.tenant_id {
            return Err(ModuleError::Storage(format!(
                "commit across tenants: {} -> {}",
                expected.tenant_id, next.tenant_id
            )));
        }
        let key = Self::tenant_key(&next.tenant_id)?;

        let expected_bytes = if expected.is_persisted() {
            Some(bincode::serialize(expected)?)
        } else {
            None
        };
        let next_bytes = bincode::serialize(next)?;

        let audit_entry = match audit {
            Some(record) => Some((Self::audit_key(record)?, bincode::serialize(record)?)),
            None => None,
        };

        let mut writes = vec![WriteOp {
            tree: TENANT_MODULES_TREE,
            key,
            value: &next_bytes,
        }];
        if let Some((audit_key, audit_bytes)) = &audit_entry {
            writes.push(WriteOp {
                tree: MODULE_AUDIT_TREE,
                key: audit_key,
                value: audit_bytes,
            });
        }

        let applied = self.db.write_if_unchanged(
            WriteGuard {
                tree: TENANT_MODULES_TREE,
                key,
                expected: expected_bytes.as_deref(),
            },
            &writes,
        )?;

        debug!(
            "Commit for tenant {} at version {} -> {}: {}",
            next.tenant_id,
            expected.version,
            next.version,
            if applied { "applied" } else { "stale" }
        );
        Ok(applied)
    }

    fn audit_log(&self, tenant_id: &str) -> Result<Vec<AuditRecord>, ModuleError> {
        let prefix = Self::audit_prefix(tenant_id)?;
        self.audit
            .scan_prefix(&prefix)
            .map(|item| -> Result<AuditRecord, ModuleError> {
                let (_, value) = item?;
                Ok(bincode::deserialize(&value)?)
            })
            .collect()
    }
}
