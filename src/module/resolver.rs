//! Activation resolver
//!
//! The only component that changes a module's `is_active` flag. Each call
//! reads the tenant snapshot, re-checks the preconditions against it, and
//! commits the flip together with an audit record, conditioned on the tenant
//! version it read.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::module::registry::DependencyGraph;
use crate::module::transition::{check_transition, Transition};
use crate::module::traits::{
    AuditRecord, ModuleAction, ModuleError, TenantModuleState, TenantSnapshot, TenantStateStore,
};
use crate::utils::time::current_timestamp;

/// Result of a successful resolve call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub success: bool,
    /// `false` when the module already had the requested state
    pub changed: bool,
    pub previous: TenantModuleState,
    pub next: TenantModuleState,
    /// Tenant version after the call
    pub tenant_version: u64,
}

/// Transactional activation resolver for one graph revision
pub struct ActivationResolver {
    graph: Arc<DependencyGraph>,
    store: Arc<dyn TenantStateStore>,
}

impl ActivationResolver {
    pub fn new(graph: Arc<DependencyGraph>, store: Arc<dyn TenantStateStore>) -> Self {
        Self { graph, store }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Set `key` to `desired_active` for `tenant_id`
    ///
    /// Either the full change (state, versions, audit record) is persisted
    /// or nothing is. A concurrent write to the same tenant since the read
    /// yields `VersionConflict`.
    pub fn resolve(
        &self,
        tenant_id: &str,
        key: &str,
        desired_active: bool,
        actor: &str,
    ) -> Result<ResolveOutcome, ModuleError> {
        let snapshot = self.store.load(tenant_id)?;
        self.resolve_from(&snapshot, key, desired_active, actor)
    }

    /// Resolve against a snapshot the caller already read
    ///
    /// The commit only lands if the stored tenant still equals `snapshot`.
    pub fn resolve_from(
        &self,
        snapshot: &TenantSnapshot,
        key: &str,
        desired_active: bool,
        actor: &str,
    ) -> Result<ResolveOutcome, ModuleError> {
        let action = ModuleAction::from_desired(desired_active);

        let (previous, next) = match check_transition(&self.graph, snapshot, key, desired_active) {
            Ok(Transition::Unchanged(state)) => {
                info!(
                    "No change: {} already {} for tenant {}",
                    key,
                    if state.is_active { "active" } else { "inactive" },
                    snapshot.tenant_id
                );
                return Ok(ResolveOutcome {
                    success: true,
                    changed: false,
                    previous: state,
                    next: state,
                    tenant_version: snapshot.version,
                });
            }
            Ok(Transition::Apply { previous, next }) => (previous, next),
            Err(e) => {
                warn!(
                    "Rejected {} {} for tenant {}: {}",
                    action, key, snapshot.tenant_id, e
                );
                return Err(e);
            }
        };

        let mut updated = snapshot.clone();
        updated.version = snapshot.version + 1;
        updated.modules.insert(key.to_string(), next);

        let audit = AuditRecord {
            id: Uuid::new_v4(),
            tenant_id: snapshot.tenant_id.clone(),
            module: key.to_string(),
            actor: actor.to_string(),
            previous,
            next,
            tenant_version: updated.version,
            timestamp: current_timestamp(),
        };

        if !self.store.commit(snapshot, &updated, Some(&audit))? {
            warn!(
                "Version conflict on tenant {} (read version {}) while trying to {} {}",
                snapshot.tenant_id, snapshot.version, action, key
            );
            return Err(ModuleError::VersionConflict {
                tenant: snapshot.tenant_id.clone(),
                expected: snapshot.version,
            });
        }

        info!(
            "{} {} for tenant {} by {} (tenant version {})",
            action, key, snapshot.tenant_id, actor, updated.version
        );

        Ok(ResolveOutcome {
            success: true,
            changed: true,
            previous,
            next,
            tenant_version: updated.version,
        })
    }
}
