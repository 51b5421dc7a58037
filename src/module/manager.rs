//! Module engine
//!
//! Facade that owns the cached dependency graph and the tenant state store,
//! and exposes preview, commit, subscription sync, access snapshots and the
//! audit trail.

use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::config::{EngineConfig, ResolverConfig};
use crate::module::impact::{ActivationPlan, ImpactCalculator, SimulationResult};
use crate::module::registry::{CatalogDiscovery, CatalogError, DependencyGraph, ModuleCatalog};
use crate::module::resolver::{ActivationResolver, ResolveOutcome};
use crate::module::security::{AccessSnapshot, PermissionSet, Role};
use crate::module::transition::invariant_violations;
use crate::module::traits::{
    AuditRecord, ModuleAction, ModuleError, TenantModuleState, TenantSnapshot, TenantStateStore,
};
use crate::storage::Storage;
use crate::utils::retry::{retry_if_retryable, RetryConfig};
use crate::utils::timeout::with_custom_timeout;

/// Module engine coordinating catalog, resolver and tenant state
pub struct ModuleEngine {
    /// Current graph; replaced wholesale on catalog reload
    graph: RwLock<Arc<DependencyGraph>>,
    store: Arc<dyn TenantStateStore>,
    resolver_config: ResolverConfig,
}

impl ModuleEngine {
    /// Build the graph for `catalog` and wrap `store`
    pub fn new(
        catalog: &ModuleCatalog,
        store: Arc<dyn TenantStateStore>,
    ) -> Result<Self, CatalogError> {
        let graph = DependencyGraph::build(catalog)?;
        info!(
            "Module engine ready: {} modules at catalog revision {}",
            graph.len(),
            graph.revision()
        );
        Ok(Self {
            graph: RwLock::new(Arc::new(graph)),
            store,
            resolver_config: ResolverConfig::default(),
        })
    }

    /// Override commit timeout and retry settings
    pub fn with_resolver_config(mut self, config: ResolverConfig) -> Self {
        self.resolver_config = config;
        self
    }

    /// Load the catalog and open storage as configured
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let catalog = CatalogDiscovery::load(Path::new(&config.catalog.path))?;
        let storage = Storage::from_config(&config.storage)?;
        let engine = Self::new(&catalog, storage.tenants())?
            .with_resolver_config(config.resolver.clone());
        Ok(engine)
    }

    /// Graph in effect right now; callers keep it for the whole operation
    pub fn graph(&self) -> Arc<DependencyGraph> {
        let guard = self.graph.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Validate `catalog` and swap it in
    ///
    /// The old graph stays in effect if validation fails or the revision is
    /// older than the current one. Stored tenant state is not rewritten: a
    /// module that gained prerequisites may now be active without them, so
    /// run [`Self::check_tenant`] for tenants that use it.
    pub fn reload_catalog(&self, catalog: &ModuleCatalog) -> Result<u64, CatalogError> {
        let graph = DependencyGraph::build(catalog)?;

        let mut current = self.graph.write().unwrap_or_else(|e| e.into_inner());
        if graph.revision() < current.revision() {
            warn!(
                "Rejected catalog revision {} (current {})",
                graph.revision(),
                current.revision()
            );
            return Err(CatalogError::StaleRevision {
                current: current.revision(),
                offered: graph.revision(),
            });
        }

        info!(
            "Catalog reloaded: revision {} -> {} ({} modules)",
            current.revision(),
            graph.revision(),
            graph.len()
        );
        for (key, added) in added_dependencies(&current, &graph) {
            warn!(
                "Module {} now depends on {:?}; tenants with {} active may be missing prerequisites",
                key, added, key
            );
        }
        let revision = graph.revision();
        *current = Arc::new(graph);
        Ok(revision)
    }

    /// Prerequisite and subscription violations in a tenant's stored state
    /// under the current graph; empty when the tenant is consistent
    pub fn check_tenant(&self, tenant_id: &str) -> Result<Vec<ModuleError>, ModuleError> {
        let graph = self.graph();
        let snapshot = self.store.load(tenant_id)?;
        let violations = invariant_violations(&graph, &snapshot);
        if !violations.is_empty() {
            warn!(
                "Tenant {} has {} violation(s) at catalog revision {}",
                tenant_id,
                violations.len(),
                graph.revision()
            );
        }
        Ok(violations)
    }

    /// Current state of a tenant
    pub fn snapshot(&self, tenant_id: &str) -> Result<TenantSnapshot, ModuleError> {
        self.store.load(tenant_id)
    }

    /// Preview an activate/deactivate request against the current state
    pub fn simulate(
        &self,
        tenant_id: &str,
        key: &str,
        action: ModuleAction,
    ) -> Result<SimulationResult, ModuleError> {
        let graph = self.graph();
        let snapshot = self.store.load(tenant_id)?;
        ImpactCalculator::new(&graph).simulate(&snapshot, key, action)
    }

    /// Advisory list of modules to switch on, in order, to reach `key`
    pub fn activation_plan(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<ActivationPlan, ModuleError> {
        let graph = self.graph();
        let snapshot = self.store.load(tenant_id)?;
        ImpactCalculator::new(&graph).activation_plan(&snapshot, key)
    }

    /// Synchronously set `key` to `desired_active` (single attempt)
    pub fn resolve(
        &self,
        tenant_id: &str,
        key: &str,
        desired_active: bool,
        actor: &str,
    ) -> Result<ResolveOutcome, ModuleError> {
        ActivationResolver::new(self.graph(), Arc::clone(&self.store)).resolve(
            tenant_id,
            key,
            desired_active,
            actor,
        )
    }

    /// Resolve on the blocking pool with a bounded wait, retrying version
    /// conflicts with exponential backoff
    ///
    /// On `Timeout` the commit may still land later; re-read the tenant
    /// before acting on the outcome.
    pub async fn commit(
        self: &Arc<Self>,
        tenant_id: &str,
        key: &str,
        desired_active: bool,
        actor: &str,
    ) -> Result<ResolveOutcome, ModuleError> {
        let retry = RetryConfig::for_commits(&self.resolver_config);
        let limit = self.resolver_config.commit_timeout();

        retry_if_retryable(&retry, || {
            let engine = Arc::clone(self);
            let tenant_id = tenant_id.to_string();
            let key = key.to_string();
            let actor = actor.to_string();
            async move {
                let task = tokio::task::spawn_blocking(move || {
                    engine.resolve(&tenant_id, &key, desired_active, &actor)
                });
                match with_custom_timeout(task, limit).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) => Err(ModuleError::Storage(format!(
                        "commit task failed: {}",
                        join_error
                    ))),
                    Err(_) => {
                        warn!("Commit did not finish within {:?}", limit);
                        Err(ModuleError::Timeout)
                    }
                }
            }
        })
        .await
    }

    /// Billing input: grant or revoke a module subscription
    ///
    /// Returns whether anything changed. Revoking the subscription of an
    /// active module is refused with `StillActive`.
    pub fn set_subscription(
        &self,
        tenant_id: &str,
        key: &str,
        subscribed: bool,
    ) -> Result<bool, ModuleError> {
        if !self.graph().contains(key) {
            return Err(ModuleError::UnknownModule(key.to_string()));
        }

        let snapshot = self.store.load(tenant_id)?;
        let current = snapshot.module(key);
        // Absent modules read as unsubscribed, so revoking one is a no-op
        if current.is_subscribed == subscribed {
            return Ok(false);
        }
        if !subscribed && current.is_active {
            return Err(ModuleError::StillActive {
                module: key.to_string(),
            });
        }

        let mut next = snapshot.clone();
        next.version = snapshot.version + 1;
        next.modules.insert(
            key.to_string(),
            TenantModuleState {
                is_subscribed: subscribed,
                ..current
            },
        );

        if !self.store.commit(&snapshot, &next, None)? {
            return Err(ModuleError::VersionConflict {
                tenant: tenant_id.to_string(),
                expected: snapshot.version,
            });
        }

        info!(
            "Subscription for {} on tenant {} set to {}",
            key, tenant_id, subscribed
        );
        Ok(true)
    }

    /// Capture what `role` with `permissions` may open on this tenant now
    pub fn access_snapshot(
        &self,
        tenant_id: &str,
        role: Role,
        permissions: PermissionSet,
    ) -> Result<AccessSnapshot, ModuleError> {
        let snapshot = self.store.load(tenant_id)?;
        Ok(AccessSnapshot::new(
            role,
            permissions,
            snapshot.active_modules(),
        ))
    }

    /// Re-derive `access` after a commit
    pub fn refresh_access(
        &self,
        tenant_id: &str,
        access: &AccessSnapshot,
    ) -> Result<AccessSnapshot, ModuleError> {
        let snapshot = self.store.load(tenant_id)?;
        Ok(access.with_active_modules(snapshot.active_modules()))
    }

    /// Activation changes of a tenant, oldest first
    pub fn audit_log(&self, tenant_id: &str) -> Result<Vec<AuditRecord>, ModuleError> {
        self.store.audit_log(tenant_id)
    }
}

/// Modules present in both graphs whose prerequisite set grew, with the
/// new prerequisites
fn added_dependencies(old: &DependencyGraph, new: &DependencyGraph) -> Vec<(String, Vec<String>)> {
    new.keys()
        .filter(|key| old.contains(key))
        .filter_map(|key| {
            let before = old.direct_dependencies(key).ok()?;
            let added: Vec<String> = new
                .direct_dependencies(key)
                .ok()?
                .into_iter()
                .filter(|dep| !before.contains(dep))
                .map(str::to_string)
                .collect();
            (!added.is_empty()).then(|| (key.to_string(), added))
        })
        .collect()
}
