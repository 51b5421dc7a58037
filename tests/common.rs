#![allow(dead_code)]

use clinic_modules::{
    DependencyGraph, ModuleCatalog, ModuleDefinition, ModuleEngine, TenantSnapshot, TenantStore,
};
use std::sync::Arc;

pub const TENANT: &str = "clinic-1";

/// `A` (no deps), `B` depends on `A`, `C` depends on `B`
pub fn chain_catalog() -> ModuleCatalog {
    ModuleCatalog::new(
        1,
        vec![
            ModuleDefinition::new("A", "Module A"),
            ModuleDefinition::new("B", "Module B").depends_on(["A"]),
            ModuleDefinition::new("C", "Module C").depends_on(["B"]),
        ],
    )
}

/// Small clinic catalog with a mandatory dashboard and a diamond under reports
pub fn clinic_catalog() -> ModuleCatalog {
    ModuleCatalog::new(
        1,
        vec![
            ModuleDefinition::new("dashboard", "Dashboard").mandatory(),
            ModuleDefinition::new("patients", "Patients"),
            ModuleDefinition::new("scheduling", "Scheduling").depends_on(["patients"]),
            ModuleDefinition::new("billing", "Billing").depends_on(["patients"]),
            ModuleDefinition::new("reports", "Reports").depends_on(["billing", "scheduling"]),
            ModuleDefinition::new("crm", "CRM"),
            ModuleDefinition::new("marketing", "Marketing").depends_on(["crm"]),
        ],
    )
}

pub fn graph(catalog: &ModuleCatalog) -> Arc<DependencyGraph> {
    Arc::new(DependencyGraph::build(catalog).unwrap())
}

/// Engine over a fresh in-memory store; the store is returned for seeding
pub fn memory_engine(catalog: &ModuleCatalog) -> (Arc<ModuleEngine>, Arc<TenantStore>) {
    let store = Arc::new(TenantStore::in_memory().unwrap());
    let engine = ModuleEngine::new(catalog, store.clone()).unwrap();
    (Arc::new(engine), store)
}

/// Snapshot with every listed module subscribed; `active` ones switched on
pub fn subscribed_snapshot(keys: &[&str], active: &[&str]) -> TenantSnapshot {
    tenant_snapshot(TENANT, keys, active)
}

pub fn tenant_snapshot(tenant_id: &str, keys: &[&str], active: &[&str]) -> TenantSnapshot {
    keys.iter().fold(TenantSnapshot::new(tenant_id), |snapshot, key| {
        snapshot.with_module(key, true, active.contains(key))
    })
}

/// Scenario start: `A` active, `B` and `C` inactive, all subscribed
pub fn seeded_chain() -> (Arc<ModuleEngine>, Arc<TenantStore>) {
    let (engine, store) = memory_engine(&chain_catalog());
    store
        .seed(&engine.graph(), &subscribed_snapshot(&["A", "B", "C"], &["A"]))
        .unwrap();
    (engine, store)
}
