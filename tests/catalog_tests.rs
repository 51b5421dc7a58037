//! Catalog loading and validation tests

use clinic_modules::module::registry::CatalogDiscovery;
use clinic_modules::{
    CatalogError, DatabaseBackendConfig, DependencyGraph, EngineConfig, ModuleAction,
    ModuleCatalog, ModuleDefinition, ModuleEngine,
};
use std::path::PathBuf;
mod common;
use common::*;

fn bundled_catalog_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("catalog/clinic.toml")
}

#[test]
fn test_bundled_catalog_is_valid() {
    let catalog = CatalogDiscovery::load(bundled_catalog_path()).unwrap();
    let graph = DependencyGraph::build(&catalog).unwrap();
    assert_eq!(graph.len(), catalog.len());
    assert!(!graph.definition("dashboard").unwrap().can_disable);

    let order = graph.activation_order();
    let position = |key: &str| order.iter().position(|k| *k == key).unwrap();
    for key in graph.keys() {
        for dep in graph.direct_dependencies(key).unwrap() {
            assert!(position(dep) < position(key), "{} before {}", dep, key);
        }
    }

    assert_eq!(
        graph.transitive_dependents("patients").unwrap(),
        vec![
            "billing",
            "imaging",
            "imaging_ai",
            "pharmacy",
            "reports",
            "scheduling",
            "teleconsultation"
        ]
    );
}

#[test]
fn test_cycle_is_fatal() {
    let catalog = ModuleCatalog::new(
        1,
        vec![
            ModuleDefinition::new("a", "A").depends_on(["c"]),
            ModuleDefinition::new("b", "B").depends_on(["a"]),
            ModuleDefinition::new("c", "C").depends_on(["b"]),
        ],
    );
    match DependencyGraph::build(&catalog) {
        Err(CatalogError::Cycle { path }) => {
            assert!(path.len() >= 3);
            for key in ["a", "b", "c"] {
                assert!(path.iter().any(|k| k == key));
            }
        }
        other => panic!("expected cycle, got {:?}", other.map(|g| g.len())),
    }
}

#[test]
fn test_unknown_dependency_is_fatal() {
    let catalog = ModuleCatalog::new(
        1,
        vec![ModuleDefinition::new("billing", "Billing").depends_on(["patients"])],
    );
    assert!(matches!(
        DependencyGraph::build(&catalog),
        Err(CatalogError::UnknownDependency { ref module, ref dependency })
            if module == "billing" && dependency == "patients"
    ));
}

#[test]
fn test_duplicate_and_self_dependency_rejected() {
    let duplicate = ModuleCatalog::new(
        1,
        vec![
            ModuleDefinition::new("crm", "CRM"),
            ModuleDefinition::new("crm", "CRM again"),
        ],
    );
    assert!(matches!(
        DependencyGraph::build(&duplicate),
        Err(CatalogError::DuplicateKey(ref key)) if key == "crm"
    ));

    let looped = ModuleCatalog::new(1, vec![ModuleDefinition::new("crm", "CRM").depends_on(["crm"])]);
    assert!(matches!(
        DependencyGraph::build(&looped),
        Err(CatalogError::SelfDependency(_))
    ));
}

#[test]
fn test_json_seed_accepts_camel_case() {
    let catalog = ModuleCatalog::from_json_str(
        r#"{
            "revision": 3,
            "modules": [
                {"key": "dashboard", "name": "Dashboard", "canDisable": false},
                {"key": "crm", "name": "CRM"},
                {"key": "marketing", "name": "Marketing", "dependsOn": ["crm"]}
            ]
        }"#,
    )
    .unwrap();
    let graph = DependencyGraph::build(&catalog).unwrap();
    assert_eq!(graph.revision(), 3);
    assert_eq!(graph.direct_dependencies("marketing").unwrap(), vec!["crm"]);
    assert!(!graph.definition("dashboard").unwrap().can_disable);
}

#[test]
fn test_toml_round_trip_keeps_graph() {
    let catalog = clinic_catalog();
    let reparsed = ModuleCatalog::from_toml_str(&catalog.to_toml_string().unwrap()).unwrap();
    assert_eq!(reparsed, catalog);
}

#[test]
fn test_engine_from_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.catalog.path = bundled_catalog_path().display().to_string();
    config.storage.database_backend = DatabaseBackendConfig::Memory;
    config.storage.data_dir = temp_dir.path().display().to_string();

    let engine = ModuleEngine::from_config(&config).unwrap();
    assert!(engine.graph().contains("imaging_ai"));

    // Fresh tenants start with nothing subscribed
    let preview = engine
        .simulate(TENANT, "patients", ModuleAction::Activate)
        .unwrap();
    assert!(!preview.outcome.is_allowed());
}

#[test]
fn test_engine_from_config_missing_catalog() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.catalog.path = temp_dir.path().join("absent.toml").display().to_string();
    config.storage.database_backend = DatabaseBackendConfig::Memory;

    let err = ModuleEngine::from_config(&config).err().unwrap();
    assert!(err.downcast_ref::<CatalogError>().is_some());
}
