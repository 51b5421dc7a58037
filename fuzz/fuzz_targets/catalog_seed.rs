#![no_main]
use clinic_modules::{DependencyGraph, ImpactCalculator, ModuleAction, ModuleCatalog, TenantSnapshot};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Catalog seeds come from operators; malformed input must be rejected
    // with a CatalogError, never a panic or a hang
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    for parsed in [ModuleCatalog::from_toml_str(text), ModuleCatalog::from_json_str(text)] {
        let Ok(catalog) = parsed else {
            continue;
        };
        let Ok(graph) = DependencyGraph::build(&catalog) else {
            continue;
        };

        // Every accepted graph must be ordered and traversable
        let order = graph.activation_order();
        assert_eq!(order.len(), graph.len());

        let snapshot = order
            .iter()
            .fold(TenantSnapshot::new("fuzz"), |s, key| s.with_module(key, true, false));
        let calculator = ImpactCalculator::new(&graph);
        for key in &order {
            let _ = graph.transitive_dependents(key);
            let _ = calculator.simulate(&snapshot, key, ModuleAction::Activate);
            let _ = calculator.simulate(&snapshot, key, ModuleAction::Deactivate);
        }
    }
});
