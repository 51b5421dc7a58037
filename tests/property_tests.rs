//! Property tests for dependency and activation invariants
//!
//! Catalogs are random DAGs: module `i` may only depend on modules with a
//! lower index, so every generated catalog is acyclic.

use clinic_modules::{
    DependencyGraph, ModuleAction, ModuleCatalog, ModuleDefinition, PredictedOutcome,
    TenantSnapshot,
};
use proptest::prelude::*;
use std::collections::HashMap;
mod common;
use common::*;

fn key(i: usize) -> String {
    format!("m{:02}", i)
}

/// (dependency lists, subscribed flags, desired-active flags)
fn dag_strategy() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<bool>, Vec<bool>)> {
    (2usize..12).prop_flat_map(|n| {
        let deps = (0..n)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::vec(0..i, 0..=i.min(3)).boxed()
                }
            })
            .collect::<Vec<_>>();
        (
            deps,
            prop::collection::vec(any::<bool>(), n),
            prop::collection::vec(any::<bool>(), n),
        )
    })
}

fn build_catalog(deps: &[Vec<usize>]) -> ModuleCatalog {
    let modules = deps
        .iter()
        .enumerate()
        .map(|(i, d)| {
            ModuleDefinition::new(key(i), format!("Module {}", i)).depends_on(d.iter().map(|&j| key(j)))
        })
        .collect();
    ModuleCatalog::new(1, modules)
}

/// Valid starting state: a module is active only if it is subscribed, wants
/// to be active and all of its prerequisites ended up active
fn build_snapshot(deps: &[Vec<usize>], subscribed: &[bool], wants: &[bool]) -> TenantSnapshot {
    let mut active = vec![false; deps.len()];
    let mut snapshot = TenantSnapshot::new(TENANT);
    for i in 0..deps.len() {
        active[i] = subscribed[i] && wants[i] && deps[i].iter().all(|&j| active[j]);
        snapshot = snapshot.with_module(&key(i), subscribed[i], active[i]);
    }
    snapshot
}

fn assert_invariants(graph: &DependencyGraph, snapshot: &TenantSnapshot) {
    for key in graph.keys() {
        if !snapshot.is_active(key) {
            continue;
        }
        assert!(snapshot.is_subscribed(key), "{} active but unsubscribed", key);
        for dep in graph.direct_dependencies(key).unwrap() {
            assert!(
                snapshot.is_active(dep),
                "{} active while prerequisite {} is not",
                key,
                dep
            );
        }
    }
}

proptest! {
    #[test]
    fn test_activation_order_is_topological((deps, _, _) in dag_strategy()) {
        let graph = DependencyGraph::build(&build_catalog(&deps)).unwrap();
        let order = graph.activation_order();
        prop_assert_eq!(order.len(), deps.len());

        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(p, k)| (*k, p)).collect();
        for k in graph.keys() {
            for dep in graph.direct_dependencies(k).unwrap() {
                prop_assert!(position[dep] < position[k]);
            }
        }
    }

    #[test]
    fn test_transitive_dependents_sorted_and_closed((deps, _, _) in dag_strategy()) {
        let graph = DependencyGraph::build(&build_catalog(&deps)).unwrap();
        for k in graph.keys() {
            let dependents = graph.transitive_dependents(k).unwrap();
            let mut sorted = dependents.clone();
            sorted.sort_unstable();
            sorted.dedup();
            prop_assert_eq!(&sorted, &dependents);
            prop_assert!(!dependents.contains(&k));

            // Closed under direct dependents
            for d in &dependents {
                for dd in graph.direct_dependents(d).unwrap() {
                    prop_assert!(dependents.contains(&dd));
                }
            }
            // Repeated traversal gives the same answer
            prop_assert_eq!(graph.transitive_dependents(k).unwrap(), dependents);
        }
    }

    #[test]
    fn test_simulate_predicts_resolve(
        (deps, subscribed, wants) in dag_strategy(),
        ops in prop::collection::vec((0usize..12, any::<bool>()), 1..24),
    ) {
        let catalog = build_catalog(&deps);
        let (engine, store) = memory_engine(&catalog);
        store.seed(&engine.graph(), &build_snapshot(&deps, &subscribed, &wants)).unwrap();
        let graph = engine.graph();

        for (index, desired) in ops {
            let target = key(index % deps.len());
            let before = engine.snapshot(TENANT).unwrap();
            let action = ModuleAction::from_desired(desired);

            let preview = engine.simulate(TENANT, &target, action).unwrap();
            // Pure: a second preview is identical
            prop_assert_eq!(&engine.simulate(TENANT, &target, action).unwrap(), &preview);

            let result = engine.resolve(TENANT, &target, desired, "proptest");
            let after = engine.snapshot(TENANT).unwrap();

            match (&preview.outcome, &result) {
                (PredictedOutcome::Applies, Ok(outcome)) => {
                    prop_assert!(outcome.changed);
                    prop_assert_eq!(after.is_active(&target), desired);
                    prop_assert_eq!(after.version, before.version + 1);
                    prop_assert_eq!(
                        after.module(&target).version,
                        before.module(&target).version + 1
                    );
                }
                (PredictedOutcome::NoChange, Ok(outcome)) => {
                    prop_assert!(!outcome.changed);
                    prop_assert_eq!(&after, &before);
                }
                (PredictedOutcome::Rejected { code, .. }, Err(e)) => {
                    prop_assert_eq!(code.as_str(), e.code());
                    prop_assert_eq!(&after, &before);
                }
                (predicted, actual) => {
                    prop_assert!(false, "predicted {:?}, got {:?}", predicted, actual);
                }
            }

            // Only the target ever changes
            for other in graph.keys().filter(|k| *k != target) {
                prop_assert_eq!(after.module(other), before.module(other));
            }
            assert_invariants(&graph, &after);
        }
    }

    #[test]
    fn test_would_block_lists_active_transitive_dependents(
        (deps, subscribed, wants) in dag_strategy(),
    ) {
        let graph = DependencyGraph::build(&build_catalog(&deps)).unwrap();
        let snapshot = build_snapshot(&deps, &subscribed, &wants);
        let calculator = clinic_modules::ImpactCalculator::new(&graph);

        for k in graph.keys() {
            let result = calculator.simulate(&snapshot, k, ModuleAction::Deactivate).unwrap();
            let expected: Vec<String> = graph
                .transitive_dependents(k)
                .unwrap()
                .into_iter()
                .filter(|d| snapshot.is_active(d))
                .map(str::to_string)
                .collect();
            prop_assert_eq!(&result.would_block, &expected);
            prop_assert!(result.would_enable.is_empty());

            let has_active_direct = graph
                .direct_dependents(k)
                .unwrap()
                .iter()
                .any(|d| snapshot.is_active(d));
            if snapshot.is_active(k) && has_active_direct {
                prop_assert!(!result.outcome.is_allowed());
            }
        }
    }

    #[test]
    fn test_would_enable_only_lists_eligible_dependents(
        (deps, subscribed, wants) in dag_strategy(),
    ) {
        let graph = DependencyGraph::build(&build_catalog(&deps)).unwrap();
        let snapshot = build_snapshot(&deps, &subscribed, &wants);
        let calculator = clinic_modules::ImpactCalculator::new(&graph);

        for k in graph.keys() {
            let result = calculator.simulate(&snapshot, k, ModuleAction::Activate).unwrap();
            prop_assert!(result.would_block.is_empty());
            // An active target cannot unlock anything new
            prop_assert!(!snapshot.is_active(k) || result.would_enable.is_empty());
            for m in &result.would_enable {
                let m_deps = graph.direct_dependencies(m).unwrap();
                prop_assert!(m_deps.contains(&k));
                prop_assert!(!snapshot.is_active(m));
                prop_assert!(snapshot.is_subscribed(m));
                for dep in m_deps {
                    prop_assert!(dep == k || snapshot.is_active(dep));
                }
            }
        }
    }
}
