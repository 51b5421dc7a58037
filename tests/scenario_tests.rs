//! End-to-end activation scenarios on the A <- B <- C chain

use clinic_modules::{ModuleAction, ModuleError, PredictedOutcome};
mod common;
use common::*;

#[test]
fn test_activate_middle_of_chain() {
    let (engine, _store) = seeded_chain();

    let preview = engine.simulate(TENANT, "B", ModuleAction::Activate).unwrap();
    // C is subscribed and B is its only unmet prerequisite, so it becomes
    // eligible for a follow-up activation. It is not switched on.
    assert_eq!(preview.would_enable, vec!["C"]);
    assert_eq!(preview.affected, preview.would_enable);
    assert!(preview.would_block.is_empty());
    assert_eq!(preview.outcome, PredictedOutcome::Applies);

    let outcome = engine.resolve(TENANT, "B", true, "admin").unwrap();
    assert!(outcome.success && outcome.changed);
    assert_eq!(outcome.next.version, 1);
    assert_eq!(outcome.tenant_version, 2);

    let snapshot = engine.snapshot(TENANT).unwrap();
    assert!(snapshot.is_active("B"));
    assert!(!snapshot.is_active("C"));

    let preview = engine.simulate(TENANT, "A", ModuleAction::Deactivate).unwrap();
    assert_eq!(preview.would_block, vec!["B"]);
}

#[test]
fn test_activate_already_active_module_enables_nothing() {
    let (engine, _store) = seeded_chain();
    engine.resolve(TENANT, "B", true, "admin").unwrap();

    // C was already eligible before this request
    let preview = engine.simulate(TENANT, "B", ModuleAction::Activate).unwrap();
    assert_eq!(preview.outcome, PredictedOutcome::NoChange);
    assert!(preview.would_enable.is_empty());
    assert!(preview.affected.is_empty());
}

#[test]
fn test_deactivate_blocked_by_active_dependent() {
    let (engine, _store) = seeded_chain();
    engine.resolve(TENANT, "B", true, "admin").unwrap();
    let before = engine.snapshot(TENANT).unwrap();

    let result = engine.resolve(TENANT, "A", false, "admin");
    assert_eq!(
        result,
        Err(ModuleError::BlockingDependents {
            module: "A".into(),
            blockers: vec!["B".into()],
        })
    );

    let after = engine.snapshot(TENANT).unwrap();
    assert_eq!(after, before);
    assert_eq!(after.module("A").version, before.module("A").version);
    assert_eq!(engine.audit_log(TENANT).unwrap().len(), 1);
}

#[test]
fn test_activate_leaf_then_block_its_prerequisite() {
    let (engine, _store) = seeded_chain();
    engine.resolve(TENANT, "B", true, "admin").unwrap();

    let outcome = engine.resolve(TENANT, "C", true, "admin").unwrap();
    assert!(outcome.changed);

    let preview = engine.simulate(TENANT, "B", ModuleAction::Deactivate).unwrap();
    assert_eq!(preview.would_block, vec!["C"]);
    assert!(!preview.outcome.is_allowed());

    // A is blocked by B and, transitively, by C
    let preview = engine.simulate(TENANT, "A", ModuleAction::Deactivate).unwrap();
    assert_eq!(preview.would_block, vec!["B", "C"]);
}

#[test]
fn test_activation_never_cascades_up() {
    let (engine, _store) = seeded_chain();

    let result = engine.resolve(TENANT, "C", true, "admin");
    assert_eq!(
        result,
        Err(ModuleError::DependencyUnmet {
            module: "C".into(),
            missing: vec!["B".into()],
        })
    );
    let snapshot = engine.snapshot(TENANT).unwrap();
    assert!(!snapshot.is_active("B"));
    assert!(!snapshot.is_active("C"));

    let plan = engine.activation_plan(TENANT, "C").unwrap();
    assert_eq!(plan.steps, vec!["B", "C"]);
    assert!(plan.unsubscribed.is_empty());
}

#[test]
fn test_deactivation_never_cascades_down() {
    let (engine, _store) = seeded_chain();
    engine.resolve(TENANT, "B", true, "admin").unwrap();
    engine.resolve(TENANT, "C", true, "admin").unwrap();

    assert!(engine.resolve(TENANT, "B", false, "admin").is_err());
    assert!(engine.snapshot(TENANT).unwrap().is_active("C"));

    // Tear down from the top
    engine.resolve(TENANT, "C", false, "admin").unwrap();
    engine.resolve(TENANT, "B", false, "admin").unwrap();
    engine.resolve(TENANT, "A", false, "admin").unwrap();
    assert!(engine.snapshot(TENANT).unwrap().active_modules().is_empty());
}

#[test]
fn test_repeated_resolve_is_idempotent() {
    let (engine, _store) = seeded_chain();
    let first = engine.resolve(TENANT, "B", true, "admin").unwrap();
    let second = engine.resolve(TENANT, "B", true, "admin").unwrap();

    assert!(first.changed);
    assert!(second.success && !second.changed);
    assert_eq!(second.tenant_version, first.tenant_version);
    assert_eq!(engine.snapshot(TENANT).unwrap().module("B").version, 1);
    assert_eq!(engine.audit_log(TENANT).unwrap().len(), 1);

    let preview = engine.simulate(TENANT, "B", ModuleAction::Activate).unwrap();
    assert_eq!(preview.outcome, PredictedOutcome::NoChange);
}

#[test]
fn test_audit_records_every_flip() {
    let (engine, _store) = seeded_chain();
    engine.resolve(TENANT, "B", true, "alice").unwrap();
    engine.resolve(TENANT, "B", false, "bob").unwrap();

    let log = engine.audit_log(TENANT).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].actor, "alice");
    assert!(!log[0].previous.is_active && log[0].next.is_active);
    assert_eq!(log[1].actor, "bob");
    assert!(log[1].previous.is_active && !log[1].next.is_active);
    assert_eq!(log[1].next.version, 2);
    assert!(log[0].tenant_version < log[1].tenant_version);
}

#[test]
fn test_unsubscribed_module_cannot_activate() {
    let (engine, store) = memory_engine(&chain_catalog());
    store
        .seed(
            &engine.graph(),
            &subscribed_snapshot(&["A"], &["A"]).with_module("B", false, false),
        )
        .unwrap();

    let preview = engine.simulate(TENANT, "B", ModuleAction::Activate).unwrap();
    assert!(matches!(
        preview.outcome,
        PredictedOutcome::Rejected { ref code, .. } if code == "not_subscribed"
    ));
    assert_eq!(
        engine.resolve(TENANT, "B", true, "admin"),
        Err(ModuleError::NotSubscribed { module: "B".into() })
    );

    assert!(engine.set_subscription(TENANT, "B", true).unwrap());
    assert!(engine.resolve(TENANT, "B", true, "admin").unwrap().changed);
}

#[test]
fn test_mandatory_module_cannot_be_disabled() {
    let (engine, store) = memory_engine(&clinic_catalog());
    store
        .seed(&engine.graph(), &subscribed_snapshot(&["dashboard"], &["dashboard"]))
        .unwrap();

    assert_eq!(
        engine.resolve(TENANT, "dashboard", false, "admin"),
        Err(ModuleError::NotDisableable {
            module: "dashboard".into()
        })
    );
    assert!(engine.snapshot(TENANT).unwrap().is_active("dashboard"));
}

#[test]
fn test_diamond_needs_both_prerequisites() {
    let (engine, store) = memory_engine(&clinic_catalog());
    store
        .seed(
            &engine.graph(),
            &subscribed_snapshot(
                &["patients", "billing", "scheduling", "reports"],
                &["patients", "billing"],
            ),
        )
        .unwrap();

    // scheduling is the last prerequisite reports is waiting for
    let preview = engine
        .simulate(TENANT, "scheduling", ModuleAction::Activate)
        .unwrap();
    assert_eq!(preview.would_enable, vec!["reports"]);

    let err = engine.resolve(TENANT, "reports", true, "admin").unwrap_err();
    assert_eq!(
        err,
        ModuleError::DependencyUnmet {
            module: "reports".into(),
            missing: vec!["scheduling".into()],
        }
    );
}

#[test]
fn test_unknown_module_everywhere() {
    let (engine, _store) = seeded_chain();
    let unknown = ModuleError::UnknownModule("Z".into());

    assert_eq!(
        engine.simulate(TENANT, "Z", ModuleAction::Activate).unwrap_err(),
        unknown
    );
    assert_eq!(engine.resolve(TENANT, "Z", true, "admin").unwrap_err(), unknown);
    assert_eq!(engine.activation_plan(TENANT, "Z").unwrap_err(), unknown);
}

#[test]
fn test_tenants_are_isolated() {
    let (engine, store) = seeded_chain();
    store
        .seed(&engine.graph(), &tenant_snapshot("clinic-2", &["A", "B", "C"], &[]))
        .unwrap();

    engine.resolve(TENANT, "B", true, "admin").unwrap();
    let other = engine.snapshot("clinic-2").unwrap();
    assert!(other.active_modules().is_empty());
    assert!(engine.audit_log("clinic-2").unwrap().is_empty());
}
