//! Clinic Modules - module dependency and activation engine
//!
//! Tenants (clinics) switch optional feature modules on and off: billing,
//! CRM, imaging AI, teleconsultation and so on. This crate decides whether
//! such a change is allowed, previews what it would affect, and commits it
//! without ever breaking the dependency invariants.
//!
//! ## Components
//!
//! 1. **Catalog** (`module::registry`) - module definitions and declared dependencies
//! 2. **Dependency graph** (`module::registry::dependencies`) - interned, acyclic, read-only
//! 3. **Impact calculator** (`module::impact`) - pure preview of activate/deactivate
//! 4. **Activation resolver** (`module::resolver`) - the only mutator of tenant state
//! 5. **Access gate** (`module::security`) - "can this user use module X" predicate
//!
//! ## Design Principles
//!
//! 1. **Simulate predicts commit**: preview and commit share one precondition check
//! 2. **Block, never cascade**: deactivation is refused while active dependents exist
//! 3. **Optimistic concurrency**: commits are conditioned on the tenant version they read
//! 4. **Fail fast on bad catalogs**: cycles and unknown keys are fatal at load time

pub mod config;
pub mod module;
pub mod storage;
pub mod utils;

pub use storage::{Storage, TenantStore};

// Re-export config module
pub use config::*;

pub use module::{
    AccessGate, AccessSnapshot, ActivationPlan, ActivationResolver, AuditRecord, CatalogError,
    DependencyGraph, ImpactCalculator, ModuleAction, ModuleCatalog, ModuleDefinition, ModuleEngine,
    ModuleError, PermissionSet, PredictedOutcome, ResolveOutcome, Role, SimulationResult,
    TenantModuleState, TenantSnapshot, TenantStateStore,
};
