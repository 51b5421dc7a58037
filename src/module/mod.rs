//! Module system for clinic tenants
//!
//! This module provides the dependency and activation engine that decides which
//! optional feature modules a tenant may run.
//!
//! ## Architecture
//!
//! - **Static Catalog**: Module definitions are seeded once and re-validated on every change
//! - **Interned Graph**: Keys become indices into adjacency lists, shared read-only
//! - **Pure Preview**: Impact simulation never touches shared state
//! - **Single Mutator**: Only the resolver writes tenant state, conditioned on a version
//! - **Explicit Snapshots**: Access checks receive the active-module set, never read a global

pub mod traits;
pub mod manager;
pub mod registry;
pub mod validation;
pub mod impact;
pub mod resolver;
pub mod security;
pub(crate) mod transition;

pub use security::{AccessGate, AccessSnapshot, PermissionSet, Role};

pub use traits::{
    AuditRecord, ModuleAction, ModuleError, TenantModuleState, TenantSnapshot, TenantStateStore,
};
pub use registry::{CatalogError, DependencyGraph, ModuleCatalog, ModuleDefinition};
pub use impact::{ActivationPlan, ImpactCalculator, PredictedOutcome, SimulationResult};
pub use resolver::{ActivationResolver, ResolveOutcome};
pub use manager::ModuleEngine;
