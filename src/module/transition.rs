//! Activation preconditions
//!
//! The single check both the impact calculator and the resolver run, so a
//! preview and the commit that follows it can never disagree.

use crate::module::registry::DependencyGraph;
use crate::module::traits::{ModuleError, TenantModuleState, TenantSnapshot};

/// Result of a successful precondition check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// `is_active` already has the requested value
    Unchanged(TenantModuleState),
    /// The flip is allowed
    Apply {
        previous: TenantModuleState,
        next: TenantModuleState,
    },
}

/// Decide whether `key` may be set to `desired_active` for this snapshot
pub(crate) fn check_transition(
    graph: &DependencyGraph,
    snapshot: &TenantSnapshot,
    key: &str,
    desired_active: bool,
) -> Result<Transition, ModuleError> {
    let id = graph.index_of(key)?;
    let current = snapshot.module(key);

    if desired_active {
        if current.is_active {
            return Ok(Transition::Unchanged(current));
        }
        if !current.is_subscribed {
            return Err(ModuleError::NotSubscribed {
                module: key.to_string(),
            });
        }

        let missing: Vec<String> = graph
            .dependencies_of(id)
            .iter()
            .map(|&dep| graph.key_of(dep))
            .filter(|dep| !snapshot.is_active(dep))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ModuleError::DependencyUnmet {
                module: key.to_string(),
                missing,
            });
        }
    } else {
        // Mandatory modules refuse deactivation whatever their current state
        if !graph.definition_of(id).can_disable {
            return Err(ModuleError::NotDisableable {
                module: key.to_string(),
            });
        }
        if !current.is_active {
            return Ok(Transition::Unchanged(current));
        }

        let blockers: Vec<String> = graph
            .dependents_of(id)
            .iter()
            .map(|&dependent| graph.key_of(dependent))
            .filter(|dependent| snapshot.is_active(dependent))
            .map(str::to_string)
            .collect();
        if !blockers.is_empty() {
            return Err(ModuleError::BlockingDependents {
                module: key.to_string(),
                blockers,
            });
        }
    }

    Ok(Transition::Apply {
        previous: current,
        next: TenantModuleState {
            is_active: desired_active,
            version: current.version + 1,
            ..current
        },
    })
}

/// Active modules in `snapshot` that break an activation invariant
///
/// Reports, per active module in key order: `UnknownModule` when the graph
/// no longer has it, `NotSubscribed` when it lost its subscription, and
/// `DependencyUnmet` when a prerequisite is inactive. Inactive modules
/// never violate anything.
pub(crate) fn invariant_violations(
    graph: &DependencyGraph,
    snapshot: &TenantSnapshot,
) -> Vec<ModuleError> {
    let mut violations = Vec::new();
    for (key, state) in snapshot.modules.iter().filter(|(_, m)| m.is_active) {
        let id = match graph.index_of(key) {
            Ok(id) => id,
            Err(e) => {
                violations.push(e);
                continue;
            }
        };
        if !state.is_subscribed {
            violations.push(ModuleError::NotSubscribed {
                module: key.clone(),
            });
        }
        let missing: Vec<String> = graph
            .dependencies_of(id)
            .iter()
            .map(|&dep| graph.key_of(dep))
            .filter(|dep| !snapshot.is_active(dep))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            violations.push(ModuleError::DependencyUnmet {
                module: key.clone(),
                missing,
            });
        }
    }
    violations
}
