//! Impact calculator
//!
//! Pure preview of what an activate/deactivate request would do for a tenant
//! snapshot. Nothing here mutates state, so any number of previews may run
//! concurrently with each other and with commits.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::module::registry::DependencyGraph;
use crate::module::transition::{check_transition, Transition};
use crate::module::traits::{ModuleAction, ModuleError, TenantSnapshot};

/// Predicted resolver result for the previewed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictedOutcome {
    /// The commit would flip the module
    Applies,
    /// The module is already in the requested state
    NoChange,
    /// The commit would be rejected with this error
    Rejected { code: String, message: String },
}

impl PredictedOutcome {
    fn from_check(check: &Result<Transition, ModuleError>) -> Self {
        match check {
            Ok(Transition::Apply { .. }) => PredictedOutcome::Applies,
            Ok(Transition::Unchanged(_)) => PredictedOutcome::NoChange,
            Err(e) => PredictedOutcome::Rejected {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        }
    }

    pub fn is_allowed(&self) -> bool {
        !matches!(self, PredictedOutcome::Rejected { .. })
    }
}

/// Preview of a single activate/deactivate request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub target: String,
    pub action: ModuleAction,
    /// Modules whose situation changes (equals `would_block` or `would_enable`)
    pub affected: Vec<String>,
    /// Active modules that directly or indirectly require the target (deactivate)
    pub would_block: Vec<String>,
    /// Modules that become eligible once the target is active (activate)
    pub would_enable: Vec<String>,
    pub outcome: PredictedOutcome,
}

/// Advisory, ordered list of modules to activate to reach a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationPlan {
    pub target: String,
    /// Inactive modules (prerequisites first, target last) in activation order
    pub steps: Vec<String>,
    /// Steps that cannot be taken until billing grants a subscription
    pub unsubscribed: Vec<String>,
}

/// Pure calculator over a shared dependency graph
#[derive(Debug, Clone, Copy)]
pub struct ImpactCalculator<'g> {
    graph: &'g DependencyGraph,
}

impl<'g> ImpactCalculator<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self { graph }
    }

    /// Compute the effect of `action` on `target` for `snapshot`
    pub fn simulate(
        &self,
        snapshot: &TenantSnapshot,
        target: &str,
        action: ModuleAction,
    ) -> Result<SimulationResult, ModuleError> {
        let id = self.graph.index_of(target)?;

        let (would_block, would_enable) = match action {
            ModuleAction::Deactivate => (self.active_dependents(snapshot, id), Vec::new()),
            ModuleAction::Activate => (Vec::new(), self.newly_eligible(snapshot, id)),
        };
        let affected = match action {
            ModuleAction::Deactivate => would_block.clone(),
            ModuleAction::Activate => would_enable.clone(),
        };

        let outcome = PredictedOutcome::from_check(&check_transition(
            self.graph,
            snapshot,
            target,
            action.desired_active(),
        ));

        debug!(
            "Simulated {} {} for tenant {}: {} affected, outcome {:?}",
            action,
            target,
            snapshot.tenant_id,
            affected.len(),
            outcome
        );

        Ok(SimulationResult {
            target: target.to_string(),
            action,
            affected,
            would_block,
            would_enable,
            outcome,
        })
    }

    /// List the inactive modules that must be switched on, in order, before
    /// (and including) `target`. Nothing is activated.
    pub fn activation_plan(
        &self,
        snapshot: &TenantSnapshot,
        target: &str,
    ) -> Result<ActivationPlan, ModuleError> {
        let id = self.graph.index_of(target)?;
        let rank = self.graph.order_rank();

        let mut steps: Vec<usize> = self
            .graph
            .transitive_dependencies_of(id)
            .into_iter()
            .chain(std::iter::once(id))
            .filter(|&m| !snapshot.is_active(self.graph.key_of(m)))
            .collect();
        steps.sort_by_key(|&m| rank[m]);

        let unsubscribed = steps
            .iter()
            .map(|&m| self.graph.key_of(m))
            .filter(|key| !snapshot.is_subscribed(key))
            .map(str::to_string)
            .collect();

        Ok(ActivationPlan {
            target: target.to_string(),
            steps: steps
                .into_iter()
                .map(|m| self.graph.key_of(m).to_string())
                .collect(),
            unsubscribed,
        })
    }

    /// Active modules reachable over reverse edges, sorted by key
    fn active_dependents(&self, snapshot: &TenantSnapshot, id: usize) -> Vec<String> {
        self.graph
            .transitive_dependents_of(id)
            .into_iter()
            .map(|m| self.graph.key_of(m))
            .filter(|key| snapshot.is_active(key))
            .map(str::to_string)
            .collect()
    }

    /// Inactive, subscribed modules whose only unmet direct dependency is
    /// `id`. Only direct dependents of `id` can qualify, and only while `id`
    /// itself is still inactive.
    fn newly_eligible(&self, snapshot: &TenantSnapshot, id: usize) -> Vec<String> {
        if snapshot.is_active(self.graph.key_of(id)) {
            return Vec::new();
        }
        self.graph
            .dependents_of(id)
            .iter()
            .copied()
            .filter(|&m| {
                let key = self.graph.key_of(m);
                !snapshot.is_active(key)
                    && snapshot.is_subscribed(key)
                    && self
                        .graph
                        .dependencies_of(m)
                        .iter()
                        .all(|&dep| dep == id || snapshot.is_active(self.graph.key_of(dep)))
            })
            .map(|m| self.graph.key_of(m).to_string())
            .collect()
    }
}
