//! Module dependency graph
//!
//! Builds the interned, acyclic dependency graph from a catalog and answers
//! traversal queries. Keys are interned as indices in key order, so sorting
//! indices sorts by key.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::module::registry::error::CatalogError;
use crate::module::registry::manifest::{ModuleCatalog, ModuleDefinition};
use crate::module::traits::ModuleError;
use crate::module::validation::{DefinitionValidator, ValidationResult};

/// Read-only dependency graph
///
/// Edges point from a dependent to its prerequisite. Construction fails on
/// any inconsistency; a partially built graph is never returned.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Catalog revision this graph was built from
    revision: u64,
    /// Definitions sorted by key; position is the interned id
    definitions: Vec<ModuleDefinition>,
    /// Key -> interned id
    index: HashMap<String, usize>,
    /// Forward edges (dependent -> prerequisites), ascending
    dependencies: Vec<Vec<usize>>,
    /// Reverse edges (prerequisite -> dependents), ascending
    dependents: Vec<Vec<usize>>,
    /// Topological order, prerequisites first
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Build and validate the graph for a catalog
    pub fn build(catalog: &ModuleCatalog) -> Result<Self, CatalogError> {
        let validator = DefinitionValidator::new();

        let mut definitions = catalog.modules.clone();
        definitions.sort_by(|a, b| a.key.cmp(&b.key));

        for definition in &definitions {
            if definition.depends_on.contains(&definition.key) {
                return Err(CatalogError::SelfDependency(definition.key.clone()));
            }
            if let ValidationResult::Invalid(errors) = validator.validate(definition) {
                return Err(CatalogError::InvalidDefinition {
                    key: definition.key.clone(),
                    errors,
                });
            }
        }

        let mut index = HashMap::with_capacity(definitions.len());
        for (id, definition) in definitions.iter().enumerate() {
            if index.insert(definition.key.clone(), id).is_some() {
                return Err(CatalogError::DuplicateKey(definition.key.clone()));
            }
        }

        let mut dependencies = vec![Vec::new(); definitions.len()];
        let mut dependents = vec![Vec::new(); definitions.len()];
        for (id, definition) in definitions.iter().enumerate() {
            for dep in &definition.depends_on {
                let dep_id = *index.get(dep).ok_or_else(|| CatalogError::UnknownDependency {
                    module: definition.key.clone(),
                    dependency: dep.clone(),
                })?;
                dependencies[id].push(dep_id);
                dependents[dep_id].push(id);
            }
        }
        // depends_on is a BTreeSet, so forward lists are already ascending
        for list in &mut dependents {
            list.sort_unstable();
        }

        if let Some(cycle) = find_cycle(&dependencies) {
            let path = cycle
                .into_iter()
                .map(|id| definitions[id].key.clone())
                .collect();
            return Err(CatalogError::Cycle { path });
        }

        let order = topological_order(&dependencies, &dependents);

        debug!(
            "Dependency graph built: {} modules, revision {}",
            definitions.len(),
            catalog.revision
        );

        Ok(Self {
            revision: catalog.revision,
            definitions,
            index,
            dependencies,
            dependents,
            order,
        })
    }

    /// Catalog revision this graph was built from
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// All keys, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.definitions.iter().map(|d| d.key.as_str())
    }

    /// All definitions, sorted by key
    pub fn definitions(&self) -> &[ModuleDefinition] {
        &self.definitions
    }

    pub fn definition(&self, key: &str) -> Option<&ModuleDefinition> {
        self.index.get(key).map(|&id| &self.definitions[id])
    }

    /// Declared prerequisites of `key`, sorted
    pub fn direct_dependencies(&self, key: &str) -> Result<Vec<&str>, ModuleError> {
        let id = self.index_of(key)?;
        Ok(self.keys_of(&self.dependencies[id]))
    }

    /// Modules that declare `key` as a prerequisite, sorted
    pub fn direct_dependents(&self, key: &str) -> Result<Vec<&str>, ModuleError> {
        let id = self.index_of(key)?;
        Ok(self.keys_of(&self.dependents[id]))
    }

    /// Every module that directly or indirectly depends on `key`, sorted
    pub fn transitive_dependents(&self, key: &str) -> Result<Vec<&str>, ModuleError> {
        let id = self.index_of(key)?;
        Ok(self.keys_of(&self.reachable(id, &self.dependents)))
    }

    /// Every module `key` directly or indirectly depends on, sorted
    pub fn transitive_dependencies(&self, key: &str) -> Result<Vec<&str>, ModuleError> {
        let id = self.index_of(key)?;
        Ok(self.keys_of(&self.reachable(id, &self.dependencies)))
    }

    /// Topological order: every module appears after all of its prerequisites,
    /// ties broken by key
    pub fn activation_order(&self) -> Vec<&str> {
        self.keys_of(&self.order)
    }

    pub(crate) fn index_of(&self, key: &str) -> Result<usize, ModuleError> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| ModuleError::UnknownModule(key.to_string()))
    }

    #[inline]
    pub(crate) fn key_of(&self, id: usize) -> &str {
        &self.definitions[id].key
    }

    #[inline]
    pub(crate) fn definition_of(&self, id: usize) -> &ModuleDefinition {
        &self.definitions[id]
    }

    #[inline]
    pub(crate) fn dependencies_of(&self, id: usize) -> &[usize] {
        &self.dependencies[id]
    }

    #[inline]
    pub(crate) fn dependents_of(&self, id: usize) -> &[usize] {
        &self.dependents[id]
    }

    pub(crate) fn transitive_dependents_of(&self, id: usize) -> Vec<usize> {
        self.reachable(id, &self.dependents)
    }

    pub(crate) fn transitive_dependencies_of(&self, id: usize) -> Vec<usize> {
        self.reachable(id, &self.dependencies)
    }

    /// Position of each id in the topological order
    pub(crate) fn order_rank(&self) -> Vec<usize> {
        let mut rank = vec![0; self.order.len()];
        for (position, &id) in self.order.iter().enumerate() {
            rank[id] = position;
        }
        rank
    }

    /// Ids reachable from `start` along `edges`, excluding `start`, ascending
    fn reachable(&self, start: usize, edges: &[Vec<usize>]) -> Vec<usize> {
        let mut seen = vec![false; self.definitions.len()];
        let mut stack = vec![start];
        seen[start] = true;
        let mut found = Vec::new();

        while let Some(id) = stack.pop() {
            for &next in &edges[id] {
                if !seen[next] {
                    seen[next] = true;
                    found.push(next);
                    stack.push(next);
                }
            }
        }

        found.sort_unstable();
        found
    }

    fn keys_of(&self, ids: &[usize]) -> Vec<&str> {
        ids.iter().map(|&id| self.key_of(id)).collect()
    }
}

/// Depth-first search with a "visiting" marker; returns the first cycle found
/// as a closed path (first id repeated at the end)
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; dependencies.len()];

    for start in 0..dependencies.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }

        // (node, index of the next edge to follow)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        marks[start] = Mark::Visiting;

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            match dependencies[node].get(frame.1) {
                Some(&dep) => {
                    frame.1 += 1;
                    match marks[dep] {
                        Mark::Unvisited => {
                            marks[dep] = Mark::Visiting;
                            stack.push((dep, 0));
                        }
                        Mark::Visiting => {
                            let from = stack.iter().position(|&(id, _)| id == dep).unwrap_or(0);
                            let mut cycle: Vec<usize> =
                                stack[from..].iter().map(|&(id, _)| id).collect();
                            cycle.push(dep);
                            return Some(cycle);
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }

    None
}

/// Kahn's algorithm with a key-ordered ready set (graph must be acyclic)
fn topological_order(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for &dependent in &dependents[id] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    order
}
