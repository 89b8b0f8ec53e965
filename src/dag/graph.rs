// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::task::TaskDescriptor;
use crate::types::TaskName;

/// The validated set of tasks that will run in one invocation.
///
/// Invariants (established by [`crate::dag::resolve`]):
/// - every required dependency of every node is itself a node
/// - no node lists another node in its `conflicts`
/// - dependency edges plus `must_precede` edges form a DAG
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    nodes: BTreeMap<TaskName, Arc<TaskDescriptor>>,
    must_precede: BTreeSet<(TaskName, TaskName)>,
    launch_order: Vec<TaskName>,
}

impl ResolvedGraph {
    pub(crate) fn new_unchecked(
        nodes: BTreeMap<TaskName, Arc<TaskDescriptor>>,
        must_precede: BTreeSet<(TaskName, TaskName)>,
        launch_order: Vec<TaskName>,
    ) -> Self {
        Self {
            nodes,
            must_precede,
            launch_order,
        }
    }

    /// Return all task names, sorted.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<TaskDescriptor>> {
        self.nodes.values()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TaskDescriptor>> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `(A, B)` pairs: A declared `PREREQ_FOR B` and both are in the graph.
    pub fn must_precede(&self) -> &BTreeSet<(TaskName, TaskName)> {
        &self.must_precede
    }

    /// A topological order: every task appears after everything it waits on.
    ///
    /// Launching in this order is not required for correctness (the remote
    /// waits enforce it), but it means a dependency's launch outcome is known
    /// before its dependents are started.
    pub fn launch_order(&self) -> &[TaskName] {
        &self.launch_order
    }

    /// Immediate dependencies of a task, including resolved optional ones.
    pub fn dependencies_of(&self, name: &str) -> Vec<&TaskName> {
        self.nodes
            .get(name)
            .map(|d| d.dependencies().collect())
            .unwrap_or_default()
    }

    /// Predecessors from `must_precede` that `name` does not already wait on.
    ///
    /// The launcher prepends a `DEPENDS_ON` line for each of these so that a
    /// `PREREQ_FOR` hint is enforced by the remote wait protocol.
    pub fn inserted_waits(&self, name: &str) -> Vec<&TaskName> {
        let Some(desc) = self.nodes.get(name) else {
            return Vec::new();
        };
        self.must_precede
            .iter()
            .filter(|(_, succ)| succ == name)
            .map(|(pred, _)| pred)
            .filter(|pred| !desc.dependencies().any(|d| d == *pred))
            .collect()
    }
}
