// src/dag/resolver.rs

//! Dependency graph resolver.
//!
//! Breadth-first closure over the requested names: each node's required
//! dependencies must load (else `MissingDependency`), its optional
//! dependencies are added only when they load. After closure the set is
//! checked for conflicts, `PREREQ_FOR` hints are turned into `must_precede`
//! edges, and the combined wait graph is checked for cycles. All of this
//! happens before any file is bundled or any remote I/O occurs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::graph::ResolvedGraph;
use crate::dag::validate::{check_acyclic, check_conflicts};
use crate::errors::{Result, TaskshipError};
use crate::task::{TaskDescriptor, TaskLoader};
use crate::types::TaskName;

/// Resolve `requested` plus the profile's always-run tasks into a validated
/// [`ResolvedGraph`].
pub fn resolve(
    loader: &TaskLoader,
    requested: &[TaskName],
    profile_defaults: &[TaskName],
) -> Result<ResolvedGraph> {
    let mut nodes: BTreeMap<TaskName, Arc<TaskDescriptor>> = BTreeMap::new();
    let mut queued: BTreeSet<TaskName> = BTreeSet::new();
    let mut frontier: VecDeque<Arc<TaskDescriptor>> = VecDeque::new();

    for name in profile_defaults.iter().chain(requested.iter()) {
        if queued.insert(name.clone()) {
            frontier.push_back(loader.load(name)?);
        }
    }

    while let Some(desc) = frontier.pop_front() {
        for dep in &desc.required_deps {
            if queued.contains(dep) {
                continue;
            }
            let loaded = loader.load(dep).map_err(|err| match err {
                TaskshipError::TaskNotFound(_) => TaskshipError::MissingDependency {
                    task: desc.name.clone(),
                    dependency: dep.clone(),
                },
                other => other,
            })?;
            debug!(task = %desc.name, dep = %dep, "pulled in required dependency");
            queued.insert(dep.clone());
            frontier.push_back(loaded);
        }

        for dep in &desc.optional_deps {
            if queued.contains(dep) {
                continue;
            }
            match loader.load(dep) {
                Ok(loaded) => {
                    debug!(task = %desc.name, dep = %dep, "pulled in optional dependency");
                    queued.insert(dep.clone());
                    frontier.push_back(loaded);
                }
                Err(TaskshipError::TaskNotFound(_)) => {
                    debug!(task = %desc.name, dep = %dep, "optional dependency vanished; skipping");
                }
                Err(other) => return Err(other),
            }
        }

        nodes.insert(desc.name.clone(), desc);
    }

    check_conflicts(&nodes)?;

    let must_precede: BTreeSet<(TaskName, TaskName)> = nodes
        .values()
        .flat_map(|desc| {
            desc.successors
                .iter()
                .filter(|succ| nodes.contains_key(*succ) && **succ != desc.name)
                .map(|succ| (desc.name.clone(), succ.clone()))
        })
        .collect();

    let launch_order = check_acyclic(&nodes, &must_precede)?;

    info!(
        tasks = ?launch_order,
        prerequisites = must_precede.len(),
        "resolved task graph"
    );

    Ok(ResolvedGraph::new_unchecked(nodes, must_precede, launch_order))
}
