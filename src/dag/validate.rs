// src/dag/validate.rs

//! Structural checks over a closed task set: conflicts and cycles.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::errors::{Result, TaskshipError};
use crate::task::TaskDescriptor;
use crate::types::TaskName;

/// Fail with `TaskConflict` if any node lists another node in `conflicts`.
pub fn check_conflicts(nodes: &BTreeMap<TaskName, Arc<TaskDescriptor>>) -> Result<()> {
    for (name, desc) in nodes {
        for other in &desc.conflicts {
            if other != name && nodes.contains_key(other) {
                return Err(TaskshipError::TaskConflict {
                    task: name.clone(),
                    other: other.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Build the wait graph over `nodes`.
///
/// Edge direction: dep -> task. For `B: DEPENDS_ON A` or `A: PREREQ_FOR B`
/// we add edge A -> B.
fn wait_graph<'a>(
    nodes: &'a BTreeMap<TaskName, Arc<TaskDescriptor>>,
    must_precede: &'a BTreeSet<(TaskName, TaskName)>,
) -> DiGraphMap<&'a str, ()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in nodes.keys() {
        graph.add_node(name.as_str());
    }

    for (name, desc) in nodes {
        for dep in desc.dependencies() {
            if nodes.contains_key(dep) {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }
    }

    for (pred, succ) in must_precede {
        graph.add_edge(pred.as_str(), succ.as_str(), ());
    }

    graph
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search with recursion-stack marking.
///
/// Returns the offending chain, starting and ending on the same task, for
/// the first cycle found (nodes are visited in name order).
fn find_cycle(graph: &DiGraphMap<&str, ()>) -> Option<Vec<String>> {
    fn visit<'g>(
        node: &'g str,
        graph: &DiGraphMap<&'g str, ()>,
        marks: &mut HashMap<&'g str, Mark>,
        stack: &mut Vec<&'g str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut chain: Vec<String> =
                    stack[start..].iter().map(|s| s.to_string()).collect();
                chain.push(node.to_string());
                return Some(chain);
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        stack.push(node);

        let mut next: Vec<&str> = graph.neighbors_directed(node, Direction::Outgoing).collect();
        next.sort_unstable();
        for succ in next {
            if let Some(chain) = visit(succ, graph, marks, stack) {
                return Some(chain);
            }
        }

        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut roots: Vec<&str> = graph.nodes().collect();
    roots.sort_unstable();

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    roots
        .into_iter()
        .find_map(|root| visit(root, graph, &mut marks, &mut stack))
}

/// Check the wait graph for cycles and return a launch order.
pub fn check_acyclic(
    nodes: &BTreeMap<TaskName, Arc<TaskDescriptor>>,
    must_precede: &BTreeSet<(TaskName, TaskName)>,
) -> Result<Vec<TaskName>> {
    let graph = wait_graph(nodes, must_precede);

    if let Some(chain) = find_cycle(&graph) {
        return Err(TaskshipError::DependencyCycle(chain.join(" -> ")));
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|s| s.to_string()).collect()),
        Err(cycle) => Err(TaskshipError::DependencyCycle(format!(
            "cycle detected involving task '{}'",
            cycle.node_id()
        ))),
    }
}
