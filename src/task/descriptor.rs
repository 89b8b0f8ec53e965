// src/task/descriptor.rs

//! Immutable description of one task, produced by the macro resolver.

use std::path::PathBuf;

use crate::types::TaskName;

/// One `INCLUDE_FILE` / `MAYBE_INCLUDE_FILE` directive.
///
/// Both paths are kept exactly as written (`~/` unexpanded) so the bundler
/// can classify the destination and the fingerprint stays stable across
/// users.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludeFile {
    pub source: String,
    pub destination: String,
    /// `MAYBE_INCLUDE_FILE`: a missing source is skipped silently.
    pub optional: bool,
}

impl IncludeFile {
    /// Whether the source is a glob pattern rather than a literal path.
    pub fn is_glob(&self) -> bool {
        is_glob_pattern(&self.source)
    }
}

pub(crate) fn is_glob_pattern(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// Everything the orchestrator knows about a task.
///
/// A descriptor is pure data: it never references remote state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub name: TaskName,
    /// Script the descriptor was parsed from; `None` for tasks registered in
    /// memory (e.g. the synthesised package installer).
    pub path: Option<PathBuf>,
    /// `DEPENDS_ON` targets, in declaration order.
    pub required_deps: Vec<TaskName>,
    /// `MAYBE_DEPENDS_ON` targets that were resolvable when parsed. Their
    /// lines were rewritten to `DEPENDS_ON`, so they behave like required
    /// dependencies from here on.
    pub optional_deps: Vec<TaskName>,
    pub conflicts: Vec<TaskName>,
    /// `PREREQ_FOR` targets: this task must finish before each of them, when
    /// they are part of the same run.
    pub successors: Vec<TaskName>,
    pub run_once: bool,
    pub include_files: Vec<IncludeFile>,
    /// `SENDFILE` sources with `~/` expanded.
    pub send_files: Vec<PathBuf>,
    /// Normalised script body: macro lines rewritten or commented out.
    pub body: String,
}

impl TaskDescriptor {
    /// Every dependency edge this task waits on remotely.
    pub fn dependencies(&self) -> impl Iterator<Item = &TaskName> {
        self.required_deps.iter().chain(self.optional_deps.iter())
    }
}
