// src/plan.rs

//! A group of tasks to run together on one host: resolve, bundle, launch,
//! join.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use shell_escape::unix::escape;
use tracing::info;

use crate::bundle::{FileBundler, FileManifest};
use crate::dag::{ResolvedGraph, resolve};
use crate::errors::Result;
use crate::remote::{LaunchReport, Launcher, RemoteLayout, Transport};
use crate::status;
use crate::task::TaskLoader;
use crate::types::{TaskName, TaskStatus};

/// Name of the synthesised package installation task.
pub const INSTALL_TASK: &str = "install-packages";

/// Split a package list on commas and whitespace.
pub fn split_packages(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Script body for the install task. It waits for `networking` when such
/// a task exists.
pub fn install_script(packages: &[String]) -> String {
    let quoted: Vec<Cow<'_, str>> = packages
        .iter()
        .map(|p| escape(Cow::Borrowed(p.as_str())))
        .collect();
    format!("MAYBE_DEPENDS_ON networking\nPKG_INSTALL {}\n", quoted.join(" "))
}

/// Register the install task in `loader` if there is anything to install.
/// Returns the task name to add to the requested set.
pub fn register_install_task(loader: &TaskLoader, packages: &[String]) -> Option<TaskName> {
    if packages.is_empty() {
        return None;
    }
    loader.register(INSTALL_TASK, install_script(packages));
    Some(INSTALL_TASK.to_string())
}

#[derive(Debug, Clone)]
pub struct TaskPlan {
    graph: ResolvedGraph,
}

impl TaskPlan {
    /// Resolve the requested tasks. All resolution errors surface here,
    /// before anything is bundled or sent.
    pub fn resolve(
        loader: &TaskLoader,
        requested: &[TaskName],
        profile_defaults: &[TaskName],
    ) -> Result<Self> {
        Ok(Self {
            graph: resolve(loader, requested, profile_defaults)?,
        })
    }

    pub fn graph(&self) -> &ResolvedGraph {
        &self.graph
    }

    pub fn has_tasks(&self) -> bool {
        !self.graph.is_empty()
    }

    /// Human-readable launch plan.
    pub fn dry_run(&self) -> String {
        if !self.has_tasks() {
            return "No tasks to run.\n".to_string();
        }

        let mut out = String::from("Would start tasks in the following order:\n");
        for name in self.graph.launch_order() {
            let deps: Vec<&str> = self
                .graph
                .dependencies_of(name)
                .into_iter()
                .chain(self.graph.inserted_waits(name))
                .map(String::as_str)
                .collect();

            if deps.is_empty() {
                let _ = writeln!(out, " - {name}");
            } else {
                let _ = writeln!(out, " - {name} (depends on: {})", deps.join(", "));
            }

            if name == INSTALL_TASK {
                if let Some(desc) = self.graph.get(name) {
                    for line in desc.body.lines() {
                        let _ = writeln!(out, "   {line}");
                    }
                }
            }
        }
        out
    }

    /// Bundle every task's payload.
    pub async fn bundle(&self, bundler: &FileBundler) -> Result<BTreeMap<TaskName, FileManifest>> {
        bundler.bundle_all(&self.graph).await
    }

    /// Bundle, then launch. Bundling failures abort before any remote I/O;
    /// launch failures are per task and come back in the report.
    pub async fn launch(&self, bundler: &FileBundler, launcher: &Launcher) -> Result<LaunchReport> {
        let manifests = self.bundle(bundler).await?;
        let report = launcher.launch(&self.graph, &manifests).await;
        info!(
            started = report.started().count(),
            total = report.outcomes.len(),
            "launch finished"
        );
        Ok(report)
    }

    /// Wait for every live task of `report` to reach a terminal state.
    ///
    /// Skipped and failed launches are left out: they have no run to wait
    /// for, and the launch report already carries their errors.
    pub async fn join(
        &self,
        report: &LaunchReport,
        transport: &dyn Transport,
        layout: &RemoteLayout,
        poll_interval: Duration,
    ) -> Result<BTreeMap<TaskName, TaskStatus>> {
        let names: Vec<TaskName> = report.live();
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }
        status::join(transport, layout, &names, poll_interval).await
    }
}
