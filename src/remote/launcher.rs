// src/remote/launcher.rs

//! Remote launcher.
//!
//! Launch happens in two phases:
//!
//! 1. **Prepare** (concurrent, bounded by `workers`): create each task's
//!    directory, refuse tasks whose previous run is still alive, move the
//!    previous `status` aside and copy the payload into `files/`.
//! 2. **Start** (sequential, in launch order): render and run the launch
//!    stub for each prepared task. A task whose dependency could not be
//!    started is skipped, so it never observes a stale `status` left by an
//!    earlier run.
//!
//! Failures are per task and collected into a [`LaunchReport`]; siblings
//! that already started keep running.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::bundle::FileManifest;
use crate::dag::ResolvedGraph;
use crate::errors::TaskshipError;
use crate::remote::script::{ALREADY_RUNNING_EXIT_CODE, LaunchStub, prepare_script, task_script};
use crate::remote::state::RemoteLayout;
use crate::remote::transport::Transport;
use crate::types::TaskName;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub timeout: Duration,
    /// SIGTERM grace period before a timed-out task is killed.
    pub kill_after: Duration,
    pub poll_interval: Duration,
    pub workers: usize,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            kill_after: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            workers: 4,
        }
    }
}

/// What happened to one task during launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Started,
    /// A live process from an earlier launch still owns the task directory.
    AlreadyRunning,
    /// Copy or start failed.
    Failed(String),
    /// Not started because a dependency could not be started.
    Skipped { blocked_by: TaskName },
}

impl LaunchOutcome {
    /// Whether the task will (eventually) produce a `status` on the host.
    pub fn is_live(&self) -> bool {
        matches!(self, LaunchOutcome::Started | LaunchOutcome::AlreadyRunning)
    }
}

impl fmt::Display for LaunchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchOutcome::Started => f.write_str("started"),
            LaunchOutcome::AlreadyRunning => f.write_str("already running"),
            LaunchOutcome::Failed(msg) => write!(f, "failed: {msg}"),
            LaunchOutcome::Skipped { blocked_by } => {
                write!(f, "skipped: dependency {blocked_by} was not started")
            }
        }
    }
}

/// Per-task outcomes, in launch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchReport {
    pub outcomes: Vec<(TaskName, LaunchOutcome)>,
}

impl LaunchReport {
    pub fn outcome(&self, task: &str) -> Option<&LaunchOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, o)| o)
    }

    pub fn started(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == LaunchOutcome::Started)
            .map(|(n, _)| n.as_str())
    }

    /// Tasks that were started or were already running: the only ones
    /// that will write a `status` for this launch.
    pub fn live(&self) -> Vec<TaskName> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_live())
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.is_live())
    }

    /// Failed and skipped tasks as transport errors.
    pub fn errors(&self) -> Vec<TaskshipError> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_live())
            .map(|(task, o)| TaskshipError::Transport {
                task: task.clone(),
                message: o.to_string(),
            })
            .collect()
    }
}

pub struct Launcher {
    transport: Arc<dyn Transport>,
    layout: RemoteLayout,
    options: LaunchOptions,
}

impl Launcher {
    pub fn new(transport: Arc<dyn Transport>, layout: RemoteLayout, options: LaunchOptions) -> Self {
        Self {
            transport,
            layout,
            options,
        }
    }

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    /// Push every task in `graph` to the host and start it.
    pub async fn launch(
        &self,
        graph: &ResolvedGraph,
        manifests: &BTreeMap<TaskName, FileManifest>,
    ) -> LaunchReport {
        info!(
            host = %self.transport.describe(),
            tasks = graph.len(),
            base = %self.layout.base(),
            "launching tasks"
        );

        let mut prepared = self.prepare_all(graph, manifests).await;

        let mut report = LaunchReport::default();
        let mut outcomes: BTreeMap<TaskName, LaunchOutcome> = BTreeMap::new();

        for name in graph.launch_order() {
            let outcome = match prepared.remove(name) {
                Some(Ok(())) => match self.blocking_dependency(graph, name, &outcomes) {
                    Some(dep) => LaunchOutcome::Skipped { blocked_by: dep },
                    None => self.start(graph, name).await,
                },
                Some(Err(outcome)) => outcome,
                None => LaunchOutcome::Failed("task was not prepared".into()),
            };

            match &outcome {
                LaunchOutcome::Started => info!(task = %name, "task started"),
                LaunchOutcome::AlreadyRunning => warn!(task = %name, "task is already running; left untouched"),
                other => warn!(task = %name, outcome = %other, "task not started"),
            }

            outcomes.insert(name.clone(), outcome.clone());
            report.outcomes.push((name.clone(), outcome));
        }

        report
    }

    /// First dependency of `name` (declared or inserted) that is not live.
    fn blocking_dependency(
        &self,
        graph: &ResolvedGraph,
        name: &str,
        outcomes: &BTreeMap<TaskName, LaunchOutcome>,
    ) -> Option<TaskName> {
        graph
            .dependencies_of(name)
            .into_iter()
            .chain(graph.inserted_waits(name))
            .find(|dep| outcomes.get(*dep).is_some_and(|o| !o.is_live()))
            .cloned()
    }

    async fn prepare_all(
        &self,
        graph: &ResolvedGraph,
        manifests: &BTreeMap<TaskName, FileManifest>,
    ) -> BTreeMap<TaskName, Result<(), LaunchOutcome>> {
        let limit = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut set = JoinSet::new();

        for name in graph.tasks() {
            let name = name.to_string();
            let files = manifests.get(&name).map(|m| m.files.clone()).unwrap_or_default();
            let transport = Arc::clone(&self.transport);
            let layout = self.layout.clone();
            let limit = Arc::clone(&limit);

            set.spawn(async move {
                let result = match limit.acquire_owned().await {
                    Ok(_permit) => prepare_one(transport.as_ref(), &layout, &name, &files).await,
                    Err(e) => Err(LaunchOutcome::Failed(format!("worker pool closed: {e}"))),
                };
                (name, result)
            });
        }

        let mut prepared = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, result)) => {
                    prepared.insert(name, result);
                }
                Err(e) => warn!(error = %e, "prepare worker panicked"),
            }
        }
        prepared
    }

    async fn start(&self, graph: &ResolvedGraph, name: &str) -> LaunchOutcome {
        let Some(desc) = graph.get(name) else {
            return LaunchOutcome::Failed("task is not part of the graph".into());
        };

        let waits: Vec<&str> = graph.inserted_waits(name).into_iter().map(String::as_str).collect();
        let script = task_script(&desc.body, &waits);
        let stub = LaunchStub {
            layout: &self.layout,
            task: name,
            script: &script,
            timeout: self.options.timeout,
            kill_after: self.options.kill_after,
            poll_interval: self.options.poll_interval,
        }
        .render();

        match self.transport.run_script(&stub).await {
            Ok(out) if out.success() => LaunchOutcome::Started,
            Ok(out) if out.code == ALREADY_RUNNING_EXIT_CODE => LaunchOutcome::AlreadyRunning,
            Ok(out) => LaunchOutcome::Failed(format!(
                "launch stub exited with {}: {}",
                out.code,
                out.stderr.trim()
            )),
            Err(e) => LaunchOutcome::Failed(format!("{e:#}")),
        }
    }
}

async fn prepare_one(
    transport: &dyn Transport,
    layout: &RemoteLayout,
    name: &str,
    files: &[std::path::PathBuf],
) -> Result<(), LaunchOutcome> {
    let out = transport
        .run_script(&prepare_script(layout, name))
        .await
        .map_err(|e| LaunchOutcome::Failed(format!("{e:#}")))?;

    match out.code {
        0 => {}
        ALREADY_RUNNING_EXIT_CODE => return Err(LaunchOutcome::AlreadyRunning),
        code => {
            return Err(LaunchOutcome::Failed(format!(
                "creating task directory exited with {code}: {}",
                out.stderr.trim()
            )));
        }
    }

    if !files.is_empty() {
        let dir = layout.files_dir(name);
        transport
            .copy_files(files, &dir)
            .await
            .map_err(|e| LaunchOutcome::Failed(format!("{e:#}")))?;
        debug!(task = %name, files = files.len(), dir = %dir, "payload copied");
    }
    Ok(())
}
