use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use taskship::remote::script::ALREADY_RUNNING_EXIT_CODE;
use taskship::remote::{BoxFuture, RemoteTaskState, ScriptOutput, Transport};
use taskship::types::TaskName;

/// Whether a script is the prepare step or the launch stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Prepare,
    Launch,
}

#[derive(Debug, Clone)]
pub struct RecordedScript {
    pub task: Option<TaskName>,
    pub kind: ScriptKind,
    pub text: String,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: Vec<RecordedScript>,
    copies: Vec<(Vec<PathBuf>, String)>,
    states: BTreeMap<TaskName, RemoteTaskState>,
    files: BTreeMap<String, String>,
    running: BTreeSet<TaskName>,
    failing_starts: BTreeSet<TaskName>,
    failing_copies: BTreeSet<TaskName>,
    exit_on_start: Option<i32>,
}

/// A fake host that:
/// - records every script and copy it receives
/// - answers the prepare step with "already running" for chosen tasks
/// - drops a task's previous `status` when it is prepared
/// - serves task state and files from in-memory maps
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    inner: Arc<Mutex<Inner>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every started task immediately records `code` as its status.
    pub fn completing_with(self, code: i32) -> Self {
        self.inner.lock().unwrap().exit_on_start = Some(code);
        self
    }

    /// Pretend a live process already owns `task`'s directory.
    pub fn already_running(&self, task: &str) {
        self.inner.lock().unwrap().running.insert(task.to_string());
    }

    /// Make the launch stub for `task` exit non-zero.
    pub fn fail_start(&self, task: &str) {
        self.inner.lock().unwrap().failing_starts.insert(task.to_string());
    }

    /// Make copies into `task`'s directory fail.
    pub fn fail_copy(&self, task: &str) {
        self.inner.lock().unwrap().failing_copies.insert(task.to_string());
    }

    pub fn set_state(&self, task: &str, state: RemoteTaskState) {
        self.inner.lock().unwrap().states.insert(task.to_string(), state);
    }

    pub fn set_status(&self, task: &str, code: i32) {
        self.set_state(
            task,
            RemoteTaskState {
                status: Some(code.to_string()),
                ..Default::default()
            },
        );
    }

    pub fn set_file(&self, path: &str, contents: &str) {
        self.inner
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), contents.to_string());
    }

    pub fn scripts(&self) -> Vec<RecordedScript> {
        self.inner.lock().unwrap().scripts.clone()
    }

    /// Tasks whose launch stub ran, in order.
    pub fn launched(&self) -> Vec<TaskName> {
        self.scripts()
            .into_iter()
            .filter(|s| s.kind == ScriptKind::Launch)
            .filter_map(|s| s.task)
            .collect()
    }

    /// Text of the last launch stub sent for `task`.
    pub fn launch_script(&self, task: &str) -> Option<String> {
        self.scripts()
            .into_iter()
            .rev()
            .find(|s| s.kind == ScriptKind::Launch && s.task.as_deref() == Some(task))
            .map(|s| s.text)
    }

    pub fn copies(&self) -> Vec<(Vec<PathBuf>, String)> {
        self.inner.lock().unwrap().copies.clone()
    }
}

/// Task name from the `export TASK_NAME=...` line of a rendered script.
fn task_of(script: &str) -> Option<TaskName> {
    script
        .lines()
        .find_map(|l| l.strip_prefix("export TASK_NAME="))
        .map(|v| v.trim_matches('\'').to_string())
}

fn kind_of(script: &str) -> ScriptKind {
    if script.contains("nohup ") {
        ScriptKind::Launch
    } else {
        ScriptKind::Prepare
    }
}

impl Transport for FakeTransport {
    fn describe(&self) -> String {
        "fake".to_string()
    }

    fn copy_files<'a>(
        &'a self,
        files: &'a [PathBuf],
        remote_dir: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if inner
                .failing_copies
                .iter()
                .any(|t| remote_dir.contains(&format!("/{t}/")))
            {
                bail!("scp: connection reset while copying to {remote_dir}");
            }
            inner.copies.push((files.to_vec(), remote_dir.to_string()));
            Ok(())
        })
    }

    fn run_script<'a>(&'a self, script: &'a str) -> BoxFuture<'a, Result<ScriptOutput>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            let task = task_of(script);
            let kind = kind_of(script);
            inner.scripts.push(RecordedScript {
                task: task.clone(),
                kind,
                text: script.to_string(),
            });

            let Some(task) = task else {
                return Ok(ScriptOutput::default());
            };

            if inner.running.contains(&task) {
                return Ok(ScriptOutput {
                    code: ALREADY_RUNNING_EXIT_CODE,
                    stderr: format!("task {task} is already running\n"),
                    ..Default::default()
                });
            }

            if kind == ScriptKind::Prepare {
                // status -> status.old
                if let Some(state) = inner.states.get_mut(&task) {
                    state.status = None;
                }
            }

            if kind == ScriptKind::Launch {
                if inner.failing_starts.contains(&task) {
                    return Ok(ScriptOutput {
                        code: 1,
                        stderr: "bash: timeout: command not found\n".to_string(),
                        ..Default::default()
                    });
                }
                let state = match inner.exit_on_start {
                    Some(code) => RemoteTaskState {
                        status: Some(code.to_string()),
                        ..Default::default()
                    },
                    None => RemoteTaskState {
                        pid: Some("4242".to_string()),
                        ..Default::default()
                    },
                };
                inner.states.insert(task, state);
            }
            Ok(ScriptOutput::default())
        })
    }

    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move { Ok(self.inner.lock().unwrap().files.get(path).cloned()) })
    }

    fn read_states<'a>(
        &'a self,
        _base_dir: &'a str,
    ) -> BoxFuture<'a, Result<BTreeMap<TaskName, RemoteTaskState>>> {
        Box::pin(async move {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .states
                .iter()
                .filter(|(_, s)| !s.is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })
    }
}
