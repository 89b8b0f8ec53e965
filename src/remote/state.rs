// src/remote/state.rs

//! Remote per-task state and its layout on the host.
//!
//! Each task owns `<base>/<name>/` on the host:
//!
//! ```text
//! script       runtime library + task body
//! output       stdout/stderr of the run, with bash -x tracing
//! pid          present while the process is alive
//! wait         name of the dependency currently blocking the task
//! status       exit code, written once (atomically) at exit
//! status.old   previous run's status, rotated aside by the prepare step
//! files/       payload: sent files and the two reserved archives
//! ```
//!
//! The client-side view is a small state machine driven only by which of
//! those files exist:
//!
//! ```text
//! (nothing) --launch--> pid --DEPENDS_ON--> pid+wait --dep done--> pid
//!      pid --exit--> status          (status wins over pid/wait)
//! ```

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use regex::Regex;
use shell_escape::unix::escape;
use tracing::warn;

use crate::types::{TaskName, TaskStatus};

/// Names of the state files inside a task directory.
pub const PID_FILE: &str = "pid";
pub const STATUS_FILE: &str = "status";
pub const PREVIOUS_STATUS_FILE: &str = "status.old";
pub const WAIT_FILE: &str = "wait";
pub const OUTPUT_FILE: &str = "output";
pub const SCRIPT_FILE: &str = "script";
pub const FILES_DIR: &str = "files";

/// Paths of the keyed task store on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    base: String,
}

impl RemoteLayout {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let trimmed = base.trim_end_matches('/');
        Self {
            base: if trimmed.is_empty() { "/".into() } else { trimmed.to_string() },
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn task_dir(&self, task: &str) -> String {
        format!("{}/{}", self.base, task)
    }

    pub fn files_dir(&self, task: &str) -> String {
        format!("{}/{}/{}", self.base, task, FILES_DIR)
    }

    pub fn file(&self, task: &str, name: &str) -> String {
        format!("{}/{}/{}", self.base, task, name)
    }
}

/// Raw contents of one task's state files, as read from the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTaskState {
    pub pid: Option<String>,
    pub status: Option<String>,
    pub wait: Option<String>,
}

impl RemoteTaskState {
    pub fn is_empty(&self) -> bool {
        self.pid.is_none() && self.status.is_none() && self.wait.is_none()
    }

    /// Collapse the files into a [`TaskStatus`].
    pub fn status(&self) -> TaskStatus {
        if let Some(raw) = &self.status {
            return match raw.trim().parse::<i32>() {
                Ok(code) => TaskStatus::from_exit_code(code),
                Err(_) => {
                    warn!(status = %raw.trim(), "unreadable status file; treating as failure");
                    TaskStatus::Failed(-1)
                }
            };
        }
        if let Some(dep) = &self.wait {
            return TaskStatus::WaitingOn(dep.trim().to_string());
        }
        if let Some(pid) = &self.pid {
            return TaskStatus::Running {
                pid: pid.trim().parse().ok(),
            };
        }
        TaskStatus::Missing
    }
}

/// Shell command printing `path:contents` for every state file under
/// `base_dir`, one line per file line, sorted.
pub fn state_listing_script(base_dir: &str) -> String {
    format!(
        "find {} -mindepth 2 -maxdepth 2 \\( -name {PID_FILE} -o -name {STATUS_FILE} -o -name {WAIT_FILE} \\) -print0 2>/dev/null \
         | xargs -0 -r grep -H '.*' 2>/dev/null | sort\n",
        escape(base_dir.into())
    )
}

/// Parse the output of [`state_listing_script`].
pub fn parse_state_listing(text: &str) -> Result<BTreeMap<TaskName, RemoteTaskState>> {
    let expr = Regex::new(r"^.*/([^/]*)/(pid|status|wait):(.*)$")?;

    let mut states: BTreeMap<TaskName, RemoteTaskState> = BTreeMap::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let Some(caps) = expr.captures(line) else {
            bail!("bad task status data: {line:?}");
        };
        let entry = states.entry(caps[1].to_string()).or_default();
        let value = Some(caps[3].to_string());
        match &caps[2] {
            "pid" => entry.pid = value,
            "status" => entry.status = value,
            _ => entry.wait = value,
        }
    }
    Ok(states)
}
