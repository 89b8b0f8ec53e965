// src/status.rs

//! Status coordinator: observe remote tasks after launch.
//!
//! Nothing here depends on the launch having happened in this process; the
//! state files on the host are the only source of truth, so a client can
//! disconnect and come back later.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::{Result, TaskshipError};
use crate::remote::{RemoteLayout, Transport};
use crate::types::{TaskName, TaskStatus};

/// Current status of `tasks`, or of every task found on the host when
/// `tasks` is empty. Requested tasks with no state files are `Missing`.
pub async fn query_status(
    transport: &dyn Transport,
    layout: &RemoteLayout,
    tasks: &[TaskName],
) -> Result<BTreeMap<TaskName, TaskStatus>> {
    let states = transport.read_states(layout.base()).await?;

    if tasks.is_empty() {
        return Ok(states
            .into_iter()
            .map(|(name, state)| (name, state.status()))
            .collect());
    }

    Ok(tasks
        .iter()
        .map(|name| {
            let status = states
                .get(name)
                .map(|s| s.status())
                .unwrap_or(TaskStatus::Missing);
            (name.clone(), status)
        })
        .collect())
}

/// Poll until every task in `tasks` (or every task on the host, when empty)
/// is terminal, logging each status transition.
///
/// A task with no state at all counts as terminal (`Missing`) so a typo or
/// a task that was never launched cannot block forever.
pub async fn join(
    transport: &dyn Transport,
    layout: &RemoteLayout,
    tasks: &[TaskName],
    poll_interval: Duration,
) -> Result<BTreeMap<TaskName, TaskStatus>> {
    let mut previous: BTreeMap<TaskName, TaskStatus> = BTreeMap::new();
    let mut warned_missing: BTreeSet<TaskName> = BTreeSet::new();

    loop {
        let current = query_status(transport, layout, tasks).await?;

        for (task, status) in &current {
            match previous.get(task) {
                None => info!(task = %task, status = %status, "observed task"),
                Some(prev) if prev != status => {
                    info!(task = %task, from = %prev, to = %status, "task status changed")
                }
                _ => {}
            }
            if *status == TaskStatus::Missing && warned_missing.insert(task.clone()) {
                warn!(task = %task, "no state for task on the host; was it launched?");
            }
        }

        if current.values().all(TaskStatus::is_terminal) {
            return Ok(current);
        }

        previous = current;
        tokio::time::sleep(poll_interval).await;
    }
}

/// `RemoteTaskFailure` for every task that finished unsuccessfully.
pub fn failures(statuses: &BTreeMap<TaskName, TaskStatus>) -> Vec<TaskshipError> {
    statuses
        .iter()
        .filter_map(|(task, status)| match status.exit_code() {
            Some(code) if code != 0 => Some(TaskshipError::RemoteTaskFailure {
                task: task.clone(),
                code,
            }),
            _ => None,
        })
        .collect()
}

/// Plain-text `Task / Status` table.
pub fn render_status_table(statuses: &BTreeMap<TaskName, TaskStatus>) -> String {
    let width = statuses
        .keys()
        .map(|k| k.chars().count())
        .chain(std::iter::once("Task".len()))
        .max()
        .unwrap_or(4);

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  Status", "Task");
    for (task, status) in statuses {
        let _ = writeln!(out, "{task:<width$}  {status}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_columns() {
        let statuses: BTreeMap<TaskName, TaskStatus> = [
            ("A".to_string(), TaskStatus::Succeeded),
            ("builder".to_string(), TaskStatus::WaitingOn("A".into())),
            ("c".to_string(), TaskStatus::Running { pid: Some(7) }),
        ]
        .into_iter()
        .collect();

        let table = render_status_table(&statuses);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Task     Status");
        assert_eq!(lines[1], "A        SUCCESS");
        assert_eq!(lines[2], "builder  WAITING (on=A)");
        assert_eq!(lines[3], "c        RUNNING (pid=7)");
    }

    #[test]
    fn failures_include_timeouts_but_not_missing() {
        let statuses: BTreeMap<TaskName, TaskStatus> = [
            ("ok".to_string(), TaskStatus::Succeeded),
            ("bad".to_string(), TaskStatus::Failed(3)),
            ("slow".to_string(), TaskStatus::TimedOut),
            ("ghost".to_string(), TaskStatus::Missing),
        ]
        .into_iter()
        .collect();

        let names: Vec<String> = failures(&statuses)
            .into_iter()
            .map(|e| match e {
                TaskshipError::RemoteTaskFailure { task, code } => format!("{task}:{code}"),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["bad:3", "slow:124"]);
    }
}
