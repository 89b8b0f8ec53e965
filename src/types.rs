use std::fmt;

/// Canonical task name type used throughout the crate.
///
/// A task name is the file name of its script in one of the task directories.
pub type TaskName = String;

/// Exit code that `timeout(1)` reports when it had to stop a task.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Client-side view of a remote task, derived from its state files.
///
/// The remote process moves through `Running`/`WaitingOn` until it writes
/// `status`; every other variant is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// `pid` present, no `wait`, no `status`.
    Running { pid: Option<u32> },
    /// Blocked inside `DEPENDS_ON` on the named task.
    WaitingOn(TaskName),
    Succeeded,
    Failed(i32),
    TimedOut,
    /// No state files at all: the task was never launched on this host.
    Missing,
}

impl TaskStatus {
    /// Map a recorded exit code onto its terminal status.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => TaskStatus::Succeeded,
            TIMEOUT_EXIT_CODE => TaskStatus::TimedOut,
            other => TaskStatus::Failed(other),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running { .. } | TaskStatus::WaitingOn(_))
    }

    /// Recorded exit code, if the task reached a terminal state through its
    /// own `status` file.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskStatus::Succeeded => Some(0),
            TaskStatus::Failed(code) => Some(*code),
            TaskStatus::TimedOut => Some(TIMEOUT_EXIT_CODE),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Running { pid: Some(pid) } => write!(f, "RUNNING (pid={pid})"),
            TaskStatus::Running { pid: None } => write!(f, "RUNNING"),
            TaskStatus::WaitingOn(dep) => write!(f, "WAITING (on={dep})"),
            TaskStatus::Succeeded => write!(f, "SUCCESS"),
            TaskStatus::Failed(code) => write!(f, "FAILED (code={code})"),
            TaskStatus::TimedOut => write!(f, "TIMED OUT"),
            TaskStatus::Missing => write!(f, "MISSING"),
        }
    }
}

/// Archive group an `INCLUDE_FILE` directive belongs to, chosen by its
/// destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArchiveGroup {
    /// Destination under `~/`; extracted into the remote home directory.
    User,
    /// Absolute destination; extracted into the remote filesystem root.
    System,
}

impl ArchiveGroup {
    /// Reserved file name the launcher recognises and auto-extracts.
    pub fn archive_name(self) -> &'static str {
        match self {
            ArchiveGroup::User => "user.tar.gz",
            ArchiveGroup::System => "system.tar.gz",
        }
    }
}

impl fmt::Display for ArchiveGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveGroup::User => f.write_str("user"),
            ArchiveGroup::System => f.write_str("system"),
        }
    }
}
