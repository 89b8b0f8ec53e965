// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [tasks]
/// dirs = ["~/.config/taskship/tasks", "/usr/share/taskship/tasks"]
/// remote_dir = "/tmp/tasks"
/// timeout_secs = 600
///
/// [profile]
/// tasks = ["ocid"]
/// install = ["git", "tmux"]
///
/// [ssh]
/// host = "10.0.0.5"
/// user = "opc"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub tasks: TasksSection,

    #[serde(default)]
    pub profile: ProfileSection,

    #[serde(default)]
    pub ssh: SshSection,
}

/// `[tasks]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TasksSection {
    /// Search path for task scripts, first match wins. `~/` is expanded.
    #[serde(default = "default_task_dirs")]
    pub dirs: Vec<String>,

    /// Base directory for per-task state on the host.
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// Local archive cache. Defaults to the user cache directory.
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Wall-clock limit for each task on the host.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How often `DEPENDS_ON` (remote) and `join` (local) poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Bundling and copy concurrency.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_task_dirs() -> Vec<String> {
    vec![
        "~/.config/taskship/tasks".to_string(),
        "/usr/share/taskship/tasks".to_string(),
    ]
}

fn default_remote_dir() -> String {
    "/tmp/tasks".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_workers() -> usize {
    4
}

impl Default for TasksSection {
    fn default() -> Self {
        Self {
            dirs: default_task_dirs(),
            remote_dir: default_remote_dir(),
            cache_dir: None,
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            workers: default_workers(),
        }
    }
}

/// `[profile]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileSection {
    /// Tasks added to every `run`.
    #[serde(default)]
    pub tasks: Vec<String>,

    /// Packages installed by the synthesised `install-packages` task.
    #[serde(default)]
    pub install: Vec<String>,
}

/// `[ssh]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshSection {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub private_key: Option<String>,

    /// Extra options for ssh and scp, e.g. `["-oProxyJump=bastion"]`.
    #[serde(default)]
    pub args: Vec<String>,
}

/// `[tasks]` after validation, with paths expanded and durations typed.
#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub dirs: Vec<PathBuf>,
    pub remote_dir: String,
    pub cache_dir: PathBuf,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub workers: usize,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub tasks: TaskSettings,
    pub profile: ProfileSection,
    pub ssh: SshSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(tasks: TaskSettings, profile: ProfileSection, ssh: SshSection) -> Self {
        Self { tasks, profile, ssh }
    }
}
