#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use taskship::config::{ConfigFile, RawConfigFile};
use taskship::task::TaskLoader;
use tempfile::TempDir;

/// Scratch area for tests: a task search directory plus room for payload
/// files, a bundle cache and a "remote" task directory.
///
/// Everything lives under one `TempDir` that is removed on drop.
pub struct TaskDirBuilder {
    root: TempDir,
}

impl TaskDirBuilder {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(root.path().join("tasks")).expect("create tasks dir");
        Self { root }
    }

    /// Write a task script named `name`.
    pub fn with_task(self, name: &str, script: &str) -> Self {
        fs::write(self.tasks_dir().join(name), script).expect("write task script");
        self
    }

    /// Write a payload file under `data/`, creating parents. Returns the
    /// absolute path, for use in `INCLUDE_FILE`/`SENDFILE` lines.
    pub fn data_file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root.path().join("data").join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create data dir");
        }
        fs::write(&path, contents).expect("write data file");
        path
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.path().join("tasks")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.path().join("cache")
    }

    /// Directory standing in for the remote `remote_dir`.
    pub fn remote_dir(&self) -> PathBuf {
        self.root.path().join("remote")
    }

    /// Directory standing in for the remote user's home.
    pub fn home_dir(&self) -> PathBuf {
        let home = self.root.path().join("home");
        fs::create_dir_all(&home).expect("create home dir");
        home
    }

    /// Loader over the single task directory.
    pub fn loader(&self) -> TaskLoader {
        TaskLoader::new(vec![self.tasks_dir()])
    }

    /// Validated config pointing every directory into this scratch area.
    pub fn config(&self) -> ConfigFile {
        let mut raw = RawConfigFile::default();
        raw.tasks.dirs = vec![self.tasks_dir().display().to_string()];
        raw.tasks.remote_dir = self.remote_dir().display().to_string();
        raw.tasks.cache_dir = Some(self.cache_dir().display().to_string());
        raw.tasks.poll_interval_ms = 50;
        raw.tasks.timeout_secs = 30;
        ConfigFile::try_from(raw).expect("Failed to build valid config from builder")
    }
}

impl Default for TaskDirBuilder {
    fn default() -> Self {
        Self::new()
    }
}
