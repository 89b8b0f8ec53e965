// src/task/loader.rs

//! Task loader: locates task scripts and caches their descriptors.
//!
//! Search order is the order of the configured directories (user directory
//! first, built-in directory last); the first directory containing a file
//! with the task's name wins. Tasks can also be registered in memory, which
//! shadows every directory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::errors::{Result, TaskshipError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::task::descriptor::TaskDescriptor;
use crate::task::macros::{resolve_script, TaskLookup};
use crate::types::TaskName;

/// Loads and caches [`TaskDescriptor`]s for a single invocation.
#[derive(Debug)]
pub struct TaskLoader {
    fs: Arc<dyn FileSystem>,
    dirs: Vec<PathBuf>,
    registered: Mutex<BTreeMap<TaskName, String>>,
    cache: Mutex<HashMap<TaskName, Arc<TaskDescriptor>>>,
}

impl TaskLoader {
    /// Loader over the real filesystem.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self::with_fs(Arc::new(RealFileSystem), dirs)
    }

    pub fn with_fs(fs: Arc<dyn FileSystem>, dirs: Vec<PathBuf>) -> Self {
        Self {
            fs,
            dirs,
            registered: Mutex::new(BTreeMap::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register an in-memory task script under `name`.
    ///
    /// Registered tasks take precedence over files and drop any descriptor
    /// already cached under that name.
    pub fn register(&self, name: impl Into<TaskName>, script: impl Into<String>) {
        let name = name.into();
        debug!(task = %name, "registering in-memory task");
        lock(&self.cache).remove(&name);
        lock(&self.registered).insert(name, script.into());
    }

    /// Find the script file for `name`, if any directory has one.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        if !is_valid_name(name) {
            return None;
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| self.fs.is_file(path))
    }

    /// Load (or fetch from cache) the descriptor for `name`.
    pub fn load(&self, name: &str) -> Result<Arc<TaskDescriptor>> {
        if let Some(desc) = lock(&self.cache).get(name) {
            trace!(task = %name, "task descriptor cache hit");
            return Ok(Arc::clone(desc));
        }

        let registered = lock(&self.registered).get(name).cloned();
        let (script, path) = match registered {
            Some(script) => (script, None),
            None => {
                let path = self
                    .locate(name)
                    .ok_or_else(|| TaskshipError::TaskNotFound(name.to_string()))?;
                (self.fs.read_to_string(&path)?, Some(path))
            }
        };

        debug!(task = %name, path = ?path, "parsing task script");
        let mut desc = resolve_script(name, &script, self)?;
        desc.path = path;

        let desc = Arc::new(desc);
        lock(&self.cache).insert(name.to_string(), Arc::clone(&desc));
        Ok(desc)
    }

    /// Every task name available across all directories plus registered
    /// tasks, sorted and de-duplicated. Editor backups (`name~`) and hidden
    /// files are skipped.
    pub fn list(&self) -> Result<Vec<TaskName>> {
        let mut names: BTreeSet<TaskName> = lock(&self.registered).keys().cloned().collect();

        for dir in &self.dirs {
            if !self.fs.is_dir(dir) {
                continue;
            }
            for path in self.fs.read_dir(dir)? {
                if !self.fs.is_file(&path) {
                    continue;
                }
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if is_valid_name(name) && !name.ends_with('~') {
                        names.insert(name.to_string());
                    }
                }
            }
        }

        Ok(names.into_iter().collect())
    }
}

impl TaskLookup for TaskLoader {
    fn task_exists(&self, name: &str) -> bool {
        lock(&self.registered).contains_key(name) || self.locate(name).is_some()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains('/')
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
