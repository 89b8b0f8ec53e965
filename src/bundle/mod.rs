// src/bundle/mod.rs

//! File bundler.
//!
//! For every task in a resolved graph, produce the list of local files that
//! must be copied into the task's remote `files/` directory:
//!
//! - each `SENDFILE` path, as-is;
//! - `user.tar.gz` for includes destined under `~/`;
//! - `system.tar.gz` for includes with absolute destinations.
//!
//! Archives come from a [`cache::BundleCache`] and are only rebuilt when
//! their sources changed. Bundling runs on blocking threads with at most
//! `workers` tasks in flight.

pub mod archive;
pub mod cache;
pub mod classify;
pub mod expand;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::bundle::cache::BundleCache;
use crate::bundle::classify::classify;
use crate::dag::ResolvedGraph;
use crate::errors::{Result, TaskshipError};
use crate::task::TaskDescriptor;
use crate::types::TaskName;

/// Local files to copy into one task's remote payload directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
    pub files: Vec<PathBuf>,
}

impl FileManifest {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FileBundler {
    cache: Arc<BundleCache>,
    workers: usize,
}

impl FileBundler {
    pub fn new(cache_dir: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            cache: Arc::new(BundleCache::new(cache_dir)),
            workers: workers.max(1),
        }
    }

    pub fn cache(&self) -> &BundleCache {
        &self.cache
    }

    /// Build the manifest for a single task.
    pub fn bundle_task(&self, desc: &TaskDescriptor) -> Result<FileManifest> {
        let bundle_err = |message: String| TaskshipError::Bundle {
            task: desc.name.clone(),
            message,
        };

        let missing: Vec<String> = desc
            .send_files
            .iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(bundle_err(format!(
                "missing files for task: {}",
                missing.join(", ")
            )));
        }

        let mut files = desc.send_files.clone();
        let groups = classify(&desc.include_files).map_err(bundle_err)?;

        for (group, entries) in &groups {
            if let Some(built) = self.cache.ensure(&desc.name, *group, entries)? {
                if files
                    .iter()
                    .any(|f| f.file_name() == built.path.file_name())
                {
                    warn!(
                        task = %desc.name,
                        name = group.archive_name(),
                        "sent file shadowed by the {group} archive of the same name"
                    );
                }
                files.push(built.path);
            }
        }

        debug!(task = %desc.name, files = files.len(), "bundled task payload");
        Ok(FileManifest { files })
    }

    /// Bundle every task in `graph` concurrently.
    ///
    /// Any failure aborts the whole run; when several tasks fail, the error
    /// for the first one by name is returned.
    pub async fn bundle_all(
        &self,
        graph: &ResolvedGraph,
    ) -> Result<BTreeMap<TaskName, FileManifest>> {
        let limit = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        for desc in graph.descriptors() {
            let desc = Arc::clone(desc);
            let bundler = self.clone();
            let limit = Arc::clone(&limit);
            set.spawn(async move {
                let _permit = limit
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow::anyhow!("bundler semaphore closed: {e}"))?;
                let name = desc.name.clone();
                let manifest = tokio::task::spawn_blocking(move || bundler.bundle_task(&desc))
                    .await
                    .map_err(|e| anyhow::anyhow!("bundling task {name} panicked: {e}"))??;
                Ok::<_, TaskshipError>((name, manifest))
            });
        }

        let mut manifests = BTreeMap::new();
        let mut failures: BTreeMap<TaskName, TaskshipError> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined.map_err(|e| anyhow::anyhow!("bundler task failed: {e}"))? {
                Ok((name, manifest)) => {
                    manifests.insert(name, manifest);
                }
                Err(err) => {
                    let key = match &err {
                        TaskshipError::Bundle { task, .. } => task.clone(),
                        _ => String::new(),
                    };
                    failures.insert(key, err);
                }
            }
        }

        if let Some((_, err)) = failures.into_iter().next() {
            return Err(err);
        }
        Ok(manifests)
    }
}
