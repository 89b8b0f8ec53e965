// src/bundle/cache.rs

//! Local archive cache.
//!
//! Archives live at `<root>/<task>/{user,system}.tar.gz`, each with a
//! `<group>.key` file holding a blake3 fingerprint of the expanded include
//! set. An archive is rebuilt when any contributing source is newer than
//! the archive, or when the include set itself changed (a directive was
//! added, removed or retargeted). Otherwise it is reused without touching
//! disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use blake3::Hasher;
use tracing::{debug, info};

use crate::bundle::archive::write_archive;
use crate::bundle::classify::GroupEntry;
use crate::bundle::expand::{SourceEntry, expand_entries, newest_mtime};
use crate::errors::{Result, TaskshipError};
use crate::types::{ArchiveGroup, TaskName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Reused,
    Rebuilt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArchive {
    pub path: PathBuf,
    pub outcome: CacheOutcome,
}

type LockKey = (TaskName, ArchiveGroup);

#[derive(Debug)]
pub struct BundleCache {
    root: PathBuf,
    /// One lock per (task, group) so concurrent bundlers never race on the
    /// same archive.
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl BundleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn archive_path(&self, task: &str, group: ArchiveGroup) -> PathBuf {
        self.root.join(task).join(group.archive_name())
    }

    fn key_path(&self, task: &str, group: ArchiveGroup) -> PathBuf {
        self.root.join(task).join(format!("{group}.key"))
    }

    fn lock_for(&self, task: &str, group: ArchiveGroup) -> Arc<Mutex<()>> {
        let mut locks = recover(self.locks.lock());
        locks
            .entry((task.to_string(), group))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Make sure the archive for `(task, group)` reflects `entries`.
    ///
    /// Returns `None` when the entries expand to nothing (every source was
    /// optional and absent); any stale archive is removed in that case.
    pub fn ensure(
        &self,
        task: &str,
        group: ArchiveGroup,
        entries: &[GroupEntry],
    ) -> Result<Option<CachedArchive>> {
        let bundle_err = |message: String| TaskshipError::Bundle {
            task: task.to_string(),
            message,
        };

        let lock = self.lock_for(task, group);
        let _guard = recover(lock.lock());

        let pairs = expand_entries(entries).map_err(bundle_err)?;
        let archive = self.archive_path(task, group);
        let key_path = self.key_path(task, group);

        if pairs.is_empty() {
            for stale in [&archive, &key_path] {
                if stale.exists() {
                    fs::remove_file(stale)?;
                }
            }
            debug!(task, %group, "no files to include");
            return Ok(None);
        }

        let fingerprint = fingerprint(group, &pairs);
        let newest = newest_mtime(&pairs).map_err(|e| bundle_err(format!("{e:#}")))?;

        if self.is_fresh(&archive, &key_path, &fingerprint, newest) {
            debug!(task, %group, path = ?archive, "reusing cached archive");
            return Ok(Some(CachedArchive {
                path: archive,
                outcome: CacheOutcome::Reused,
            }));
        }

        if let Some(parent) = archive.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating cache dir {:?}", parent))?;
        }
        write_archive(&pairs, &archive).map_err(|e| bundle_err(format!("{e:#}")))?;
        fs::write(&key_path, &fingerprint)?;

        info!(task, %group, files = pairs.len(), path = ?archive, "built archive");
        Ok(Some(CachedArchive {
            path: archive,
            outcome: CacheOutcome::Rebuilt,
        }))
    }

    fn is_fresh(
        &self,
        archive: &Path,
        key_path: &Path,
        fingerprint: &str,
        newest: Option<std::time::SystemTime>,
    ) -> bool {
        let Ok(built) = fs::metadata(archive).and_then(|m| m.modified()) else {
            return false;
        };
        if newest.is_some_and(|n| n > built) {
            return false;
        }
        matches!(fs::read_to_string(key_path), Ok(stored) if stored.trim() == fingerprint)
    }
}

/// Hash the expanded include set (group, sources and destinations, in order).
fn fingerprint(group: ArchiveGroup, pairs: &[SourceEntry]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(group.archive_name().as_bytes());
    for pair in pairs {
        hasher.update(b"\0");
        hasher.update(pair.source.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(pair.dest.to_string_lossy().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn recover<T>(res: std::sync::LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    res.unwrap_or_else(|poisoned| poisoned.into_inner())
}
