// src/bundle/expand.rs

//! Expand group entries into concrete `(source, destination)` pairs and
//! compute the freshest modification time among them.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use globset::GlobBuilder;
use walkdir::WalkDir;

use crate::bundle::classify::GroupEntry;
use crate::task::descriptor::is_glob_pattern;

/// A file or directory to place in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub source: PathBuf,
    /// Path inside the archive. Directories are included recursively.
    pub dest: PathBuf,
}

/// Resolve every entry against the local filesystem.
///
/// - a regular file lands at `dest`, or at `dest/<file name>` when `dest` is
///   empty or ends with `/`
/// - a directory lands at `dest`, recursively
/// - a glob places each match at `dest/<match name>`
///
/// A literal path that does not exist is treated as a glob with no matches.
/// No matches is an error unless the entry is optional.
pub fn expand_entries(entries: &[GroupEntry]) -> std::result::Result<Vec<SourceEntry>, String> {
    let mut pairs = Vec::new();

    for entry in entries {
        let path = Path::new(&entry.source);
        let dest = normalise(&entry.dest);

        if path.is_file() {
            let dest = if entry.dest.is_empty() || entry.dest.ends_with('/') {
                match path.file_name() {
                    Some(name) => dest.join(name),
                    None => dest,
                }
            } else {
                dest
            };
            pairs.push(SourceEntry {
                source: path.to_path_buf(),
                dest,
            });
            continue;
        }

        if path.is_dir() {
            pairs.push(SourceEntry {
                source: path.to_path_buf(),
                dest,
            });
            continue;
        }

        let matches = if is_glob_pattern(&entry.source) {
            glob_matches(&entry.source).map_err(|e| format!("{e:#}"))?
        } else {
            Vec::new()
        };

        if matches.is_empty() {
            if entry.optional {
                continue;
            }
            return Err(format!("file or pattern not found: {}", entry.source));
        }

        for m in matches {
            let name = m.file_name().map(PathBuf::from).unwrap_or_default();
            pairs.push(SourceEntry {
                source: m,
                dest: dest.join(name),
            });
        }
    }

    Ok(pairs)
}

/// Drop trailing slashes and `.` components from an archive path.
fn normalise(dest: &str) -> PathBuf {
    Path::new(dest)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Expand an absolute glob pattern, returning matches sorted by path.
///
/// `*` does not cross directory separators; `**` does.
fn glob_matches(pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob pattern: {pattern}"))?
        .compile_matcher();

    // Walk from the deepest directory that has no glob characters.
    let mut base = PathBuf::from("/");
    let mut remaining = 0usize;
    let mut in_glob = false;
    for comp in Path::new(pattern).components() {
        if let Component::Normal(part) = comp {
            if in_glob || is_glob_pattern(&part.to_string_lossy()) {
                in_glob = true;
                remaining += 1;
            } else {
                base.push(part);
            }
        }
    }

    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let max_depth = if pattern.contains("**") {
        usize::MAX
    } else {
        remaining.max(1)
    };

    let mut found = Vec::new();
    for item in WalkDir::new(&base)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let item = item.with_context(|| format!("walking {:?} for {pattern}", base))?;
        if matcher.is_match(item.path()) {
            found.push(item.into_path());
        }
    }
    Ok(found)
}

/// The most recent modification time among all sources, recursing into
/// directories. `None` if there are no sources.
pub fn newest_mtime(entries: &[SourceEntry]) -> Result<Option<SystemTime>> {
    let mut newest: Option<SystemTime> = None;

    for entry in entries {
        // The link itself counts too: repointing a symlink changes content.
        if let Ok(meta) = fs::symlink_metadata(&entry.source) {
            bump(&mut newest, meta.modified()?);
        }
        for item in WalkDir::new(&entry.source).follow_links(true) {
            let item = item.with_context(|| format!("scanning {:?}", entry.source))?;
            let modified = item
                .metadata()
                .with_context(|| format!("stat {:?}", item.path()))?
                .modified()?;
            bump(&mut newest, modified);
        }
    }

    Ok(newest)
}

fn bump(newest: &mut Option<SystemTime>, candidate: SystemTime) {
    if newest.is_none_or(|n| candidate > n) {
        *newest = Some(candidate);
    }
}
