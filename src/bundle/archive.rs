// src/bundle/archive.rs

//! Gzipped tar writer.
//!
//! Entries are written in destination order with directories walked by file
//! name, so the same inputs always give the same member order. Symlinks are
//! followed: the archive carries the content they point at.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::bundle::expand::SourceEntry;

/// Write `entries` to `out` as a `.tar.gz`.
///
/// The archive is built in a uniquely named temp file next to `out` and
/// persisted over it, so readers never see a partial file and two writers
/// of the same archive never share a scratch file.
pub fn write_archive(entries: &[SourceEntry], out: &Path) -> Result<()> {
    let dir = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp archive in {:?}", dir))?;

    let mut builder = Builder::new(GzEncoder::new(tmp, Compression::default()));
    builder.follow_symlinks(true);

    let mut sorted: Vec<&SourceEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.dest.cmp(&b.dest));

    for entry in sorted {
        append_entry(&mut builder, entry)
            .with_context(|| format!("adding {:?} to {:?}", entry.source, out))?;
    }

    let tmp = builder.into_inner()?.finish()?;
    tmp.as_file().sync_all()?;
    tmp.persist(out)
        .map_err(|e| e.error)
        .with_context(|| format!("moving archive into {:?}", out))?;
    Ok(())
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, entry: &SourceEntry) -> Result<()> {
    if !fs::metadata(&entry.source)?.is_dir() {
        builder.append_path_with_name(&entry.source, &entry.dest)?;
        return Ok(());
    }

    for item in WalkDir::new(&entry.source)
        .follow_links(true)
        .sort_by_file_name()
    {
        let item = item?;
        let rel = item.path().strip_prefix(&entry.source)?;
        let name = entry.dest.join(rel);

        // A directory destination of "" (the group root) has no entry of its own.
        if name.as_os_str().is_empty() {
            continue;
        }

        if item.file_type().is_dir() {
            builder.append_dir(&name, item.path())?;
        } else {
            builder.append_path_with_name(item.path(), &name)?;
        }
    }
    Ok(())
}
