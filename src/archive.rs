use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::retrieve::sanitize_filename;

/// `<subject>_<kind>_<YYYY-MM-DD_HHMMSS>.zip`
pub fn archive_name(subject: &str, kind: &str, now: chrono::DateTime<chrono::Local>) -> String {
    sanitize_filename(&format!("{}_{}_{}.zip", subject, kind, now.format("%Y-%m-%d_%H%M%S")))
}

/// Zip `files` flat (base names only) into a fresh temp directory under `temp_root`
/// (system temp when `None`). Returns `None` for an empty input without touching disk.
///
/// Files that cannot be read, or whose base name is already in the archive, are
/// logged and skipped. The archive and its directory belong to the caller.
pub fn build_archive(files: &[PathBuf], subject: &str, kind: &str, temp_root: Option<&Path>) -> Result<Option<PathBuf>> {
    if files.is_empty() { return Ok(None); }

    let mut builder = tempfile::Builder::new();
    builder.prefix("storyfetch_zip_");
    let dir = match temp_root {
        Some(root) => {
            std::fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
    .context("failed to create archive directory")?
    .keep();

    let out = dir.join(archive_name(subject, kind, chrono::Local::now()));
    let written = File::create(&out)
        .with_context(|| format!("failed to create {}", out.display()))
        .and_then(|file| write_zip(file, files));
    let added = match written {
        Ok(n) => n,
        Err(e) => {
            // A half-written zip is never handed back.
            if let Err(rm) = std::fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %rm, "failed to remove incomplete archive");
            }
            return Err(e);
        }
    };

    info!(archive = %out.display(), entries = added, "archive written");
    Ok(Some(out))
}

/// Write `files` as flat deflate entries and finish the archive. Returns the entry count.
fn write_zip<W: Write + Seek>(writer: W, files: &[PathBuf]) -> Result<usize> {
    let mut zip = zip::ZipWriter::new(writer);
    let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut names = HashSet::new();
    let mut added = 0usize;
    for path in files {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            warn!(path = %path.display(), "no file name; skipped");
            continue;
        };
        if !names.insert(name.clone()) {
            warn!(path = %path.display(), %name, "duplicate entry name; skipped");
            continue;
        }
        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to add to archive");
                names.remove(&name);
                continue;
            }
        };
        zip.start_file(name.as_str(), options).with_context(|| format!("failed to start entry {name}"))?;
        zip.write_all(&data).with_context(|| format!("failed to write entry {name}"))?;
        added += 1;
    }
    zip.finish().context("failed to finish archive")?;
    Ok(added)
}
