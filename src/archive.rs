//! Zip packaging of a path set and the inverse extraction.
//!
//! Archive entries are named by each file's *absolute* source path at build
//! time, so the archive namespace mirrors the filesystem it came from.
//! Extraction recreates that layout under a destination root. The absolute
//! naming makes archives non-portable across differing root conventions;
//! that is the established on-disk format and is kept as-is.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::Result;
use crate::path_set::PathSet;

/// Write every existing file in `paths` into a zip archive at
/// `archive_path`.
///
/// Paths that no longer exist or cannot be opened are skipped with a log
/// line; a module can disappear between discovery and packaging and that
/// must not fail the build. The archive's own destination path is excluded
/// so a destination inside a scanned directory never packs itself. Only a
/// destination that cannot be created or written is fatal.
pub fn build(paths: &PathSet, archive_path: &Path) -> Result<()> {
    let archive_abs = std::path::absolute(archive_path)?;
    let file = File::create(&archive_abs)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for path in paths.iter() {
        if path == archive_abs {
            continue;
        }
        if !path.exists() {
            log::info!("skipping missing file {}", path.display());
            continue;
        }
        let mut src = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("skipping unreadable file {}: {}", path.display(), e);
                continue;
            }
        };
        log::debug!("adding {}", path.display());
        zip.start_file(path.to_string_lossy().into_owned(), options)?;
        if let Err(e) = io::copy(&mut src, &mut zip) {
            // Source read failures are as non-fatal as a vanished file;
            // only the destination staying writable matters.
            log::warn!("skipping {} after read failure: {}", path.display(), e);
            zip.abort_file()?;
        }
    }

    zip.finish()?;
    Ok(())
}

/// Restore every archive entry under `dest_dir`, recreating the stored
/// absolute path as a subtree.
///
/// `dest_dir` is created if absent. A corrupt or unreadable archive is
/// fatal; a partially extracted tree is acceptable since the operation is
/// re-runnable.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dest_dir)?;

    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let target = entry_destination(dest_dir, entry.name());
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::debug!("extracting {}", target.display());
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

/// List the entry names stored in an archive.
pub fn entry_names(archive_path: &Path) -> Result<Vec<String>> {
    let archive = ZipArchive::new(File::open(archive_path)?)?;
    Ok(archive.file_names().map(str::to_owned).collect())
}

/// Join an entry name onto the destination root, keeping only normal path
/// components. Root and prefix markers are dropped (entry names are
/// absolute by contract) and any `..` is discarded rather than allowed to
/// escape the destination.
fn entry_destination(dest_dir: &Path, name: &str) -> PathBuf {
    let mut out = dest_dir.to_path_buf();
    for component in Path::new(name).components() {
        if let Component::Normal(part) = component {
            out.push(part);
        }
    }
    out
}
