//! Wrap pipeline: assemble the set of files a later debug session needs.
//!
//! The core file is mandatory; explicitly requested paths and discovered
//! modules are best-effort additions. Module discovery failing must never
//! stop the core file itself from being preserved.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::modules;
use crate::path_set::PathSet;

/// Collect the core file, any explicitly requested paths and every
/// discoverable module into one deduplicated path set.
///
/// A requested directory is walked recursively and contributes every
/// regular file beneath it. Discovery failure degrades to a logged warning
/// and zero modules; only a missing core file is an error.
pub fn collect(core_path: &Path, add_paths: &[PathBuf]) -> Result<PathSet> {
    // The one file the archive must always carry.
    std::fs::metadata(core_path)?;

    let mut set = PathSet::new();
    set.insert(core_path)?;

    for path in add_paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() {
                    set.insert(entry.path())?;
                }
            }
        } else {
            // Nonexistent paths stay in the set; the builder drops them
            // with its own existence check.
            set.insert(path)?;
        }
    }

    match modules::discover(core_path) {
        Ok(images) => {
            for image in &images {
                set.insert(&image.path)?;
                for companion in &image.companions {
                    set.insert(companion)?;
                }
            }
            log::info!("discovered {} mapped modules", images.len());
        }
        Err(e) => {
            log::warn!("{}; loaded modules will not be included", e);
        }
    }

    Ok(set)
}
