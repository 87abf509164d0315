//! Deduplicating set of absolute file paths.
//!
//! The unit of "things to include" in an archive. A file nominated by any
//! number of routes (explicit path, discovered module, companion library)
//! appears exactly once. Iteration order is sorted, so archive builds over
//! an unchanged set are reproducible.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// An ordered, deduplicating collection of absolute paths.
#[derive(Debug, Clone, Default)]
pub struct PathSet {
    paths: BTreeSet<PathBuf>,
}

impl PathSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a path, converting it to absolute form first.
    ///
    /// The conversion is lexical (no symlink resolution), matching the
    /// entry names later written into the archive.
    pub fn insert(&mut self, path: &Path) -> Result<()> {
        self.paths.insert(std::path::absolute(path)?);
        Ok(())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

impl<'a> IntoIterator for &'a PathSet {
    type Item = &'a PathBuf;
    type IntoIter = std::collections::btree_set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_inserts_collapse() {
        let mut set = PathSet::new();
        set.insert(Path::new("/tmp/app.core")).unwrap();
        set.insert(Path::new("/tmp/app.core")).unwrap();
        set.insert(Path::new("/lib/libsos.so")).unwrap();
        set.insert(Path::new("/lib/libsos.so")).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn relative_paths_become_absolute() {
        let mut set = PathSet::new();
        set.insert(Path::new("some/file.txt")).unwrap();
        let only = set.iter().next().unwrap();
        assert!(only.is_absolute());
        assert!(only.ends_with("some/file.txt"));
    }

    #[test]
    fn iteration_is_sorted() {
        let mut set = PathSet::new();
        set.insert(Path::new("/z/last")).unwrap();
        set.insert(Path::new("/a/first")).unwrap();
        set.insert(Path::new("/m/middle")).unwrap();
        let order: Vec<_> = set.iter().collect();
        assert_eq!(
            order,
            vec![
                Path::new("/a/first"),
                Path::new("/m/middle"),
                Path::new("/z/last")
            ]
        );
    }

    #[test]
    fn contains_uses_absolute_form() {
        let mut set = PathSet::new();
        set.insert(Path::new("/tmp/app.core")).unwrap();
        assert!(set.contains(Path::new("/tmp/app.core")));
        assert!(!set.contains(Path::new("/tmp/other.core")));
    }
}
