//! Lazy recursive enumeration of regular files under a directory.
//!
//! Symlinks are followed. walkdir remembers the ancestors of the current
//! entry and reports a link back to one of them as an error instead of
//! descending again, so a cyclic link becomes a single per-item failure and
//! traversal always terminates.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub absolute: PathBuf,
    /// Path relative to the walk root
    pub relative: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    root: PathBuf,
    max_depth: Option<usize>,
}

impl DirectoryWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_depth: None,
        }
    }

    /// Do not descend more than `depth` directories below the root
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Start a new traversal. Each call walks the tree afresh.
    pub fn walk(&self) -> Result<Files, SyncError> {
        if !self.root.is_dir() {
            return Err(SyncError::DirectoryNotFound {
                path: self.root.clone(),
            });
        }

        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        if let Some(depth) = self.max_depth {
            // files inside the deepest allowed directory sit one level lower
            walker = walker.max_depth(depth + 1);
        }

        Ok(Files {
            inner: walker.into_iter(),
            root: self.root.clone(),
        })
    }
}

/// Iterator over the files of one traversal
pub struct Files {
    inner: walkdir::IntoIter,
    root: PathBuf,
}

impl Iterator for Files {
    type Item = Result<LocalFile, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    let source = match e.into_io_error() {
                        Some(io) => io,
                        None => std::io::Error::other("filesystem loop detected"),
                    };
                    return Some(Err(SyncError::local_io(path, source)));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let absolute = entry.into_path();
            let relative = match absolute.strip_prefix(&self.root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => {
                    return Some(Err(SyncError::invalid_path(
                        &absolute,
                        "not under the walk root",
                    )));
                }
            };
            return Some(Ok(LocalFile { absolute, relative }));
        }
    }
}
