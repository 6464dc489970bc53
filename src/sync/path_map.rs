//! Mapping between local paths under a root directory and object keys under
//! a prefix.
//!
//! Keys always use `/`. Local relative paths are split into components by
//! the host's rules and joined with `/`, and keys are split on `/` and pushed
//! as components, so `local_path(object_key(p)) == root.join(p)` for every
//! path the walker produces.

use std::path::{Component, Path, PathBuf};

use super::SyncError;

pub const SEPARATOR: char = '/';

/// Normalize a key prefix: `\` becomes `/` and a non-empty prefix ends with
/// a separator. Empty means no prefix.
///
/// Keys are opaque to the store, so a leading `/` is part of the prefix and
/// is kept: `/logs` and `logs` select different objects.
pub fn normalize_prefix(prefix: &str) -> String {
    let mut prefix = prefix.replace('\\', "/");
    if !prefix.is_empty() && !prefix.ends_with(SEPARATOR) {
        prefix.push(SEPARATOR);
    }
    prefix
}

#[derive(Debug, Clone)]
pub struct PathMapper {
    local_root: PathBuf,
    prefix: String,
}

impl PathMapper {
    pub fn new(local_root: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            local_root: local_root.into(),
            prefix: normalize_prefix(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object key for a file, given either its path relative to the root
    /// or an absolute path under the root.
    pub fn object_key(&self, path: &Path) -> Result<String, SyncError> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.local_root)
                .map_err(|_| SyncError::invalid_path(path, "not under the local root"))?
        } else {
            path
        };

        let mut key = self.prefix.clone();
        let mut segments = 0;
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name
                        .to_str()
                        .ok_or_else(|| SyncError::invalid_path(path, "not valid UTF-8"))?;
                    if segments > 0 {
                        key.push(SEPARATOR);
                    }
                    key.push_str(name);
                    segments += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(SyncError::invalid_path(path, "escapes the local root"));
                }
            }
        }

        if segments == 0 {
            return Err(SyncError::invalid_path(path, "names the root itself"));
        }
        Ok(key)
    }

    /// Local destination for a listed key.
    ///
    /// Returns `Ok(None)` for directory markers: the prefix itself, or any
    /// key ending in the separator.
    pub fn local_path(&self, key: &str) -> Result<Option<PathBuf>, SyncError> {
        let rest = key.strip_prefix(self.prefix.as_str()).ok_or_else(|| {
            SyncError::invalid_key(key, format!("does not start with prefix '{}'", self.prefix))
        })?;
        let rest = rest.trim_start_matches(SEPARATOR);

        if rest.is_empty() || rest.ends_with(SEPARATOR) {
            return Ok(None);
        }

        let mut path = self.local_root.clone();
        for segment in rest.split(SEPARATOR) {
            match segment {
                "" | "." | ".." => {
                    return Err(SyncError::invalid_key(
                        key,
                        "contains an empty, '.' or '..' segment",
                    ));
                }
                name => path.push(name),
            }
        }
        Ok(Some(path))
    }
}
