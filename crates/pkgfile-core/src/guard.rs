//! Lexical path containment.

use crate::error::{PkgError, Result};
use std::path::{Component, Path, PathBuf};

/// Ensure `full_path` stays inside `root` and return it unchanged.
///
/// The check is purely lexical: `.` components are dropped and `..` pops the
/// previous component. The filesystem is never consulted.
///
/// # Errors
/// Returns `ForbiddenPath` if the normalized path is not under `root`.
pub fn guard(full_path: &Path, root: &Path) -> Result<PathBuf> {
    let normalized = normalize(full_path);
    let root_normalized = normalize(root);

    if normalized.starts_with(&root_normalized) {
        Ok(full_path.to_path_buf())
    } else {
        Err(PkgError::ForbiddenPath {
            path: full_path.to_path_buf(),
            root: root.to_path_buf(),
        })
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if out.file_name().is_some() {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
