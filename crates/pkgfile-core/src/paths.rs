//! On-disk cache layout.
//!
//! ```text
//! <root>/index/<name>/index.json          cached registry index
//! <root>/files/<name>/<version>/...       extracted package contents
//! ```
//!
//! Scoped names nest one level deeper (`@scope/name`).

use crate::error::{PkgError, Result};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Cache layout version, bumped when the on-disk format changes.
pub const CACHE_LAYOUT_VERSION: u32 = 1;

/// Get the default cache root.
///
/// Uses platform-appropriate locations with versioning:
/// - Linux: `$XDG_CACHE_HOME/pkgfile/v{N}` or `~/.cache/pkgfile/v{N}`
/// - macOS: `~/Library/Caches/pkgfile/v{N}`
/// - Windows: `%LOCALAPPDATA%\pkgfile\v{N}`
///
/// Falls back to `<temp>/pkgfile-cache/v{N}` when no home directory is known.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    let base = dirs_next::cache_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || std::env::temp_dir().join("pkgfile-cache"),
                |p| p.join(".cache").join("pkgfile"),
            )
        },
        |p| p.join("pkgfile"),
    );

    base.join(format!("v{CACHE_LAYOUT_VERSION}"))
}

/// A cached, extracted package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedPackage {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Paths inside a cache root.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn index_root(&self) -> PathBuf {
        self.root.join("index")
    }

    #[must_use]
    pub fn files_root(&self) -> PathBuf {
        self.root.join("files")
    }

    /// Path of the cached index document for a package.
    #[must_use]
    pub fn index_path(&self, name: &str) -> PathBuf {
        join_name(&self.index_root(), name).join("index.json")
    }

    /// Directory holding every extracted version of a package.
    #[must_use]
    pub fn package_dir(&self, name: &str) -> PathBuf {
        join_name(&self.files_root(), name)
    }

    /// Download directory for one exact version.
    #[must_use]
    pub fn version_dir(&self, name: &str, version: &str) -> PathBuf {
        self.package_dir(name).join(version)
    }

    /// List all extracted package versions.
    ///
    /// # Errors
    /// Returns an error if the files directory exists but cannot be read.
    pub fn list_cached(&self) -> Result<Vec<CachedPackage>> {
        let mut result = Vec::new();
        let files_root = self.files_root();

        if !files_root.is_dir() {
            return Ok(result);
        }

        scan_packages(&files_root, None, &mut result)?;
        result.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        Ok(result)
    }

    /// Remove cached data for one package, or everything when `name` is `None`.
    ///
    /// Returns the number of bytes freed.
    ///
    /// # Errors
    /// Returns an error if `name` is not a plain package name, or a directory
    /// cannot be removed.
    pub fn clean(&self, name: Option<&str>) -> Result<u64> {
        if let Some(name) = name {
            let plain = name.split('/').all(|part| {
                !part.is_empty() && part != "." && part != ".." && !part.contains('\\')
            });
            if !plain || name.split('/').count() > 2 {
                return Err(PkgError::invalid_address(name, "not a package name"));
            }
        }

        let targets = match name {
            Some(name) => vec![
                join_name(&self.index_root(), name),
                self.package_dir(name),
            ],
            None => vec![self.index_root(), self.files_root()],
        };

        let mut freed = 0;
        for dir in targets {
            let size = dir_size(&dir);
            match fs::remove_dir_all(&dir) {
                Ok(()) => freed += size,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(freed)
    }
}

/// Join a package name onto a base, one path component per name segment.
fn join_name(base: &Path, name: &str) -> PathBuf {
    name.split('/').fold(base.to_path_buf(), |acc, part| acc.join(part))
}

fn scan_packages(dir: &Path, scope: Option<&str>, result: &mut Vec<CachedPackage>) -> Result<()> {
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        if name_str.starts_with('.') {
            continue;
        }

        if scope.is_none() && name_str.starts_with('@') {
            scan_packages(&path, Some(&name_str), result)?;
            continue;
        }

        let pkg_name = match scope {
            Some(scope) => format!("{scope}/{name_str}"),
            None => name_str.to_string(),
        };

        let Ok(versions) = fs::read_dir(&path) else {
            continue;
        };

        for version_entry in versions.flatten() {
            let version_path = version_entry.path();
            let version = version_entry.file_name().to_string_lossy().to_string();

            // Skip in-flight extraction dirs
            if !version_path.is_dir() || version.starts_with('.') {
                continue;
            }

            result.push(CachedPackage {
                name: pkg_name.clone(),
                version,
                size_bytes: dir_size(&version_path),
                path: version_path,
            });
        }
    }

    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
