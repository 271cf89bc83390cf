//! Registry index cache.
//!
//! One `index.json` per package; the file's mtime is the fetch time.

use crate::error::Result;
use crate::paths::CacheLayout;
use crate::registry::{RegistryClient, RegistryIndex};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Time-bounded cache of registry index documents.
#[derive(Debug, Clone)]
pub struct IndexCache {
    layout: CacheLayout,
    expiry: Duration,
}

impl IndexCache {
    #[must_use]
    pub fn new(layout: CacheLayout, expiry: Duration) -> Self {
        Self { layout, expiry }
    }

    /// Get the index for a package, refreshing it from the registry when
    /// missing or older than the expiry window.
    ///
    /// # Errors
    /// Returns registry errors from a refresh and I/O errors other than a
    /// missing cache file.
    pub async fn get(
        &self,
        registry: &RegistryClient,
        name: &str,
        registry_path: &str,
    ) -> Result<RegistryIndex> {
        let path = self.layout.index_path(name);

        if let Some(index) = self.read_fresh(&path, name).await? {
            debug!(name, "Using cached registry index");
            return Ok(index);
        }

        let index = registry.fetch_index(name, registry_path).await?;
        self.store(&path, &index).await?;

        debug!(name, versions = index.versions.len(), "Refreshed registry index");
        Ok(index)
    }

    /// Read the cached entry if it exists and is still fresh.
    async fn read_fresh(&self, path: &Path, name: &str) -> Result<Option<RegistryIndex>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let fetched_at = metadata.modified()?;
        if is_stale(fetched_at, SystemTime::now(), self.expiry) {
            debug!(name, "Cached registry index is stale");
            return Ok(None);
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(index) => Ok(Some(index)),
            Err(e) => {
                warn!(name, error = %e, "Ignoring corrupt cached registry index");
                Ok(None)
            }
        }
    }

    /// Persist an index, replacing any previous entry atomically.
    async fn store(&self, path: &Path, index: &RegistryIndex) -> Result<()> {
        let bytes = serde_json::to_vec(index)?;
        let path: PathBuf = path.to_path_buf();

        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .map_err(io::Error::other)??;

        Ok(())
    }
}

/// An entry fetched at `fetched_at` is stale once `expiry` has fully elapsed.
///
/// A clock that went backwards counts as fresh.
#[must_use]
pub fn is_stale(fetched_at: SystemTime, now: SystemTime, expiry: Duration) -> bool {
    now.duration_since(fetched_at)
        .map(|age| age >= expiry)
        .unwrap_or(false)
}

/// Write to a temp file in the same directory, then rename over `path`.
fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
