//! Address-to-local-file orchestration.

use crate::address::Address;
use crate::config::Config;
use crate::error::{PkgError, Result};
use crate::guard::guard;
use crate::index::IndexCache;
use crate::paths::CacheLayout;
use crate::registry::RegistryClient;
use crate::tarball::fetch_and_extract;
use crate::version::{resolve_version, ResolvedVersion};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A resolved address, before any download.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub address: Address,
    pub version: ResolvedVersion,
    /// Download directory for the exact version.
    pub version_dir: PathBuf,
    /// Where the requested file lives once extracted.
    pub file_path: PathBuf,
}

/// Fetches single files out of registry packages, caching everything on disk.
#[derive(Debug)]
pub struct Client {
    registry: RegistryClient,
    layout: CacheLayout,
    index_cache: IndexCache,
    /// One lock per `name@version` being extracted.
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Client {
    /// Create a client.
    ///
    /// # Errors
    /// Returns an error if the config is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let registry = RegistryClient::new(&config)?;
        let layout = CacheLayout::new(&config.cache_dir);
        let index_cache = IndexCache::new(layout.clone(), config.index_expiry);

        Ok(Self {
            registry,
            layout,
            index_cache,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Resolve an address to a local file, downloading the package if needed.
    ///
    /// Exact versions that are already extracted are served without network
    /// access. Dist-tags and ranges always go through the registry index.
    ///
    /// # Errors
    /// Returns an error if the address is invalid, the version cannot be
    /// resolved, the download fails, or the file is not in the package.
    pub async fn download_file(&self, address: &str) -> Result<PathBuf> {
        if address.trim().is_empty() {
            return Err(PkgError::EmptyAddress);
        }

        let address = Address::parse(address)?;

        if let Some(path) = self.cached_file(&address).await? {
            debug!(name = %address.name, version = %address.version_spec, "Serving from cache");
            return Ok(path);
        }

        let resolved = self.resolve_address(address).await?;
        self.ensure_extracted(&resolved).await?;

        let path = resolved.file_path;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(PkgError::FileNotFound { path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(PkgError::FileNotFound { path }),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve an address to an exact version through the registry index.
    ///
    /// # Errors
    /// Returns an error if the address is invalid or no version matches.
    pub async fn resolve(&self, address: &str) -> Result<ResolvedFile> {
        if address.trim().is_empty() {
            return Err(PkgError::EmptyAddress);
        }
        self.resolve_address(Address::parse(address)?).await
    }

    /// Fast path: an exact version whose download directory holds the file.
    async fn cached_file(&self, address: &Address) -> Result<Option<PathBuf>> {
        if !address.is_exact_version() {
            return Ok(None);
        }

        let version_dir = self.version_dir(&address.name, &address.version_spec)?;
        let file_path = guard(&join_file(&version_dir, &address.file_path), &version_dir)?;

        match tokio::fs::metadata(&file_path).await {
            Ok(meta) if meta.is_file() => Ok(Some(file_path)),
            // Extracted, but the path names a directory
            Ok(_) => Err(PkgError::FileNotFound { path: file_path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_address(&self, address: Address) -> Result<ResolvedFile> {
        let index = self
            .index_cache
            .get(&self.registry, &address.name, &address.registry_path)
            .await?;
        let version = resolve_version(Some(&index), &address.name, &address.version_spec)?;

        debug!(
            name = %address.name,
            spec = %address.version_spec,
            version = %version.exact_version,
            dist_tag = version.was_dist_tag,
            "Resolved version"
        );

        let version_dir = self.version_dir(&address.name, &version.exact_version)?;
        let file_path = guard(&join_file(&version_dir, &address.file_path), &version_dir)?;

        Ok(ResolvedFile {
            address,
            version,
            version_dir,
            file_path,
        })
    }

    /// Download and extract the resolved version unless it is already present.
    async fn ensure_extracted(&self, resolved: &ResolvedFile) -> Result<()> {
        let key = format!(
            "{}@{}",
            resolved.address.name, resolved.version.exact_version
        );
        let lock = self.lock_for(&key);
        let held = lock.lock().await;

        let result = match tokio::fs::try_exists(&resolved.version_dir).await {
            Ok(true) => {
                debug!(path = %resolved.version_dir.display(), "Using extracted package");
                Ok(())
            }
            Ok(false) => {
                fetch_and_extract(
                    &self.registry,
                    &resolved.version.record.dist.tarball,
                    &resolved.version_dir,
                )
                .await
            }
            Err(e) => Err(e.into()),
        };

        drop(held);
        self.release_lock(&key, &lock);
        result
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(map.entry(key.to_string()).or_default())
    }

    /// Drop the map entry once no other task holds the lock.
    fn release_lock(&self, key: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut map = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // One reference in the map, one held by the caller
        if Arc::strong_count(lock) == 2 {
            map.remove(key);
        }
    }

    /// Download directory for a version, which must stay under the files root.
    fn version_dir(&self, name: &str, version: &str) -> Result<PathBuf> {
        let dir = self.layout.version_dir(name, version);
        if version.is_empty()
            || version == "."
            || version == ".."
            || version.contains(['/', '\\'])
        {
            return Err(PkgError::ForbiddenPath {
                path: dir,
                root: self.layout.package_dir(name),
            });
        }
        guard(&dir, &self.layout.files_root())
    }
}

fn join_file(version_dir: &Path, file_path: &str) -> PathBuf {
    file_path
        .split('/')
        .fold(version_dir.to_path_buf(), |acc, part| acc.join(part))
}
