//! Tarball download and extraction.

use crate::error::{PkgError, Result};
use crate::registry::RegistryClient;
use bytes::{Bytes, BytesMut};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::debug;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Download a tarball and extract it into `target_dir`.
///
/// The archive's single top-level directory is stripped. Extraction happens in
/// a temporary sibling directory that is renamed into place on success, so
/// `target_dir` either does not exist or is complete.
///
/// The archive is buffered in memory before extraction; bodies larger than
/// [`MAX_TARBALL_SIZE`] are rejected with a `Download` error.
///
/// # Errors
/// Returns an error if the download or extraction fails, including a
/// failure on any single entry.
pub async fn fetch_and_extract(
    registry: &RegistryClient,
    tarball_url: &str,
    target_dir: &Path,
) -> Result<()> {
    debug!(url = %tarball_url, "Downloading tarball");
    let bytes = download_tarball(registry, tarball_url, MAX_TARBALL_SIZE).await?;
    debug!(size = bytes.len(), "Downloaded tarball");

    let target = target_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_atomic(&bytes, &target))
        .await
        .map_err(|e| PkgError::Extract(format!("Extraction task failed: {e}")))??;

    debug!(path = %target_dir.display(), "Extracted tarball");
    Ok(())
}

/// Download a tarball body, enforcing `max_bytes`.
///
/// # Errors
/// Returns an error if the request fails or the body exceeds the size limit.
pub async fn download_tarball(
    registry: &RegistryClient,
    url: &str,
    max_bytes: u64,
) -> Result<Bytes> {
    let mut response = registry.get_tarball(url).await?;

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PkgError::Download(format!(
                "Tarball too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| PkgError::Download(format!("Failed to read response body: {e}")))?
    {
        body.extend_from_slice(&chunk);
        if body.len() as u64 > max_bytes {
            return Err(PkgError::Download(format!(
                "Tarball too large: more than {max_bytes} bytes"
            )));
        }
    }

    Ok(body.freeze())
}

/// Extract a (possibly gzipped) tarball into `target_dir` atomically.
///
/// # Errors
/// Returns an error if the archive is invalid or cannot be written.
pub fn extract_atomic(bytes: &[u8], target_dir: &Path) -> Result<()> {
    let parent = target_dir
        .parent()
        .ok_or_else(|| PkgError::Extract("Destination has no parent".to_string()))?;
    fs::create_dir_all(parent)?;

    // Another process finished first
    if target_dir.exists() {
        return Ok(());
    }

    // Removed on drop unless renamed away
    let temp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempdir_in(parent)?;

    let written = extract_stripped(bytes, temp.path())?;
    if written == 0 {
        return Err(PkgError::Extract(
            "Tarball does not contain any files".to_string(),
        ));
    }

    match fs::rename(temp.path(), target_dir) {
        Ok(()) => Ok(()),
        Err(_) if target_dir.exists() => Ok(()),
        Err(e) => Err(PkgError::Extract(format!(
            "Failed to move extracted package into {}: {e}",
            target_dir.display()
        ))),
    }
}

/// Unpack every entry under `dest`, dropping the first path component.
///
/// Returns the number of files written.
fn extract_stripped(bytes: &[u8], dest: &Path) -> Result<usize> {
    let reader: Box<dyn Read + '_> = if bytes.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    };
    let mut archive = Archive::new(reader);
    let mut written = 0;

    for entry in archive
        .entries()
        .map_err(|e| PkgError::Extract(format!("Failed to read tarball entries: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| PkgError::Extract(format!("Failed to read tarball entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| PkgError::Extract(format!("Failed to read entry path: {e}")))?
            .into_owned();

        let Some(relative) = strip_top_level(&path)? else {
            continue;
        };
        let dest_path = dest.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&dest_path)?;
            io::copy(&mut entry, &mut file)?;
            written += 1;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = entry.header().mode()?;
                fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode & 0o777))?;
            }
        }
        // Links and special entries are skipped
    }

    Ok(written)
}

/// Validate an entry path and drop its top-level directory.
///
/// Returns `None` for the top-level directory itself.
fn strip_top_level(path: &Path) -> Result<Option<PathBuf>> {
    let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
    let mut relative = PathBuf::new();

    // First component is the wrapper directory
    match components.next() {
        Some(Component::Normal(_)) => {}
        None => return Ok(None),
        Some(_) => {
            return Err(PkgError::Extract(format!(
                "Tarball contains absolute path: {}",
                path.display()
            )))
        }
    }

    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => {
                return Err(PkgError::Extract(format!(
                    "Tarball contains path traversal: {}",
                    path.display()
                )))
            }
        }
    }

    if relative.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(relative))
    }
}
