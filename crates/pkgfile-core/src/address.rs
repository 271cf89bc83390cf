//! File address parsing.
//!
//! Parses addresses like:
//! - `pkg@1.0.0/package.json`
//! - `pkg@latest/dist/index.js`
//! - `@scope/pkg@^2.1.0/README.md`

use crate::error::{PkgError, Result};
use url::form_urlencoded;

/// A parsed file address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Exact version, dist-tag or semver range.
    pub version_spec: String,
    /// Name as it appears in the registry URL (`@scope%2Fname`).
    pub registry_path: String,
    /// Path of the file inside the package, relative, `/`-separated.
    pub file_path: String,
}

impl Address {
    /// Parse a file address.
    ///
    /// # Errors
    /// Returns `InvalidAddress` if the address is empty, lacks a version,
    /// has a malformed scoped name, or has no file path after `name@version`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut segments = input.split('/').filter(|s| !s.is_empty());

        let Some(first) = segments.next() else {
            return Err(PkgError::invalid_address(input, "address is empty"));
        };

        let token = if first.starts_with('@') {
            let Some(rest) = segments.next() else {
                return Err(PkgError::invalid_address(input, "missing package name after scope"));
            };
            format!("{first}/{rest}")
        } else {
            first.to_string()
        };

        let (name, version_spec) = split_name_version(&token)
            .ok_or_else(|| PkgError::invalid_address(input, "expected name@version"))?;

        let file_path = segments.collect::<Vec<_>>().join("/");
        if file_path.split('/').all(|part| part.is_empty() || part == ".") {
            return Err(PkgError::invalid_address(input, "missing file path"));
        }

        Ok(Self {
            registry_path: registry_path(&name),
            name,
            version_spec,
            file_path,
        })
    }

    /// Whether the version specifier is a literal semantic version.
    #[must_use]
    pub fn is_exact_version(&self) -> bool {
        semver::Version::parse(&self.version_spec).is_ok()
    }
}

/// Split `name@version` or `@scope/name@version`.
fn split_name_version(token: &str) -> Option<(String, String)> {
    let (name, version) = match token.strip_prefix('@') {
        Some(scoped) => {
            let (name, version) = scoped.split_once('@')?;
            // `scope/name`, nothing more
            let (scope, bare) = name.split_once('/')?;
            if scope.is_empty() || bare.is_empty() || bare.contains('/') {
                return None;
            }
            (format!("@{name}"), version)
        }
        None => {
            let (name, version) = token.split_once('@')?;
            if name.contains('/') {
                return None;
            }
            (name.to_string(), version)
        }
    };

    let bare = name.trim_start_matches('@');
    if bare.is_empty() || version.is_empty() || version.contains(['/', '@']) {
        return None;
    }
    if bare
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == ".." || part.contains('\\'))
    {
        return None;
    }

    Some((name, version.to_string()))
}

/// Percent-encode a package name for the registry, keeping the scope marker literal.
fn registry_path(name: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(name.as_bytes()).collect();
    match encoded.strip_prefix("%40") {
        Some(rest) => format!("@{rest}"),
        None => encoded,
    }
}
