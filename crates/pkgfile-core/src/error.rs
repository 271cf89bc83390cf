//! Error types for the fetch pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes, one per [`PkgError`] variant.
pub mod codes {
    pub const PKG_ADDRESS_EMPTY: &str = "PKG_ADDRESS_EMPTY";
    pub const PKG_ADDRESS_INVALID: &str = "PKG_ADDRESS_INVALID";
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_REGISTRY_ERROR: &str = "PKG_REGISTRY_ERROR";
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    pub const PKG_FORBIDDEN_PATH: &str = "PKG_FORBIDDEN_PATH";
    pub const PKG_FILE_NOT_FOUND: &str = "PKG_FILE_NOT_FOUND";
    pub const PKG_HTTP_STATUS: &str = "PKG_HTTP_STATUS";
    pub const PKG_DOWNLOAD_FAILED: &str = "PKG_DOWNLOAD_FAILED";
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    pub const PKG_IO_ERROR: &str = "PKG_IO_ERROR";
    pub const PKG_CONFIG_INVALID: &str = "PKG_CONFIG_INVALID";
}

/// Class of a non-success HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    TooManyRequests,
    ServerError,
    Other(u16),
}

impl StatusKind {
    /// Map a raw status code to its kind.
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::TooManyRequests,
            500..=599 => Self::ServerError,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not found",
            Self::TooManyRequests => "too many requests",
            Self::ServerError => "server error",
            Self::Other(_) => "unexpected status",
        }
    }
}

/// Errors produced while resolving and fetching a package file.
#[derive(Error, Debug)]
pub enum PkgError {
    #[error("Empty file address")]
    EmptyAddress,

    #[error("Invalid file address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Package not found in registry: {name}")]
    RegistryNotFound { name: String },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("No version of {name} matches '{spec}'")]
    VersionNotFound { name: String, spec: String },

    #[error("Path {} escapes {}", path.display(), root.display())]
    ForbiddenPath { path: PathBuf, root: PathBuf },

    #[error("File not found in package: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("HTTP {status} ({}) for '{url}'", kind.as_str())]
    HttpStatus {
        status: u16,
        kind: StatusKind,
        url: String,
    },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Extraction failed: {0}")]
    Extract(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PkgError {
    pub(crate) fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn version_not_found(name: &str, spec: &str) -> Self {
        Self::VersionNotFound {
            name: name.to_string(),
            spec: spec.to_string(),
        }
    }

    pub(crate) fn http_status(status: u16, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            kind: StatusKind::from_code(status),
            url: url.into(),
        }
    }

    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyAddress => codes::PKG_ADDRESS_EMPTY,
            Self::InvalidAddress { .. } => codes::PKG_ADDRESS_INVALID,
            Self::RegistryNotFound { .. } => codes::PKG_NOT_FOUND,
            Self::Registry(_) => codes::PKG_REGISTRY_ERROR,
            Self::VersionNotFound { .. } => codes::PKG_VERSION_NOT_FOUND,
            Self::ForbiddenPath { .. } => codes::PKG_FORBIDDEN_PATH,
            Self::FileNotFound { .. } => codes::PKG_FILE_NOT_FOUND,
            Self::HttpStatus { .. } => codes::PKG_HTTP_STATUS,
            Self::Download(_) => codes::PKG_DOWNLOAD_FAILED,
            Self::Extract(_) => codes::PKG_EXTRACT_FAILED,
            Self::Io(_) => codes::PKG_IO_ERROR,
            Self::Config(_) => codes::PKG_CONFIG_INVALID,
        }
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Registry(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::Registry(format!("Connection failed: {e}"))
        } else {
            Self::Registry(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::Registry(format!("Invalid JSON: {e}"))
    }
}

pub type Result<T, E = PkgError> = std::result::Result<T, E>;
