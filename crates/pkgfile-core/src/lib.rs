#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

//! Fetch single files out of versioned registry packages.
//!
//! An address such as `@scope/name@^1.2.0/dist/index.js` is resolved against
//! the registry index, the matching tarball is downloaded and extracted into a
//! per-version cache directory, and the local path of the file is returned.

pub mod address;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod index;
pub mod paths;
pub mod registry;
pub mod tarball;
pub mod version;

pub use address::Address;
pub use client::{Client, ResolvedFile};
pub use config::{Config, DEFAULT_INDEX_EXPIRY, DEFAULT_REGISTRY};
pub use error::{codes, PkgError, Result, StatusKind};
pub use guard::guard;
pub use index::IndexCache;
pub use paths::{default_cache_dir, CacheLayout, CachedPackage};
pub use registry::{Dist, RegistryClient, RegistryIndex, VersionRecord};
pub use tarball::{fetch_and_extract, MAX_TARBALL_SIZE};
pub use version::{resolve_version, ResolvedVersion};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
