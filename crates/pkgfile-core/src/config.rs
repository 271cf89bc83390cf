use crate::error::{PkgError, Result};
use crate::paths::default_cache_dir;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default registry base URL.
pub const DEFAULT_REGISTRY: &str = "https://npm.pkg.github.com/";

/// Default freshness window of a cached registry index.
pub const DEFAULT_INDEX_EXPIRY: Duration = Duration::from_millis(30_000);

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Registry scope, used as the basic-auth user.
    pub scope: String,

    /// Registry token, used as the basic-auth password.
    #[serde(default, skip_serializing)]
    pub token: String,

    /// Registry base URL.
    pub registry: String,

    /// Root of the index and files cache.
    pub cache_dir: PathBuf,

    /// How long a cached registry index stays fresh.
    #[serde(with = "millis")]
    pub index_expiry: Duration,
}

impl Config {
    /// Create a config with the given credentials and defaults for everything else.
    #[must_use]
    pub fn new(scope: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            token: token.into(),
            registry: DEFAULT_REGISTRY.to_string(),
            cache_dir: default_cache_dir(),
            index_expiry: DEFAULT_INDEX_EXPIRY,
        }
    }

    /// Set the registry base URL.
    #[must_use]
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }

    /// Set the cache root.
    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Set the index freshness window.
    #[must_use]
    pub fn with_index_expiry(mut self, expiry: Duration) -> Self {
        self.index_expiry = expiry;
        self
    }

    /// Check the config is usable.
    ///
    /// # Errors
    /// Returns an error if the scope is empty.
    pub fn validate(&self) -> Result<()> {
        if self.scope.trim().is_empty() {
            return Err(PkgError::Config("scope must not be empty".to_string()));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
