//! Registry client and index document types.

use crate::config::Config;
use crate::error::{PkgError, Result};
use reqwest::header::{ACCEPT, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Accept header for index requests; prefers the abbreviated install document.
pub const INDEX_ACCEPT: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8, */*";

/// The registry's index document for one package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,

    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,

    /// Set by registries that answer with an error document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One published version in a [`RegistryIndex`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(default)]
    pub dist: Dist,

    /// Everything else the registry sent for this version.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dist {
    #[serde(default)]
    pub tarball: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

/// HTTP access to the registry with basic-auth credentials.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    scope: String,
    token: String,
    http: Client,
    /// Same settings as `http` but never follows redirects.
    no_redirect: Client,
}

impl RegistryClient {
    /// Create a registry client from the config.
    ///
    /// # Errors
    /// Returns an error if the registry URL is invalid or the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        let base = if config.registry.ends_with('/') {
            config.registry.clone()
        } else {
            format!("{}/", config.registry)
        };
        let base_url = Url::parse(&base)
            .map_err(|e| PkgError::Config(format!("Invalid registry URL '{base}': {e}")))?;

        let http = build_client(Policy::default())?;
        let no_redirect = build_client(Policy::none())?;

        Ok(Self {
            base_url,
            scope: config.scope.clone(),
            token: config.token.clone(),
            http,
            no_redirect,
        })
    }

    /// Fetch the index document for a package.
    ///
    /// `registry_path` is the encoded name, e.g. `@scope%2Fname`.
    ///
    /// # Errors
    /// Returns `RegistryNotFound` on 404 and `HttpStatus` on any other failure status.
    pub async fn fetch_index(&self, name: &str, registry_path: &str) -> Result<RegistryIndex> {
        let url = self
            .base_url
            .join(registry_path)
            .map_err(|e| PkgError::Registry(format!("Failed to build URL for '{name}': {e}")))?;

        debug!(%url, "Fetching registry index");

        let response = self
            .http
            .get(url.as_str())
            .basic_auth(&self.scope, Some(&self.token))
            .header(ACCEPT, INDEX_ACCEPT)
            .timeout(Duration::from_secs(INDEX_TIMEOUT_SECS))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PkgError::RegistryNotFound {
                name: name.to_string(),
            });
        }

        if !response.status().is_success() {
            return Err(PkgError::http_status(response.status().as_u16(), url.as_str()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Request a tarball. Follows exactly one redirect.
    ///
    /// The first request carries credentials and does not follow redirects;
    /// a redirect's `Location` is then fetched with a plain GET.
    ///
    /// # Errors
    /// Returns `HttpStatus` for a failure status at either stage.
    pub async fn get_tarball(&self, tarball_url: &str) -> Result<Response> {
        let url = Url::parse(tarball_url)
            .map_err(|e| PkgError::Download(format!("Invalid tarball URL '{tarball_url}': {e}")))?;

        let first = self
            .no_redirect
            .get(url.as_str())
            .basic_auth(&self.scope, Some(&self.token))
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| PkgError::Download(format!("Failed to download '{url}': {e}")))?;

        let status = first.status();

        // Some registries serve the blob themselves
        if status.is_success() {
            return Ok(first);
        }

        if !status.is_redirection() {
            return Err(PkgError::http_status(status.as_u16(), url.as_str()));
        }

        let location = first
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| PkgError::http_status(status.as_u16(), url.as_str()))?;
        let blob_url = url
            .join(location)
            .map_err(|e| PkgError::Download(format!("Invalid redirect '{location}': {e}")))?;

        debug!(%blob_url, "Following tarball redirect");

        let response = self
            .http
            .get(blob_url.as_str())
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| PkgError::Download(format!("Failed to download '{blob_url}': {e}")))?;

        if !response.status().is_success() {
            return Err(PkgError::http_status(
                response.status().as_u16(),
                blob_url.as_str(),
            ));
        }

        Ok(response)
    }
}

/// Index request timeout in seconds.
const INDEX_TIMEOUT_SECS: u64 = 15;

/// Download timeout in seconds.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

fn build_client(redirect: Policy) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .redirect(redirect)
        .user_agent(concat!("pkgfile/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PkgError::Registry(format!("Failed to create HTTP client: {e}")))
}
