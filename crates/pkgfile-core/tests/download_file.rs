//! End-to-end tests for `Client::download_file`.
//!
//! These tests run against a mock registry to avoid network calls. The mock
//! counts index, tarball and blob requests so tests can assert on network I/O.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use pkgfile_core::{Client, Config, IndexCache, PkgError, RegistryClient, StatusKind};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tar::Builder;
use tempfile::TempDir;

/// `Basic base64("acme:secret")`
const EXPECTED_AUTH: &str = "Basic YWNtZTpzZWNyZXQ=";

struct MockRegistry {
    indexes: HashMap<String, serde_json::Value>,
    blobs: HashMap<String, Vec<u8>>,
    index_hits: AtomicUsize,
    tarball_hits: AtomicUsize,
    blob_hits: AtomicUsize,
}

impl MockRegistry {
    fn index_hits(&self) -> usize {
        self.index_hits.load(Ordering::SeqCst)
    }

    fn tarball_hits(&self) -> usize {
        self.tarball_hits.load(Ordering::SeqCst)
    }

    fn blob_hits(&self) -> usize {
        self.blob_hits.load(Ordering::SeqCst)
    }
}

/// Create a test tarball wrapped in `package/`.
fn create_test_tarball(name: &str, version: &str) -> Vec<u8> {
    let pkg_json = format!(r#"{{"name":"{name}","version":"{version}"}}"#);
    let readme = format!("# {name} {version}\n");

    let mut tar_bytes = Vec::new();
    {
        let mut builder = Builder::new(&mut tar_bytes);
        for (path, data) in [
            ("package/package.json", pkg_json.as_bytes()),
            ("package/docs/README.md", readme.as_bytes()),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, data).unwrap();
        }
        builder.finish().unwrap();
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

/// Build an index document; `registry_path` is the encoded name used in URLs.
fn create_index(
    base_url: &str,
    name: &str,
    registry_path: &str,
    versions: &[&str],
    latest: &str,
) -> serde_json::Value {
    let short = name.rsplit('/').next().unwrap();
    let versions: serde_json::Map<String, serde_json::Value> = versions
        .iter()
        .map(|v| {
            (
                (*v).to_string(),
                serde_json::json!({
                    "name": name,
                    "version": v,
                    "dist": {
                        "tarball": format!("{base_url}/{registry_path}/-/{short}-{v}.tgz")
                    }
                }),
            )
        })
        .collect();

    serde_json::json!({
        "name": name,
        "dist-tags": { "latest": latest },
        "versions": versions,
    })
}

fn mock_registry(base_url: &str) -> MockRegistry {
    let mut indexes = HashMap::new();
    let mut blobs = HashMap::new();

    indexes.insert(
        "pkg".to_string(),
        create_index(base_url, "pkg", "pkg", &["1.0.0", "1.1.0", "2.0.0-beta.1"], "1.1.0"),
    );
    for v in ["1.0.0", "1.1.0", "2.0.0-beta.1"] {
        blobs.insert(format!("pkg-{v}.tgz"), create_test_tarball("pkg", v));
    }

    indexes.insert(
        "@acme/widget".to_string(),
        create_index(base_url, "@acme/widget", "@acme%2Fwidget", &["2.0.0"], "2.0.0"),
    );
    blobs.insert(
        "widget-2.0.0.tgz".to_string(),
        create_test_tarball("@acme/widget", "2.0.0"),
    );

    // Index entry whose blob is missing
    indexes.insert(
        "broken".to_string(),
        create_index(base_url, "broken", "broken", &["1.0.0"], "1.0.0"),
    );

    MockRegistry {
        indexes,
        blobs,
        index_hits: AtomicUsize::new(0),
        tarball_hits: AtomicUsize::new(0),
        blob_hits: AtomicUsize::new(0),
    }
}

fn is_authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(EXPECTED_AUTH)
}

async fn handle_index(
    State(registry): State<Arc<MockRegistry>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    registry.index_hits.fetch_add(1, Ordering::SeqCst);

    if !is_authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match registry.indexes.get(&name) {
        Some(index) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::to_string(index).unwrap(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, r#"{"error":"Not found"}"#).into_response(),
    }
}

async fn handle_tarball(
    State(registry): State<Arc<MockRegistry>>,
    Path((_name, tarball)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    registry.tarball_hits.fetch_add(1, Ordering::SeqCst);

    if !is_authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // Relative location, resolved against the tarball URL
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("/blobs/{tarball}"))],
    )
        .into_response()
}

async fn handle_blob(
    State(registry): State<Arc<MockRegistry>>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Response {
    registry.blob_hits.fetch_add(1, Ordering::SeqCst);

    // Blob storage must not receive registry credentials
    if headers.contains_key(header::AUTHORIZATION) {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match registry.blobs.get(&file) {
        Some(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Body::from(bytes.clone()),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Start the mock registry on an ephemeral port.
async fn start_mock_registry() -> (String, Arc<MockRegistry>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let registry = Arc::new(mock_registry(&base_url));

    let app = Router::new()
        .route("/:name", get(handle_index))
        .route("/:name/-/:tarball", get(handle_tarball))
        .route("/blobs/:file", get(handle_blob))
        .with_state(Arc::clone(&registry));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base_url, registry)
}

fn test_config(base_url: &str, cache: &TempDir) -> Config {
    Config::new("acme", "secret")
        .with_registry(base_url)
        .with_cache_dir(cache.path())
}

async fn setup() -> (Client, Arc<MockRegistry>, TempDir) {
    let (base_url, registry) = start_mock_registry().await;
    let cache = tempfile::tempdir().unwrap();
    let client = Client::new(test_config(&base_url, &cache)).unwrap();
    (client, registry, cache)
}

#[tokio::test]
async fn test_exact_version_end_to_end() {
    let (client, registry, cache) = setup().await;

    let path = client.download_file("pkg@1.0.0/package.json").await.unwrap();

    assert!(path.starts_with(cache.path().join("files").join("pkg").join("1.0.0")));
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, r#"{"name":"pkg","version":"1.0.0"}"#);

    assert_eq!(registry.index_hits(), 1);
    assert_eq!(registry.tarball_hits(), 1);
    assert_eq!(registry.blob_hits(), 1);
    assert!(cache
        .path()
        .join("index")
        .join("pkg")
        .join("index.json")
        .is_file());
}

#[tokio::test]
async fn test_second_exact_request_is_offline() {
    let (client, registry, _cache) = setup().await;

    let first = client.download_file("pkg@1.0.0/package.json").await.unwrap();
    let second = client.download_file("pkg@1.0.0/package.json").await.unwrap();
    let other_file = client.download_file("pkg@1.0.0/docs/README.md").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        std::fs::read_to_string(other_file).unwrap(),
        "# pkg 1.0.0\n"
    );
    assert_eq!(registry.index_hits(), 1);
    assert_eq!(registry.tarball_hits(), 1);
}

#[tokio::test]
async fn test_dist_tag_and_range_reuse_extraction() {
    let (client, registry, _cache) = setup().await;

    let tagged = client.download_file("pkg@latest/package.json").await.unwrap();
    assert!(std::fs::read_to_string(&tagged).unwrap().contains("1.1.0"));

    // Index still fresh, version already extracted
    let ranged = client.download_file("pkg@^1.0.0/package.json").await.unwrap();
    assert_eq!(tagged, ranged);
    assert_eq!(registry.index_hits(), 1);
    assert_eq!(registry.tarball_hits(), 1);

    // Already extracted exact version is served without another index fetch
    let exact = client.download_file("pkg@1.1.0/package.json").await.unwrap();
    assert_eq!(exact, tagged);
    assert_eq!(registry.index_hits(), 1);
}

#[tokio::test]
async fn test_scoped_package() {
    let (client, registry, cache) = setup().await;

    let path = client
        .download_file("@acme/widget@2.0.0/docs/README.md")
        .await
        .unwrap();

    assert_eq!(
        path,
        cache
            .path()
            .join("files")
            .join("@acme")
            .join("widget")
            .join("2.0.0")
            .join("docs")
            .join("README.md")
    );
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "# @acme/widget 2.0.0\n"
    );
    assert_eq!(registry.blob_hits(), 1);
}

#[tokio::test]
async fn test_resolve_without_download() {
    let (client, registry, _cache) = setup().await;

    let resolved = client.resolve("pkg@latest/package.json").await.unwrap();
    assert_eq!(resolved.version.exact_version, "1.1.0");
    assert!(resolved.version.was_dist_tag);
    assert!(!resolved.version_dir.exists());
    assert_eq!(registry.tarball_hits(), 0);
}

#[tokio::test]
async fn test_concurrent_first_download_extracts_once() {
    let (client, registry, _cache) = setup().await;

    let (a, b) = tokio::join!(
        client.download_file("pkg@1.0.0/package.json"),
        client.download_file("pkg@1.0.0/docs/README.md"),
    );

    assert!(a.unwrap().is_file());
    assert!(b.unwrap().is_file());
    assert_eq!(registry.tarball_hits(), 1);
    assert_eq!(registry.blob_hits(), 1);
}

#[tokio::test]
async fn test_missing_file_in_package() {
    let (client, _registry, _cache) = setup().await;

    let err = client.download_file("pkg@1.0.0/nope.txt").await.unwrap_err();
    assert!(matches!(err, PkgError::FileNotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn test_directory_is_not_a_file() {
    let (client, registry, _cache) = setup().await;

    let err = client.download_file("pkg@1.0.0/docs").await.unwrap_err();
    assert!(matches!(err, PkgError::FileNotFound { .. }), "{err:?}");

    // Extracted now; the fast path must not hand back the directory either
    let err = client.download_file("pkg@1.0.0/docs").await.unwrap_err();
    assert!(matches!(err, PkgError::FileNotFound { .. }), "{err:?}");

    let err = client.download_file("pkg@1.0.0/docs/..").await.unwrap_err();
    assert!(matches!(err, PkgError::FileNotFound { .. }), "{err:?}");
    assert_eq!(registry.tarball_hits(), 1);

    let err = client.download_file("pkg@1.0.0/.").await.unwrap_err();
    assert!(matches!(err, PkgError::InvalidAddress { .. }), "{err:?}");
}

#[tokio::test]
async fn test_malformed_scoped_name_fails_before_network() {
    let (client, registry, _cache) = setup().await;

    for address in ["@a@1.0.0/x/y", "pkg@1@2/package.json"] {
        let err = client.download_file(address).await.unwrap_err();
        assert!(matches!(err, PkgError::InvalidAddress { .. }), "{address}: {err:?}");
    }
    assert_eq!(registry.index_hits(), 0);
}

#[tokio::test]
async fn test_traversal_is_forbidden_without_network() {
    let (client, registry, _cache) = setup().await;

    let err = client
        .download_file("pkg@1.0.0/../../secret")
        .await
        .unwrap_err();
    assert!(matches!(err, PkgError::ForbiddenPath { .. }), "{err:?}");
    assert_eq!(registry.index_hits(), 0);
}

#[tokio::test]
async fn test_empty_and_invalid_addresses() {
    let (client, registry, _cache) = setup().await;

    assert!(matches!(
        client.download_file("").await,
        Err(PkgError::EmptyAddress)
    ));
    assert!(matches!(
        client.download_file("onlyonesegment").await,
        Err(PkgError::InvalidAddress { .. })
    ));
    assert_eq!(registry.index_hits(), 0);
}

#[tokio::test]
async fn test_unknown_package() {
    let (client, _registry, _cache) = setup().await;

    let err = client.download_file("ghost@1.0.0/a.txt").await.unwrap_err();
    assert!(matches!(err, PkgError::RegistryNotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let (client, registry, _cache) = setup().await;

    let err = client.download_file("pkg@^3.0.0/a.txt").await.unwrap_err();
    assert!(matches!(err, PkgError::VersionNotFound { .. }), "{err:?}");
    assert_eq!(registry.tarball_hits(), 0);
}

#[tokio::test]
async fn test_missing_blob_maps_status_and_leaves_no_directory() {
    let (client, _registry, cache) = setup().await;

    let err = client
        .download_file("broken@1.0.0/package.json")
        .await
        .unwrap_err();

    match err {
        PkgError::HttpStatus { status, kind, .. } => {
            assert_eq!(status, 404);
            assert_eq!(kind, StatusKind::NotFound);
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
    assert!(!cache
        .path()
        .join("files")
        .join("broken")
        .join("1.0.0")
        .exists());
}

#[tokio::test]
async fn test_bad_credentials() {
    let (base_url, _registry) = start_mock_registry().await;
    let cache = tempfile::tempdir().unwrap();
    let config = Config::new("acme", "wrong")
        .with_registry(&base_url)
        .with_cache_dir(cache.path());
    let client = Client::new(config).unwrap();

    let err = client.download_file("pkg@1.0.0/package.json").await.unwrap_err();
    assert!(
        matches!(
            err,
            PkgError::HttpStatus {
                kind: StatusKind::Unauthorized,
                ..
            }
        ),
        "{err:?}"
    );
}

/// Write an index document and backdate its mtime.
fn seed_index(cache: &TempDir, name: &str, latest: &str, age: Duration) {
    let path = cache.path().join("index").join(name).join("index.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let doc = serde_json::json!({ "dist-tags": { "latest": latest }, "versions": {} });
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

#[tokio::test]
async fn test_fresh_index_is_served_from_disk() {
    let (base_url, registry) = start_mock_registry().await;
    let cache = tempfile::tempdir().unwrap();
    seed_index(&cache, "pkg", "0.0.1", Duration::from_secs(1));

    let config = test_config(&base_url, &cache);
    let registry_client = RegistryClient::new(&config).unwrap();
    let index_cache = IndexCache::new(
        pkgfile_core::CacheLayout::new(cache.path()),
        Duration::from_secs(60),
    );

    let index = index_cache.get(&registry_client, "pkg", "pkg").await.unwrap();
    assert_eq!(index.dist_tags["latest"], "0.0.1");
    assert_eq!(registry.index_hits(), 0);
}

#[tokio::test]
async fn test_stale_index_is_refreshed_once() {
    let (base_url, registry) = start_mock_registry().await;
    let cache = tempfile::tempdir().unwrap();
    seed_index(&cache, "pkg", "0.0.1", Duration::from_secs(120));

    let config = test_config(&base_url, &cache);
    let registry_client = RegistryClient::new(&config).unwrap();
    let index_cache = IndexCache::new(
        pkgfile_core::CacheLayout::new(cache.path()),
        Duration::from_secs(60),
    );

    let index = index_cache.get(&registry_client, "pkg", "pkg").await.unwrap();
    assert_eq!(index.dist_tags["latest"], "1.1.0");
    assert_eq!(registry.index_hits(), 1);

    // Persisted entry was overwritten and is fresh again
    let persisted = std::fs::read_to_string(
        cache.path().join("index").join("pkg").join("index.json"),
    )
    .unwrap();
    assert!(persisted.contains("1.1.0"));

    index_cache.get(&registry_client, "pkg", "pkg").await.unwrap();
    assert_eq!(registry.index_hits(), 1);
}

#[tokio::test]
async fn test_zero_expiry_always_refreshes() {
    let (base_url, registry) = start_mock_registry().await;
    let cache = tempfile::tempdir().unwrap();
    let client =
        Client::new(test_config(&base_url, &cache).with_index_expiry(Duration::ZERO)).unwrap();

    client.download_file("pkg@latest/package.json").await.unwrap();
    client.download_file("pkg@latest/package.json").await.unwrap();

    assert_eq!(registry.index_hits(), 2);
    assert_eq!(registry.tarball_hits(), 1);
}

#[tokio::test]
async fn test_cache_listing_after_downloads() {
    let (client, _registry, _cache) = setup().await;

    client.download_file("pkg@1.0.0/package.json").await.unwrap();
    client
        .download_file("@acme/widget@2.0.0/package.json")
        .await
        .unwrap();

    let cached = client.layout().list_cached().unwrap();
    let ids: Vec<(&str, &str)> = cached
        .iter()
        .map(|p| (p.name.as_str(), p.version.as_str()))
        .collect();
    assert_eq!(ids, vec![("@acme/widget", "2.0.0"), ("pkg", "1.0.0")]);
    assert!(cached.iter().all(|p| p.size_bytes > 0));
}
