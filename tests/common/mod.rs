//! Shared fixtures for the integration tests.
//!
//! Packages are written into a temporary `package_dir` laid out the way an
//! installed router sees them: `<pkg>/manifest.json` plus `<pkg>/content/`.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use capsium_router::config::schema::MountConfig;
use capsium_router::package::load_all;
use capsium_router::{HttpServer, PackageRegistry, RouterConfig};
use indexmap::IndexMap;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const ISO_NAME: &str = "mn-samples-iso";
pub const ISO_VERSION: &str = "0.1.0";
pub const ISO_DEFAULT_MOUNT: &str = "/capsium/mn-samples-iso-0.1.0/";
pub const ISO_INDEX: &str = "<html><body><h1>ISO sample documents in Metanorma</h1></body></html>\n";
pub const ISO_DOCUMENTS: &str = "<documents><document id=\"iso-tr-1\"/></documents>\n";
pub const ISO_REPORT: &str = "<html><body><p>Technical report</p></body></html>\n";

/// A package directory plus a router serving it.
pub struct Fixture {
    pub dir: TempDir,
    pub config: RouterConfig,
    pub registry: Arc<PackageRegistry>,
    pub server: HttpServer,
}

impl Fixture {
    /// Load every package under the fixture's `package_dir` and build a server.
    pub fn load(dir: TempDir, config: RouterConfig) -> Self {
        let registry = Arc::new(PackageRegistry::new());
        let report = load_all(&registry, &config).unwrap();
        assert!(report.is_clean(), "fixture packages failed to load: {:?}", report.failed);
        let server = HttpServer::new(config.clone(), Arc::clone(&registry));
        Self { dir, config, registry, server }
    }

    pub fn router(&self) -> Router {
        self.server.router()
    }

    pub fn content_file(&self, package: &str, relative: &str) -> PathBuf {
        self.dir.path().join(package).join("content").join(relative)
    }
}

/// Write one package; `manifest` is merged over `{"name", "version"}`.
pub fn write_package(root: &Path, name: &str, version: &str, manifest: Value, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("content")).unwrap();

    let mut doc = serde_json::json!({ "name": name, "version": version });
    if let (Some(doc), Value::Object(extra)) = (doc.as_object_mut(), manifest) {
        doc.extend(extra);
    }
    fs::write(dir.join("manifest.json"), serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    for (path, body) in files {
        let target = dir.join("content").join(path);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, body).unwrap();
    }
    dir
}

pub fn mount(package: &str, path: &str, domain: Option<&str>, headers: &[(&str, &str)]) -> MountConfig {
    MountConfig {
        package: package.to_string(),
        path: path.to_string(),
        domain: domain.map(str::to_string),
        id: None,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<IndexMap<_, _>>(),
        cache_ttl_secs: None,
    }
}

/// `mn-samples-iso` 0.1.0 with an `/app/` mount for any host and a second
/// `/app/` mount bound to `example.com` with its own headers.
pub fn iso_fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    write_package(
        dir.path(),
        ISO_NAME,
        ISO_VERSION,
        serde_json::json!({ "description": "ISO sample documents" }),
        &[
            ("index.html", ISO_INDEX),
            ("documents.xml", ISO_DOCUMENTS),
            ("documents/technical-report/document.html", ISO_REPORT),
        ],
    );

    let mut config = RouterConfig::default();
    config.packages.package_dir = dir.path().to_path_buf();
    config.mounts = vec![
        mount(
            ISO_NAME,
            "/app/",
            None,
            &[("X-Frame-Options", "SAMEORIGIN"), ("X-Content-Type-Options", "nosniff")],
        ),
        mount(
            ISO_NAME,
            "/app/",
            Some("example.com"),
            &[("X-Frame-Options", "DENY"), ("X-Served-For", "example.com")],
        ),
    ];

    Fixture::load(dir, config)
}

pub async fn send(router: &Router, method: Method, host: Option<&str>, path: &str) -> Response<Body> {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(host) = host {
        request = request.header(header::HOST, host);
    }
    router.clone().oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
}

pub async fn get(router: &Router, path: &str) -> Response<Body> {
    send(router, Method::GET, None, path).await
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
