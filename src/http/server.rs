//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with introspection routes and the content fallback
//! - Wire up middleware (tracing, timeout, request ID, `Server` header)
//! - Serve HTTP/1.1 and HTTP/2 on the listener and shut down gracefully
//! - Emit HTTP/1 header names in Title-Case, matching how policy headers
//!   are conventionally declared
//! - Dispatch content requests to the resolver and stream files
//! - Observability (metrics, correlation IDs)

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request},
    response::{IntoResponse, Response},
    Router,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful::GracefulShutdown},
    service::TowerToHyperService,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::{
    services::ServeFile, set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::config::RouterConfig;
use crate::http::request::{
    propagate_request_id_layer, request_host, request_span, set_request_id_layer, RequestIdExt,
};
use crate::http::response::{landing_page, moved_permanently, not_found, with_policy_headers, SERVER_NAME};
use crate::introspection::{setup_introspection_router, ValidityCache};
use crate::observability::metrics;
use crate::package::registry::PackageRegistry;
use crate::routing::{resolve, ResolveError, Target};

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PackageRegistry>,
    pub validity: Arc<ValidityCache>,
    pub config: Arc<RouterConfig>,
}

impl AppState {
    pub fn new(registry: Arc<PackageRegistry>, config: RouterConfig) -> Self {
        let ttl = Duration::from_secs(config.introspection.validity_cache_ttl_secs);
        Self {
            registry,
            validity: Arc::new(ValidityCache::new(ttl)),
            config: Arc::new(config),
        }
    }
}

/// HTTP server for the package router.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server serving `registry`.
    pub fn new(config: RouterConfig, registry: Arc<PackageRegistry>) -> Self {
        let state = AppState::new(registry, config);
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState) -> Router {
        let request_timeout = Duration::from_secs(state.config.timeouts.request_secs);
        Router::new()
            .fallback(serve_content)
            .with_state(state.clone())
            .merge(setup_introspection_router(state))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::SERVER,
                HeaderValue::from_static(SERVER_NAME),
            ))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for driving requests in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            packages = self.state.registry.len(),
            "HTTP server starting"
        );

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder.http1().title_case_headers(true);
        let graceful = GracefulShutdown::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let service = TowerToHyperService::new(self.router.clone());
                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                    let conn = graceful.watch(conn.into_owned());
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(remote = %remote, error = %e, "Connection ended with error");
                        }
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, draining connections");
                    break;
                }
            }
        }

        drop(listener);
        graceful.shutdown().await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Content handler: resolve, then hand the file to the static transport.
async fn serve_content(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let host = request_host(&request).map(str::to_owned);
    let snapshot = state.registry.snapshot();

    let resolution = match resolve(&snapshot, host.as_deref(), &path) {
        Ok(Target::File(resolution)) => resolution,
        Ok(Target::Redirect(location)) => {
            tracing::debug!(
                request_id = %request.request_id(),
                path = %path,
                location = %location,
                "Redirecting directory to its slash form"
            );
            metrics::record_request(method.as_str(), 301, "redirect", start_time);
            return moved_permanently(&location, request.uri().query());
        }
        Err(e) => {
            let landing = path == "/"
                && state.config.introspection.landing_page
                && matches!(e, ResolveError::NoMountMatch { .. })
                && matches!(method, Method::GET | Method::HEAD);
            if landing {
                metrics::record_request(method.as_str(), 200, "landing", start_time);
                return landing_page(&snapshot);
            }

            tracing::debug!(
                request_id = %request.request_id(),
                host = host.as_deref().unwrap_or("-"),
                path = %path,
                reason = e.kind(),
                error = %e,
                "Resolution failed"
            );
            metrics::record_request(method.as_str(), 404, e.kind(), start_time);
            return not_found();
        }
    };

    let file_path = resolution.file_path();
    if !is_regular_file(&file_path) {
        tracing::warn!(
            package = %resolution.package().name(),
            file = %resolution.relative_path(),
            "Indexed file is no longer a regular file"
        );
        metrics::record_request(method.as_str(), 404, "not_found", start_time);
        return not_found();
    }

    tracing::debug!(
        request_id = %request.request_id(),
        package = %resolution.package().name(),
        mount = %resolution.mount().pattern(),
        file = %resolution.relative_path(),
        "Serving file"
    );

    let headers = resolution.headers();
    tracing::trace!(
        headers = ?headers.iter().collect::<Vec<_>>(),
        "Policy headers"
    );
    let response = match ServeFile::new(&file_path).oneshot(request).await {
        Ok(response) => response,
        Err(infallible) => match infallible {},
    };
    let response = with_policy_headers(response, &headers);

    metrics::record_request(method.as_str(), response.status().as_u16(), "served", start_time);
    response.into_response()
}

/// Files swapped for symlinks after indexing are never followed.
fn is_regular_file(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_file())
        .unwrap_or(false)
}
