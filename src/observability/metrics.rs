//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define router metrics (requests, latency, registry size, reindexing)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `capsium_requests_total` (counter): requests by method, status, outcome
//! - `capsium_request_duration_seconds` (histogram): latency distribution
//! - `capsium_packages_registered` (gauge): packages in the current snapshot
//! - `capsium_reindex_total` (counter): content reindex runs by result
//! - `capsium_content_invalid_total` (counter): validity checks that found drift
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library code
//!   and tests never need a metrics endpoint

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one served request.
///
/// `outcome` is `served`, `redirect`, `landing`, or a resolver failure
/// kind such as `not_found`.
pub fn record_request(method: &str, status: u16, outcome: &'static str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("capsium_requests_total", &labels).increment(1);
    histogram!("capsium_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Publish the size of the latest registry snapshot.
pub fn record_packages(count: usize) {
    gauge!("capsium_packages_registered").set(count as f64);
}

/// Count one reindex attempt.
pub fn record_reindex(success: bool) {
    let result = if success { "ok" } else { "error" };
    counter!("capsium_reindex_total", "result" => result).increment(1);
}

/// Count a validity check that found modified or missing files.
pub fn record_invalid_content(package: &str) {
    counter!("capsium_content_invalid_total", "package" => package.to_string()).increment(1);
}
