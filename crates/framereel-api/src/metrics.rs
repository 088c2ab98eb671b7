//! Prometheus metrics for the API server.
//!
//! Pipeline metrics (`framereel_conversions_total`,
//! `framereel_conversion_duration_seconds`, `framereel_frames_staged_total`,
//! stage and encode durations) are emitted by `framereel-media` and rendered
//! through the same recorder.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "framereel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "framereel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "framereel_http_requests_in_flight";

    // Upload metrics
    pub const UPLOAD_FILES: &str = "framereel_upload_files";
    pub const UPLOAD_BYTES: &str = "framereel_upload_bytes";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "framereel_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path).to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record the size of an accepted conversion upload.
pub fn record_upload(files: usize, bytes: u64) {
    histogram!(names::UPLOAD_FILES).record(files as f64);
    histogram!(names::UPLOAD_BYTES).record(bytes as f64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint).to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse request paths to the known route set so label cardinality stays bounded.
fn sanitize_path(path: &str) -> &'static str {
    match path {
        "/api" | "/api/" => "/api/",
        "/api/status" => "/api/status",
        "/api/flask-status" => "/api/flask-status",
        "/api/progress" => "/api/progress",
        "/api/convert" => "/api/convert",
        "/health" => "/health",
        "/healthz" => "/healthz",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => "other",
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    // Increment in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    // Decrement in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
