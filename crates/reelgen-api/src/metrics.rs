//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "reelgen_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "reelgen_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "reelgen_http_requests_in_flight";

    // Admission metrics
    pub const JOBS_ACCEPTED_TOTAL: &str = "reelgen_jobs_accepted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "reelgen_jobs_rejected_total";
    pub const STALE_JOBS_RECOVERED_TOTAL: &str = "reelgen_stale_jobs_recovered_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "reelgen_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_accepted() {
    counter!(names::JOBS_ACCEPTED_TOTAL).increment(1);
}

/// Record a generate request refused by the executor.
pub fn record_job_rejected() {
    counter!(names::JOBS_REJECTED_TOTAL).increment(1);
}

pub fn record_stale_jobs_recovered(count: u64) {
    counter!(names::STALE_JOBS_RECOVERED_TOTAL).increment(count);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static UUID_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}").ok()
});
static STATIC_FILE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^/(videos|uploads)/.+$").ok());

/// Sanitize path for metrics labels (remove IDs, file names).
fn sanitize_path(path: &str) -> String {
    let mut path = path.to_string();
    if let Some(re) = UUID_RE.as_ref() {
        path = re.replace_all(&path, ":id").into_owned();
    }
    // Static media: one label per root, not per file
    if let Some(re) = STATIC_FILE_RE.as_ref() {
        path = re.replace(&path, "/$1/:file").into_owned();
    }
    path
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/videos/status/550e8400-e29b-41d4-a716-446655440000"),
            "/api/videos/status/:id"
        );
        assert_eq!(
            sanitize_path("/videos/550e8400-e29b-41d4-a716-446655440000_final.mp4"),
            "/videos/:file"
        );
        assert_eq!(sanitize_path("/uploads/gym/a.mp4"), "/uploads/:file");
        assert_eq!(sanitize_path("/api/videos/generate"), "/api/videos/generate");
    }
}
