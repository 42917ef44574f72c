//! Prometheus metrics.

use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return its render handle.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record one job submission.
pub fn record_job_submitted(method: &'static str) {
    counter!("vsplit_jobs_submitted_total", "method" => method).increment(1);
}

/// Record a rate-limited request.
pub fn record_rate_limit_hit(path: &str) {
    counter!("vsplit_rate_limit_hits_total", "path" => normalize_path(path)).increment(1);
}

/// HTTP request metrics middleware.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    counter!(
        "vsplit_http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "vsplit_http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

/// Collapse id-like path segments so label cardinality stays bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if looks_like_id(segment) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn looks_like_id(segment: &str) -> bool {
    segment.len() >= 8
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && segment.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_job_ids() {
        assert_eq!(
            normalize_path("/jobs/0aa2b9c8-6f3e-4a8a-bb1e-0c8f6f1e2d3c"),
            "/jobs/:id"
        );
        assert_eq!(
            normalize_path("/jobs/abc-12345/outputs/abc-12345_part_000.mp4"),
            "/jobs/:id/outputs/:id"
        );
    }

    #[test]
    fn normalize_keeps_static_routes() {
        assert_eq!(normalize_path("/jobs"), "/jobs");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }
}
