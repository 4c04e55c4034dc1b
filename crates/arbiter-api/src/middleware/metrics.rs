//! # Prometheus Metrics
//!
//! Records every HTTP request through the `metrics` facade:
//!
//! - `arbiter_http_requests_total{method, route, status}`
//! - `arbiter_http_request_duration_seconds{method, route}`
//!
//! The binary installs a Prometheus recorder and serves the exposition at
//! `/metrics`. Without a recorder the calls are no-ops.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

pub const HTTP_REQUESTS_TOTAL: &str = "arbiter_http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "arbiter_http_request_duration_seconds";

/// Label for requests that matched no route, to bound label cardinality.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Middleware that counts requests and records their latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "route" => route
    )
    .record(started.elapsed().as_secs_f64());

    response
}
