//! # Request Metrics
//!
//! Counts requests and records latency through the `metrics` facade. Values
//! reach Prometheus only when a recorder is installed; otherwise the macros
//! are no-ops.
//!
//! | Metric | Type | Labels |
//! |---|---|---|
//! | `signoff_http_requests_total` | counter | `method`, `status` |
//! | `signoff_http_request_duration_seconds` | histogram | `method` |

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Middleware that records one request count and one latency sample per
/// request.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        "signoff_http_requests_total",
        "method" => method.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!("signoff_http_request_duration_seconds", "method" => method)
        .record(started.elapsed().as_secs_f64());

    response
}
