//! # signoff-api — Axum API Service
//!
//! HTTP adapter over [`signoff_engine::ApprovalEngine`].
//!
//! ## API Surface
//!
//! | Prefix | Module | Domain |
//! |---|---|---|
//! | `/v1/workflows/*`, `/v1/stages/*` | [`routes::workflows`] | Definitions |
//! | `/v1/documents/*` | [`routes::documents`] | Approval transitions |
//! | `/health/liveness` | this module | Probe |
//! | `/metrics` | this module | Prometheus scrape |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → Handler
//! ```
//!
//! ## Crate Policy
//!
//! - No business logic in route handlers; they delegate to the engine.
//! - All errors map to structured HTTP responses via `AppError`.
//! - The acting user comes from `x-actor-id` / `x-actor-roles`, set by the
//!   host application after authentication.

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::{AppConfig, AppState};

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Assemble the full application router.
///
/// `/metrics` is mounted only when metrics are enabled and a recorder handle
/// is present in `state`.
pub fn app(state: AppState) -> Router {
    let metrics_on = state.config.metrics_enabled && state.metrics.is_some();

    let mut api = Router::new()
        .merge(routes::workflows::router())
        .merge(routes::documents::router());
    if metrics_on {
        api = api.layer(from_fn(middleware::metrics::metrics_middleware));
    }
    let api = api.layer(TraceLayer::new_for_http()).with_state(state.clone());

    let mut probes = Router::new().route("/health/liveness", axum::routing::get(liveness));
    if metrics_on {
        probes = probes.route("/metrics", axum::routing::get(prometheus_metrics));
    }

    Router::new().merge(probes.with_state(state)).merge(api)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// GET /metrics — Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}
