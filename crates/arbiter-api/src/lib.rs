//! # arbiter-api — Axum API Service for the Market Resolution Arbiter
//!
//! Exposes the resolution workflow over HTTP: oracles and admins resolve
//! markets, participants dispute resolutions inside the dispute window,
//! reviewers accept or reject disputes, and settlement confirms and
//! finalizes. Every step lands in a hash-chained audit trail.
//!
//! ## API Surface
//!
//! | Prefix                          | Module                    | Domain              |
//! |---------------------------------|---------------------------|---------------------|
//! | `/v1/resolutions/*`             | [`routes::resolutions`]   | Resolution lifecycle, audit |
//! | `/v1/resolutions/{id}/disputes` | [`routes::disputes`]      | Dispute filing      |
//! | `/v1/disputes/*`                | [`routes::disputes`]      | Dispute review      |
//! | `/v1/markets/*`                 | [`routes::markets`]       | Market history      |
//! | `/health/*`, `/metrics`         | this module               | Operations          |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Auto-generated OpenAPI 3.1 spec via utoipa derive macros at `/openapi.json`.

pub mod auth;
pub mod db;
pub mod directory;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod policy;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) and `/metrics` are mounted outside the auth
/// middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::resolutions::router())
        .merge(routes::disputes::router())
        .merge(routes::markets::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    // Unauthenticated operational endpoints.
    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(render_metrics));

    Router::new()
        .merge(ops)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .with_state(state)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — 200 when the storage engine answers, 503 otherwise.
///
/// The in-memory engine is always ready; the PostgreSQL engine must answer
/// a trivial query.
async fn readiness(State(state): State<AppState>) -> Response {
    let Some(pool) = &state.db_pool else {
        return "ready".into_response();
    };
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => "ready".into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed: database unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable").into_response()
        }
    }
}

/// GET /metrics — Prometheus text exposition.
async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
