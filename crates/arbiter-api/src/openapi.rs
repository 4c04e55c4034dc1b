//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Arbiter API — Market Resolution & Disputes",
        version = "0.1.0",
        description = "Resolution lifecycle for prediction markets: resolve, dispute within a bounded window, review, confirm, finalize, and replay the hash-chained audit trail.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Resolutions
        crate::routes::resolutions::create_resolution,
        crate::routes::resolutions::list_resolutions,
        crate::routes::resolutions::get_resolution,
        crate::routes::resolutions::confirm_resolution,
        crate::routes::resolutions::finalize_resolution,
        crate::routes::resolutions::get_audit_trail,
        // Disputes
        crate::routes::disputes::create_dispute,
        crate::routes::disputes::list_disputes,
        crate::routes::disputes::get_dispute,
        crate::routes::disputes::review_dispute,
        // Markets
        crate::routes::markets::market_history,
    ),
    components(schemas(
        // Records
        arbiter_state::Resolution,
        arbiter_state::ResolutionStatus,
        arbiter_state::ResolutionSource,
        arbiter_state::FinalReason,
        arbiter_state::Dispute,
        arbiter_state::DisputeStatus,
        arbiter_state::ReviewDecision,
        arbiter_state::AuditLogEntry,
        arbiter_state::AuditAction,
        arbiter_state::ChainVerification,
        // Views
        arbiter_state::ResolutionView,
        arbiter_state::DisputeView,
        arbiter_state::AuditTrailView,
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // DTOs
        crate::routes::resolutions::CreateResolutionRequest,
        crate::routes::resolutions::ResolutionListResponse,
        crate::routes::disputes::CreateDisputeRequest,
        crate::routes::disputes::ReviewDisputeRequest,
        crate::routes::disputes::ReviewDisputeResponse,
    )),
    tags(
        (name = "resolutions", description = "Resolution lifecycle and audit trail"),
        (name = "disputes", description = "Dispute filing and review"),
        (name = "markets", description = "Per-market resolution history"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
