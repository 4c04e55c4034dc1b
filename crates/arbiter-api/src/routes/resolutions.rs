//! # Resolution API
//!
//! Create, list, and inspect resolutions; drive `pending → confirmed` and
//! `confirmed → final`; replay a resolution's audit trail.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use arbiter_core::{MarketId, OutcomeId, ResolutionId};
use arbiter_state::{
    AuditTrailView, CreateResolution, Page, Resolution, ResolutionFilter, ResolutionSource,
    ResolutionStatus, ResolutionView,
};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{
    check_text_len, extract_query, extract_validated_json, parse_id, Validate,
};
use crate::state::AppState;

// -- Request / Response types -------------------------------------------------

/// Request to resolve a market. The caller becomes the resolver.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateResolutionRequest {
    pub market_id: String,
    pub resolved_outcome_id: String,
    /// `oracle` (default) or `admin`.
    #[serde(default)]
    pub source: Option<ResolutionSource>,
    pub notes: Option<String>,
}

impl Validate for CreateResolutionRequest {
    fn validate(&self) -> Result<(), String> {
        check_text_len("notes", self.notes.as_deref())
    }
}

/// Filters and paging for the resolution listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListResolutionsQuery {
    /// `pending`, `disputed`, `confirmed`, or `final`.
    pub status: Option<String>,
    pub market_id: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size, capped by `MAX_PAGE_SIZE`.
    pub limit: Option<u32>,
}

impl ListResolutionsQuery {
    fn filter(&self) -> Result<ResolutionFilter, AppError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<ResolutionStatus>)
            .transpose()
            .map_err(AppError::Validation)?;
        let market_id = self.market_id.as_deref().map(MarketId::new).transpose()?;
        Ok(ResolutionFilter { status, market_id })
    }
}

/// One page of resolutions, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResolutionListResponse {
    pub items: Vec<ResolutionView>,
    pub page: u32,
    pub limit: u32,
    /// Number of resolutions matching the filter.
    pub total: u64,
}

impl From<Page<ResolutionView>> for ResolutionListResponse {
    fn from(page: Page<ResolutionView>) -> Self {
        Self {
            items: page.items,
            page: page.page,
            limit: page.limit,
            total: page.total,
        }
    }
}

// -- Router -------------------------------------------------------------------

/// Build the resolutions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/resolutions",
            post(create_resolution).get(list_resolutions),
        )
        .route("/v1/resolutions/{id}", get(get_resolution))
        .route("/v1/resolutions/{id}/confirm", post(confirm_resolution))
        .route("/v1/resolutions/{id}/finalize", post(finalize_resolution))
        .route("/v1/resolutions/{id}/audit", get(get_audit_trail))
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/resolutions — Assert the winning outcome of a market.
#[utoipa::path(
    post,
    path = "/v1/resolutions",
    request_body = CreateResolutionRequest,
    responses(
        (status = 201, description = "Resolution created, dispute window open", body = Resolution),
        (status = 403, description = "Caller may not create resolutions", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown market", body = crate::error::ErrorBody),
        (status = 409, description = "Market already has a current resolution", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid outcome or input", body = crate::error::ErrorBody),
    ),
    tag = "resolutions"
)]
pub async fn create_resolution(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateResolutionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Resolution>), AppError> {
    let req = extract_validated_json(body)?;
    let resolution = state
        .workflow
        .create_resolution(CreateResolution {
            market_id: MarketId::new(req.market_id)?,
            resolved_outcome_id: OutcomeId::new(req.resolved_outcome_id)?,
            source: req.source.unwrap_or(ResolutionSource::Oracle),
            resolver_ref: caller.actor,
            notes: req.notes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(resolution)))
}

/// GET /v1/resolutions — Filtered, paged listing.
#[utoipa::path(
    get,
    path = "/v1/resolutions",
    params(ListResolutionsQuery),
    responses(
        (status = 200, description = "Page of resolutions", body = ResolutionListResponse),
        (status = 422, description = "Unknown status filter", body = crate::error::ErrorBody),
    ),
    tag = "resolutions"
)]
pub async fn list_resolutions(
    State(state): State<AppState>,
    query: Result<Query<ListResolutionsQuery>, QueryRejection>,
) -> Result<Json<ResolutionListResponse>, AppError> {
    let query = extract_query(query)?;
    let filter = query.filter()?;
    let page = state
        .query
        .list_resolutions(&filter, query.page, query.limit)
        .await?;
    Ok(Json(page.into()))
}

/// GET /v1/resolutions/{id} — One resolution with its disputes.
#[utoipa::path(
    get,
    path = "/v1/resolutions/{id}",
    params(("id" = String, Path, description = "Resolution ID (UUID)")),
    responses(
        (status = 200, description = "Resolution found", body = ResolutionView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "resolutions"
)]
pub async fn get_resolution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResolutionView>, AppError> {
    let id: ResolutionId = parse_id(&id)?;
    Ok(Json(state.query.get_resolution(id).await?))
}

/// POST /v1/resolutions/{id}/confirm — Close the dispute window.
#[utoipa::path(
    post,
    path = "/v1/resolutions/{id}/confirm",
    params(("id" = String, Path, description = "Resolution ID (UUID)")),
    responses(
        (status = 200, description = "Resolution confirmed", body = Resolution),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Window still open, disputes open, or not pending", body = crate::error::ErrorBody),
    ),
    tag = "resolutions"
)]
pub async fn confirm_resolution(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Resolution>, AppError> {
    let id: ResolutionId = parse_id(&id)?;
    let resolution = state.workflow.confirm_resolution(id, &caller.actor).await?;
    Ok(Json(resolution))
}

/// POST /v1/resolutions/{id}/finalize — Mark a confirmed resolution settled.
#[utoipa::path(
    post,
    path = "/v1/resolutions/{id}/finalize",
    params(("id" = String, Path, description = "Resolution ID (UUID)")),
    responses(
        (status = 200, description = "Resolution final", body = Resolution),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Payout pending or not confirmed", body = crate::error::ErrorBody),
    ),
    tag = "resolutions"
)]
pub async fn finalize_resolution(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Resolution>, AppError> {
    let id: ResolutionId = parse_id(&id)?;
    let resolution = state.workflow.finalize_resolution(id, &caller.actor).await?;
    Ok(Json(resolution))
}

/// GET /v1/resolutions/{id}/audit — Audit trail with hash-chain verification.
#[utoipa::path(
    get,
    path = "/v1/resolutions/{id}/audit",
    params(("id" = String, Path, description = "Resolution ID (UUID)")),
    responses(
        (status = 200, description = "Audit trail in commit order", body = AuditTrailView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "resolutions"
)]
pub async fn get_audit_trail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuditTrailView>, AppError> {
    let id: ResolutionId = parse_id(&id)?;
    Ok(Json(state.query.audit_trail(id).await?))
}
