//! # Dispute API
//!
//! File disputes against a resolution inside its window, list and inspect
//! them, and review them. Accepting a dispute overturns the resolution and
//! opens a new cycle with the disputed outcome.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use arbiter_core::{DisputeId, OutcomeId, ResolutionId};
use arbiter_state::{
    CreateDispute, Dispute, DisputeStatus, DisputeView, Resolution, ReviewDecision, ReviewDispute,
    ReviewOutcome,
};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{
    check_text_len, extract_query, extract_validated_json, parse_id, Validate,
};
use crate::state::AppState;

// -- Request / Response types -------------------------------------------------

/// Request to contest a resolution. The caller becomes the filer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDisputeRequest {
    /// The outcome the filer claims should have won.
    pub disputed_outcome_id: String,
    pub reason: String,
    /// Opaque supporting material, stored as submitted.
    #[schema(value_type = Option<Object>)]
    pub evidence: Option<serde_json::Value>,
}

impl Validate for CreateDisputeRequest {
    fn validate(&self) -> Result<(), String> {
        check_text_len("reason", Some(&self.reason))?;
        match &self.evidence {
            Some(evidence) => {
                arbiter_core::reject_nul_in_json("evidence", evidence).map_err(|e| e.to_string())
            }
            None => Ok(()),
        }
    }
}

/// Review decision on an open dispute. The caller becomes the reviewer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewDisputeRequest {
    /// `accept` or `reject`.
    pub decision: ReviewDecision,
    pub review_notes: Option<String>,
}

impl Validate for ReviewDisputeRequest {
    fn validate(&self) -> Result<(), String> {
        check_text_len("review_notes", self.review_notes.as_deref())
    }
}

/// Status filter for dispute listings.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListDisputesQuery {
    /// `open`, `accepted`, or `rejected`.
    pub status: Option<String>,
}

/// Result of a review.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewDisputeResponse {
    /// The reviewed dispute.
    pub dispute: Dispute,
    /// The market's current resolution after the review.
    pub resolution: Resolution,
    /// The overturned resolution, when the dispute was accepted.
    pub overturned: Option<Resolution>,
    /// Sibling disputes closed as superseded by the accept.
    pub superseded: Vec<Dispute>,
}

impl From<ReviewOutcome> for ReviewDisputeResponse {
    fn from(outcome: ReviewOutcome) -> Self {
        Self {
            dispute: outcome.dispute,
            resolution: outcome.resolution,
            overturned: outcome.overturned,
            superseded: outcome.superseded,
        }
    }
}

// -- Router -------------------------------------------------------------------

/// Build the disputes router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/resolutions/{id}/disputes",
            post(create_dispute).get(list_disputes),
        )
        .route("/v1/disputes/{id}", get(get_dispute))
        .route("/v1/disputes/{id}/review", post(review_dispute))
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/resolutions/{id}/disputes — File a dispute.
#[utoipa::path(
    post,
    path = "/v1/resolutions/{id}/disputes",
    params(("id" = String, Path, description = "Resolution ID (UUID)")),
    request_body = CreateDisputeRequest,
    responses(
        (status = 201, description = "Dispute filed, resolution disputed", body = Dispute),
        (status = 404, description = "Resolution not found", body = crate::error::ErrorBody),
        (status = 409, description = "Window closed, duplicate dispute, or resolution not disputable", body = crate::error::ErrorBody),
        (status = 422, description = "Empty reason or invalid outcome", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub async fn create_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<CreateDisputeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Dispute>), AppError> {
    let resolution_id: ResolutionId = parse_id(&id)?;
    let req = extract_validated_json(body)?;
    let dispute = state
        .workflow
        .create_dispute(CreateDispute {
            resolution_id,
            disputed_outcome_id: OutcomeId::new(req.disputed_outcome_id)?,
            creator_ref: caller.actor,
            reason: req.reason,
            evidence: req.evidence,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

/// GET /v1/resolutions/{id}/disputes — Disputes of a resolution in filing order.
#[utoipa::path(
    get,
    path = "/v1/resolutions/{id}/disputes",
    params(
        ("id" = String, Path, description = "Resolution ID (UUID)"),
        ListDisputesQuery,
    ),
    responses(
        (status = 200, description = "Disputes", body = Vec<DisputeView>),
        (status = 404, description = "Resolution not found", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub async fn list_disputes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<ListDisputesQuery>, QueryRejection>,
) -> Result<Json<Vec<DisputeView>>, AppError> {
    let resolution_id: ResolutionId = parse_id(&id)?;
    let status = extract_query(query)?
        .status
        .as_deref()
        .map(str::parse::<DisputeStatus>)
        .transpose()
        .map_err(AppError::Validation)?;
    Ok(Json(state.query.list_disputes(resolution_id, status).await?))
}

/// GET /v1/disputes/{id} — One dispute.
#[utoipa::path(
    get,
    path = "/v1/disputes/{id}",
    params(("id" = String, Path, description = "Dispute ID (UUID)")),
    responses(
        (status = 200, description = "Dispute found", body = DisputeView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub async fn get_dispute(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DisputeView>, AppError> {
    let id: DisputeId = parse_id(&id)?;
    Ok(Json(state.query.get_dispute(id).await?))
}

/// POST /v1/disputes/{id}/review — Accept or reject an open dispute.
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/review",
    params(("id" = String, Path, description = "Dispute ID (UUID)")),
    request_body = ReviewDisputeRequest,
    responses(
        (status = 200, description = "Dispute reviewed", body = ReviewDisputeResponse),
        (status = 403, description = "Caller may not review disputes", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Dispute already reviewed or resolution changed", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub async fn review_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<ReviewDisputeRequest>, JsonRejection>,
) -> Result<Json<ReviewDisputeResponse>, AppError> {
    let dispute_id: DisputeId = parse_id(&id)?;
    let req = extract_validated_json(body)?;
    let outcome = state
        .workflow
        .review_dispute(ReviewDispute {
            dispute_id,
            reviewer_ref: caller.actor,
            decision: req.decision,
            review_notes: req.review_notes,
        })
        .await?;
    Ok(Json(outcome.into()))
}
