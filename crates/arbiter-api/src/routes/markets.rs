//! # Market History API
//!
//! Every resolution a market has had, including overturned ones, oldest
//! first. Market CRUD belongs to the markets service, not here.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use arbiter_core::MarketId;
use arbiter_state::ResolutionView;

use crate::error::AppError;
use crate::state::AppState;

/// Build the markets router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/markets/{market_id}/resolutions", get(market_history))
}

/// GET /v1/markets/{market_id}/resolutions — Resolution history of a market.
#[utoipa::path(
    get,
    path = "/v1/markets/{market_id}/resolutions",
    params(("market_id" = String, Path, description = "Market ID")),
    responses(
        (status = 200, description = "Resolutions, oldest first (empty if none)", body = Vec<ResolutionView>),
        (status = 422, description = "Invalid market ID", body = crate::error::ErrorBody),
    ),
    tag = "markets"
)]
pub async fn market_history(
    State(state): State<AppState>,
    Path(market_id): Path<String>,
) -> Result<Json<Vec<ResolutionView>>, AppError> {
    let market_id = MarketId::new(market_id)?;
    Ok(Json(state.query.market_history(&market_id).await?))
}
