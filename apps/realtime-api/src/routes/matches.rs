//! Match request endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::match_request::{MatchDecision, MatchRequest};
use crate::services::matches::MatchResponseOutcome;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/matches", post(request_match))
        .route("/matches/sent", get(list_sent))
        .route("/matches/received", get(list_received))
        .route("/matches/accepted", get(list_accepted))
        .route("/matches/block", post(block_user))
        .route("/matches/{match_id}/respond", post(respond_to_match))
}

// ---------------------------------------------------------------------------
// POST /api/v1/matches
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct MatchRequestBody {
    pub target_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/matches",
    tag = "Matches",
    security(("bearer" = [])),
    request_body = MatchRequestBody,
    responses(
        (status = 201, description = "Request created", body = MatchRequest),
        (status = 400, description = "Cannot request yourself", body = ApiErrorBody),
        (status = 409, description = "Pair already pending, matched, or blocked", body = ApiErrorBody),
    ),
)]
pub async fn request_match(
    user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<MatchRequestBody>,
) -> Result<(StatusCode, Json<MatchRequest>), ApiError> {
    let created = state.matches.request((&user).into(), &body.target_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// ---------------------------------------------------------------------------
// POST /api/v1/matches/{match_id}/respond
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondBody {
    pub decision: MatchDecision,
}

#[utoipa::path(
    post,
    path = "/api/v1/matches/{match_id}/respond",
    tag = "Matches",
    security(("bearer" = [])),
    params(
        ("match_id" = String, Path, description = "Match request ID"),
    ),
    request_body = RespondBody,
    responses(
        (status = 200, description = "Request answered", body = MatchResponseOutcome),
        (status = 403, description = "Caller is not the target", body = ApiErrorBody),
        (status = 404, description = "Match request not found", body = ApiErrorBody),
        (status = 409, description = "Request is no longer pending", body = ApiErrorBody),
    ),
)]
pub async fn respond_to_match(
    user: AuthUser,
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Json(body): Json<RespondBody>,
) -> Result<Json<MatchResponseOutcome>, ApiError> {
    let outcome = state
        .matches
        .respond((&user).into(), &match_id, body.decision)
        .await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// POST /api/v1/matches/block
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct BlockBody {
    pub user_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/matches/block",
    tag = "Matches",
    security(("bearer" = [])),
    request_body = BlockBody,
    responses(
        (status = 200, description = "Pair blocked", body = MatchRequest),
        (status = 400, description = "Cannot block yourself", body = ApiErrorBody),
    ),
)]
pub async fn block_user(
    user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<BlockBody>,
) -> Result<Json<MatchRequest>, ApiError> {
    Ok(Json(state.matches.block((&user).into(), &body.user_id).await?))
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/matches/sent",
    tag = "Matches",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Pending requests sent by the caller", body = [MatchRequest]),
    ),
)]
pub async fn list_sent(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MatchRequest>>, ApiError> {
    Ok(Json(state.matches.pending_sent_by(&user.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/matches/received",
    tag = "Matches",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Pending requests addressed to the caller", body = [MatchRequest]),
    ),
)]
pub async fn list_received(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MatchRequest>>, ApiError> {
    Ok(Json(state.matches.pending_received_by(&user.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/matches/accepted",
    tag = "Matches",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Accepted matches involving the caller", body = [MatchRequest]),
    ),
)]
pub async fn list_accepted(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MatchRequest>>, ApiError> {
    Ok(Json(state.matches.accepted_for(&user.user_id).await?))
}
