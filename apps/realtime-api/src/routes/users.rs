//! Presence lookups for other users.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/users/{user_id}/presence", get(get_presence))
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantInfo {
    pub id: String,
    pub display_name: Option<String>,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Profile and presence for each user id, in input order. Users the service
/// has never seen come back without a display name.
pub(crate) async fn participant_info(
    state: &AppState,
    user_ids: &[String],
) -> Result<Vec<ParticipantInfo>, ApiError> {
    let profiles: HashMap<String, _> = state
        .store
        .get_profiles(user_ids)
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    Ok(user_ids
        .iter()
        .map(|id| {
            let profile = profiles.get(id);
            let online = state.presence.is_online(id);
            // The registry forgets offline users after its retention window.
            let last_seen = if online {
                None
            } else {
                state
                    .presence
                    .last_seen(id)
                    .or_else(|| profile.and_then(|p| p.last_seen_at))
            };
            ParticipantInfo {
                id: id.clone(),
                display_name: profile.map(|p| p.display_name.clone()),
                online,
                last_seen,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// GET /api/v1/users/{user_id}/presence
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/presence",
    tag = "Presence",
    security(("bearer" = [])),
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Presence for the user", body = ParticipantInfo),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn get_presence(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ParticipantInfo>, ApiError> {
    let mut info = participant_info(&state, std::slice::from_ref(&user_id)).await?;
    info.pop()
        .map(Json)
        .ok_or_else(|| ApiError::internal("presence lookup returned nothing"))
}
