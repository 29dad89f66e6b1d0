//! Notification listing and read-state endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::notification::Notification;
use crate::store::NotificationCursor;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{notification_id}/read", put(mark_read))
}

// ---------------------------------------------------------------------------
// GET /api/v1/notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListNotificationsParams {
    /// Only notifications created strictly before this instant.
    pub before: Option<DateTime<Utc>>,
    /// Id of the last notification on the previous page. With `before`,
    /// also returns older rows sharing that exact timestamp.
    pub before_id: Option<String>,
    /// Page size, 1-100 (default 20).
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListNotificationsResponse {
    pub data: Vec<Notification>,
    pub unread_count: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    tag = "Notifications",
    security(("bearer" = [])),
    params(ListNotificationsParams),
    responses(
        (status = 200, description = "Newest first", body = ListNotificationsResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_notifications(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListNotificationsParams>,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let cursor = params.before.map(|created_at| NotificationCursor {
        created_at,
        id: params.before_id,
    });
    let data = state
        .notifications
        .list(&user.user_id, cursor.as_ref(), params.limit)
        .await?;
    let unread_count = state.notifications.unread_count(&user.user_id).await?;
    Ok(Json(ListNotificationsResponse { data, unread_count }))
}

// ---------------------------------------------------------------------------
// PUT /api/v1/notifications/{notification_id}/read
// ---------------------------------------------------------------------------

#[utoipa::path(
    put,
    path = "/api/v1/notifications/{notification_id}/read",
    tag = "Notifications",
    security(("bearer" = [])),
    params(
        ("notification_id" = String, Path, description = "Notification ID"),
    ),
    responses(
        (status = 200, description = "Notification marked read (idempotent)", body = Notification),
        (status = 404, description = "Notification not found", body = ApiErrorBody),
    ),
)]
pub async fn mark_read(
    user: AuthUser,
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let notification = state
        .notifications
        .mark_read(&notification_id, &user.user_id)
        .await?;
    Ok(Json(notification))
}

// ---------------------------------------------------------------------------
// PUT /api/v1/notifications/read-all
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub marked_read: u64,
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/read-all",
    tag = "Notifications",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All notifications marked read", body = MarkAllReadResponse),
    ),
)]
pub async fn mark_all_read(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let marked_read = state.notifications.mark_all_read(&user.user_id).await?;
    Ok(Json(MarkAllReadResponse { marked_read }))
}
