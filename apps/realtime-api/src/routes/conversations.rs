//! Conversation and message endpoints. Writes go through the same command
//! handlers as the gateway, so HTTP clients trigger the same fan-out.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::dispatch;
use crate::models::conversation::Conversation;
use crate::models::message::{Message, MessageBody};
use crate::AppState;

use super::users::{participant_info, ParticipantInfo};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(open_conversation),
        )
        .route("/conversations/{conversation_id}", get(get_conversation))
        .route(
            "/conversations/{conversation_id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/{conversation_id}/read", put(mark_read))
        .route(
            "/conversations/{conversation_id}/messages/{message_id}",
            delete(delete_message),
        )
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub counterpart: ParticipantInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<ParticipantInfo>,
}

async fn summarize(
    state: &AppState,
    user_id: &str,
    conversations: Vec<Conversation>,
) -> Result<Vec<ConversationSummary>, ApiError> {
    let counterpart_ids: Vec<String> = conversations
        .iter()
        .filter_map(|c| c.counterpart(user_id).map(str::to_string))
        .collect();
    let infos = participant_info(state, &counterpart_ids).await?;

    Ok(conversations
        .into_iter()
        .zip(infos)
        .map(|(conversation, counterpart)| ConversationSummary {
            conversation,
            counterpart,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// GET /api/v1/conversations
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/conversations",
    tag = "Conversations",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Conversations, most recently active first", body = [ConversationSummary]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_conversations(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let conversations = state.conversations.list_for_user(&user.user_id).await?;
    Ok(Json(summarize(&state, &user.user_id, conversations).await?))
}

// ---------------------------------------------------------------------------
// POST /api/v1/conversations
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct OpenConversationRequest {
    pub user_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/conversations",
    tag = "Conversations",
    security(("bearer" = [])),
    request_body = OpenConversationRequest,
    responses(
        (status = 200, description = "Existing or newly created conversation", body = ConversationSummary),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "No accepted match with this user", body = ApiErrorBody),
    ),
)]
pub async fn open_conversation(
    user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<OpenConversationRequest>,
) -> Result<Json<ConversationSummary>, ApiError> {
    let conversation = state
        .conversations
        .open_with(&user.user_id, &body.user_id)
        .await?;
    summarize(&state, &user.user_id, vec![conversation])
        .await?
        .pop()
        .map(Json)
        .ok_or_else(|| ApiError::internal("conversation summary missing"))
}

// ---------------------------------------------------------------------------
// GET /api/v1/conversations/{conversation_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/conversations/{conversation_id}",
    tag = "Conversations",
    security(("bearer" = [])),
    params(
        ("conversation_id" = String, Path, description = "Conversation ID"),
    ),
    responses(
        (status = 200, description = "Conversation with participant details", body = ConversationDetail),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Conversation not found", body = ApiErrorBody),
    ),
)]
pub async fn get_conversation(
    user: AuthUser,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let conversation = state
        .conversations
        .get_for_participant(&conversation_id, &user.user_id)
        .await?;
    let ids = conversation.participants().map(str::to_string);
    let participants = participant_info(&state, &ids).await?;
    Ok(Json(ConversationDetail {
        conversation,
        participants,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/conversations/{conversation_id}/messages
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/conversations/{conversation_id}/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("conversation_id" = String, Path, description = "Conversation ID"),
    ),
    responses(
        (status = 200, description = "Full history in append order", body = [Message]),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Conversation not found", body = ApiErrorBody),
    ),
)]
pub async fn list_messages(
    user: AuthUser,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .conversations
        .list_messages(&conversation_id, &user.user_id)
        .await?;
    Ok(Json(messages))
}

// ---------------------------------------------------------------------------
// POST /api/v1/conversations/{conversation_id}/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    /// Defaults to the other participant.
    #[serde(default)]
    pub receiver_id: Option<String>,
    pub body: MessageBody,
}

#[utoipa::path(
    post,
    path = "/api/v1/conversations/{conversation_id}/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("conversation_id" = String, Path, description = "Conversation ID"),
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message appended", body = Message),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Receiver is not the other participant", body = ApiErrorBody),
        (status = 404, description = "Conversation not found", body = ApiErrorBody),
        (status = 503, description = "Store unavailable after retries", body = ApiErrorBody),
    ),
)]
pub async fn send_message(
    user: AuthUser,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = dispatch::send_message(
        &state,
        (&user).into(),
        &conversation_id,
        req.receiver_id.as_deref(),
        req.body,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

// ---------------------------------------------------------------------------
// PUT /api/v1/conversations/{conversation_id}/read
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkReadResponse {
    pub marked_read: u64,
}

#[utoipa::path(
    put,
    path = "/api/v1/conversations/{conversation_id}/read",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("conversation_id" = String, Path, description = "Conversation ID"),
    ),
    responses(
        (status = 200, description = "Messages addressed to the caller marked read", body = MarkReadResponse),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Conversation not found", body = ApiErrorBody),
    ),
)]
pub async fn mark_read(
    user: AuthUser,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let marked_read = state
        .conversations
        .mark_read(&conversation_id, &user.user_id)
        .await?;
    Ok(Json(MarkReadResponse { marked_read }))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/conversations/{conversation_id}/messages/{message_id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MessagePath {
    pub conversation_id: String,
    pub message_id: String,
}

impl MessagePath {
    fn message_id_i64(&self) -> Result<i64, ApiError> {
        self.message_id
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid message ID"))
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/conversations/{conversation_id}/messages/{message_id}",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("conversation_id" = String, Path, description = "Conversation ID"),
        ("message_id" = String, Path, description = "Message ID"),
    ),
    responses(
        (status = 200, description = "Message tombstoned", body = Message),
        (status = 400, description = "Invalid message ID", body = ApiErrorBody),
        (status = 404, description = "Message not found or not yours", body = ApiErrorBody),
    ),
)]
pub async fn delete_message(
    user: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<MessagePath>,
) -> Result<Json<Message>, ApiError> {
    let message_id = path.message_id_i64()?;
    let message = state
        .conversations
        .tombstone(&path.conversation_id, message_id, &user.user_id)
        .await?;
    Ok(Json(message))
}
