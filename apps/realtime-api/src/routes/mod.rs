pub mod conversations;
pub mod health;
pub mod matches;
pub mod notifications;
pub mod users;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api/v1",
            conversations::router()
                .merge(matches::router())
                .merge(notifications::router())
                .merge(users::router()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Conversations
        conversations::list_conversations,
        conversations::open_conversation,
        conversations::get_conversation,
        // Messages
        conversations::list_messages,
        conversations::send_message,
        conversations::mark_read,
        conversations::delete_message,
        // Matches
        matches::request_match,
        matches::respond_to_match,
        matches::block_user,
        matches::list_sent,
        matches::list_received,
        matches::list_accepted,
        // Notifications
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        // Presence
        users::get_presence,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            // Models
            crate::models::conversation::Conversation,
            crate::models::message::Message,
            crate::models::message::MessageBody,
            crate::models::message::MessageStatus,
            crate::models::message::MediaKind,
            crate::models::match_request::MatchRequest,
            crate::models::match_request::MatchStatus,
            crate::models::match_request::MatchDecision,
            crate::models::notification::Notification,
            crate::models::notification::NotificationKind,
            crate::models::user_profile::UserProfile,
            crate::services::matches::MatchResponseOutcome,
            // Route request/response types
            health::HealthResponse,
            conversations::ConversationSummary,
            conversations::ConversationDetail,
            conversations::OpenConversationRequest,
            conversations::SendMessageRequest,
            conversations::MarkReadResponse,
            matches::MatchRequestBody,
            matches::RespondBody,
            matches::BlockBody,
            notifications::ListNotificationsResponse,
            notifications::MarkAllReadResponse,
            users::ParticipantInfo,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Conversations", description = "One-to-one conversations"),
        (name = "Messages", description = "Message log"),
        (name = "Matches", description = "Match requests"),
        (name = "Notifications", description = "Notification inbox"),
        (name = "Presence", description = "Online status"),
    )
)]
pub struct ApiDoc;
