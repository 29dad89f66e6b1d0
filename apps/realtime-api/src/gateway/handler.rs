//! IDENTIFY handling: ticket redemption, profile upsert, READY payload.

use nikah_common::id::{prefix, prefixed_ulid};

use crate::auth::tokens;
use crate::AppState;

use super::events::{EventName, GatewayMessage, IdentifyPayload};
use super::session::GatewaySession;

/// Process an IDENTIFY opcode. Returns a (`GatewaySession`, READY message) on success.
pub async fn handle_identify(
    state: &AppState,
    payload: IdentifyPayload,
) -> Result<(GatewaySession, GatewayMessage), &'static str> {
    // Consume the ticket (single-use).
    let identity = tokens::consume_ws_ticket(state.kv.as_ref(), &payload.ticket)
        .await
        .map_err(|_| "Ticket lookup failed")?
        .ok_or("Invalid or expired ticket")?;

    let profile = state
        .store
        .upsert_profile(&identity.user_id, &identity.display_name)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %identity.user_id, "profile upsert failed");
            "Profile unavailable"
        })?;

    let unread_notifications = state
        .notifications
        .unread_count(&identity.user_id)
        .await
        .unwrap_or_default();

    let session_id = prefixed_ulid(prefix::GATEWAY_SESSION);

    let ready_data = serde_json::json!({
        "session_id": session_id,
        "user": {
            "id": profile.id,
            "display_name": profile.display_name,
        },
        "unread_notifications": unread_notifications,
        "heartbeat_interval": state.config.heartbeat_interval_ms,
    });

    let session = GatewaySession::new(session_id, identity.user_id, identity.display_name);
    let seq = session.next_seq();
    let ready_msg = GatewayMessage::dispatch(EventName::READY, seq, ready_data);

    Ok((session, ready_msg))
}
