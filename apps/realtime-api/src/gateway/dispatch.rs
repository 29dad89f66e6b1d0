//! COMMAND handlers. Each command maps to exactly the components it needs and
//! returns a typed result; the HTTP routes call the same functions.

use serde::Serialize;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::models::message::{Message, MessageBody};
use crate::models::notification::NotificationKind;
use crate::services::Actor;
use crate::AppState;

use super::events::{Command, ServerEvent};
use super::fanout::Audience;
use super::session::GatewaySession;

/// Run a decoded command for a session and produce the COMMAND_RESULT data.
pub async fn execute(state: &AppState, session: &GatewaySession, command: Command) -> CoreResult<Value> {
    let actor = Actor::from(session);

    match command {
        Command::SendMessage(cmd) => {
            let message = send_message(
                state,
                actor,
                &cmd.conversation_id,
                cmd.receiver_id.as_deref(),
                cmd.body,
            )
            .await?;
            to_data(&message)
        }
        Command::JoinConversation(cmd) => {
            let conversation = state
                .conversations
                .get_for_participant(&cmd.conversation_id, actor.user_id)
                .await?;
            session.join(&conversation.id);
            let marked_read = state
                .conversations
                .mark_read(&conversation.id, actor.user_id)
                .await?;
            Ok(serde_json::json!({
                "conversation": conversation,
                "marked_read": marked_read,
                "typing": state.typing.active_in(&conversation.id),
            }))
        }
        Command::LeaveConversation(cmd) => {
            session.leave(&cmd.conversation_id);
            stop_typing(state, actor.user_id, &cmd.conversation_id);
            Ok(Value::Null)
        }
        Command::TypingStart(cmd) => {
            require_joined(session, &cmd.conversation_id)?;
            state
                .conversations
                .get_for_participant(&cmd.conversation_id, actor.user_id)
                .await?;
            state.typing.start(&cmd.conversation_id, actor.user_id);
            state.broadcast.dispatch(
                Audience::ConversationExcept(cmd.conversation_id.clone(), actor.user_id.to_string()),
                ServerEvent::TypingStart {
                    conversation_id: cmd.conversation_id,
                    user_id: actor.user_id.to_string(),
                },
            );
            Ok(serde_json::json!({ "ttl_ms": state.typing.ttl().as_millis() as u64 }))
        }
        Command::TypingStop(cmd) => {
            require_joined(session, &cmd.conversation_id)?;
            state.typing.stop(&cmd.conversation_id, actor.user_id);
            state.broadcast.dispatch(
                Audience::ConversationExcept(cmd.conversation_id.clone(), actor.user_id.to_string()),
                ServerEvent::TypingStop {
                    conversation_id: cmd.conversation_id,
                    user_id: actor.user_id.to_string(),
                },
            );
            Ok(Value::Null)
        }
        Command::MatchRequest(cmd) => {
            let created = state.matches.request(actor, &cmd.target_id).await?;
            to_data(&created)
        }
        Command::MatchResponse(cmd) => {
            let outcome = state
                .matches
                .respond(actor, &cmd.match_id, cmd.decision)
                .await?;
            to_data(&outcome)
        }
    }
}

/// Append a message, clear the sender's typing indicator, and notify the
/// receiver. A failed notification does not fail the send; the message is
/// already durable.
pub async fn send_message(
    state: &AppState,
    sender: Actor<'_>,
    conversation_id: &str,
    receiver_id: Option<&str>,
    body: MessageBody,
) -> CoreResult<Message> {
    let message = state
        .conversations
        .append_message(conversation_id, sender, receiver_id, body)
        .await?;

    stop_typing(state, sender.user_id, conversation_id);

    let text = format!("New message from {}", sender.display_name);
    if let Err(e) = state
        .notifications
        .notify(
            &message.receiver_id,
            sender.user_id,
            NotificationKind::Message,
            text,
            Some(conversation_id),
        )
        .await
    {
        tracing::error!(conversation_id, message_id = message.id, error = %e, "message notification failed");
    }

    Ok(message)
}

/// Clear a typing indicator and tell the conversation, if it was active.
pub fn stop_typing(state: &AppState, user_id: &str, conversation_id: &str) {
    if state.typing.stop(conversation_id, user_id) {
        state.broadcast.dispatch(
            Audience::ConversationExcept(conversation_id.to_string(), user_id.to_string()),
            ServerEvent::TypingStop {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }
}

fn to_data(value: &impl Serialize) -> CoreResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn require_joined(session: &GatewaySession, conversation_id: &str) -> CoreResult<()> {
    if session.has_joined(conversation_id) {
        Ok(())
    } else {
        Err(CoreError::Unauthorized(
            "Join the conversation first".into(),
        ))
    }
}
