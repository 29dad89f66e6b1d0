//! Gateway opcodes, commands, events, and wire-format messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::match_request::MatchDecision;
use crate::models::message::{Message, MessageBody};
use crate::models::notification::Notification;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_COMMAND: u8 = 4;
pub const OP_COMMAND_RESULT: u8 = 5;
pub const OP_HEARTBEAT_ACK: u8 = 6;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
            nonce: None,
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
            nonce: None,
        }
    }

    /// Successful COMMAND_RESULT (op=5).
    pub fn command_ok(command: &str, nonce: Option<String>, data: Value) -> Self {
        Self {
            op: OP_COMMAND_RESULT,
            t: Some(command.to_string()),
            s: None,
            d: serde_json::json!({ "ok": true, "data": data }),
            nonce,
        }
    }

    /// Failed COMMAND_RESULT (op=5). The session stays open.
    pub fn command_err(command: &str, nonce: Option<String>, code: &str, message: &str) -> Self {
        Self {
            op: OP_COMMAND_RESULT,
            t: Some(command.to_string()),
            s: None,
            d: serde_json::json!({
                "ok": false,
                "error": { "code": code, "message": message },
            }),
            nonce,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub ticket: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// COMMAND payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendMessageCommand {
    pub conversation_id: String,
    /// Defaults to the other participant when omitted.
    #[serde(default)]
    pub receiver_id: Option<String>,
    pub body: MessageBody,
}

#[derive(Debug, Deserialize)]
pub struct ConversationRef {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MatchRequestCommand {
    pub target_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MatchResponseCommand {
    pub match_id: String,
    pub decision: MatchDecision,
}

/// Command names accepted in the `t` field of a COMMAND frame.
pub struct CommandName;

impl CommandName {
    pub const SEND_MESSAGE: &'static str = "SEND_MESSAGE";
    pub const JOIN_CONVERSATION: &'static str = "JOIN_CONVERSATION";
    pub const LEAVE_CONVERSATION: &'static str = "LEAVE_CONVERSATION";
    pub const TYPING_START: &'static str = "TYPING_START";
    pub const TYPING_STOP: &'static str = "TYPING_STOP";
    pub const MATCH_REQUEST: &'static str = "MATCH_REQUEST";
    pub const MATCH_RESPONSE: &'static str = "MATCH_RESPONSE";
}

/// A decoded client command.
#[derive(Debug)]
pub enum Command {
    SendMessage(SendMessageCommand),
    JoinConversation(ConversationRef),
    LeaveConversation(ConversationRef),
    TypingStart(ConversationRef),
    TypingStop(ConversationRef),
    MatchRequest(MatchRequestCommand),
    MatchResponse(MatchResponseCommand),
}

impl Command {
    /// Decode the `d` payload of a COMMAND frame named `name`.
    pub fn parse(name: &str, data: Value) -> Result<Self, String> {
        fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, String> {
            serde_json::from_value(data).map_err(|e| format!("Invalid payload: {e}"))
        }

        match name {
            CommandName::SEND_MESSAGE => decode(data).map(Self::SendMessage),
            CommandName::JOIN_CONVERSATION => decode(data).map(Self::JoinConversation),
            CommandName::LEAVE_CONVERSATION => decode(data).map(Self::LeaveConversation),
            CommandName::TYPING_START => decode(data).map(Self::TypingStart),
            CommandName::TYPING_STOP => decode(data).map(Self::TypingStop),
            CommandName::MATCH_REQUEST => decode(data).map(Self::MatchRequest),
            CommandName::MATCH_RESPONSE => decode(data).map(Self::MatchResponse),
            other => Err(format!("Unknown command: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch event types
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const ONLINE: &'static str = "ONLINE";
    pub const OFFLINE: &'static str = "OFFLINE";
    pub const MESSAGE_CREATE: &'static str = "MESSAGE_CREATE";
    pub const MESSAGES_READ: &'static str = "MESSAGES_READ";
    pub const TYPING_START: &'static str = "TYPING_START";
    pub const TYPING_STOP: &'static str = "TYPING_STOP";
    pub const NOTIFICATION_CREATE: &'static str = "NOTIFICATION_CREATE";
}

/// An outbound event, before it is framed for a particular session.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Online {
        user_id: String,
    },
    Offline {
        user_id: String,
        last_seen: DateTime<Utc>,
    },
    MessageCreate {
        message: Message,
        sender_display_name: String,
    },
    MessagesRead {
        conversation_id: String,
        reader_id: String,
    },
    TypingStart {
        conversation_id: String,
        user_id: String,
    },
    TypingStop {
        conversation_id: String,
        user_id: String,
    },
    NotificationCreate {
        notification: Notification,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Online { .. } => EventName::ONLINE,
            Self::Offline { .. } => EventName::OFFLINE,
            Self::MessageCreate { .. } => EventName::MESSAGE_CREATE,
            Self::MessagesRead { .. } => EventName::MESSAGES_READ,
            Self::TypingStart { .. } => EventName::TYPING_START,
            Self::TypingStop { .. } => EventName::TYPING_STOP,
            Self::NotificationCreate { .. } => EventName::NOTIFICATION_CREATE,
        }
    }

    /// The `d` payload of the DISPATCH frame.
    pub fn data(&self) -> Value {
        match self {
            Self::Online { user_id } => serde_json::json!({ "user_id": user_id }),
            Self::Offline { user_id, last_seen } => {
                serde_json::json!({ "user_id": user_id, "last_seen": last_seen })
            }
            Self::MessageCreate {
                message,
                sender_display_name,
            } => serde_json::json!({
                "message": message,
                "sender_display_name": sender_display_name,
            }),
            Self::MessagesRead {
                conversation_id,
                reader_id,
            } => serde_json::json!({
                "conversation_id": conversation_id,
                "reader_id": reader_id,
            }),
            Self::TypingStart {
                conversation_id,
                user_id,
            }
            | Self::TypingStop {
                conversation_id,
                user_id,
            } => serde_json::json!({
                "conversation_id": conversation_id,
                "user_id": user_id,
            }),
            Self::NotificationCreate { notification } => {
                serde_json::json!({ "notification": notification })
            }
        }
    }
}
