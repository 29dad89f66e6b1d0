//! Broadcast hub for dispatching gateway events to connected sessions.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connected session
//! subscribes and filters payloads locally by [`Audience`]. Presence and
//! typing state are process-local, so this hub only reaches sessions on the
//! same instance.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use super::events::ServerEvent;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// Which sessions should receive a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    /// Every session not belonging to this user.
    AllExcept(String),
    /// Every session belonging to this user.
    User(String),
    /// Sessions that joined this conversation.
    Conversation(String),
    /// Sessions that joined this conversation, minus the given user's.
    ConversationExcept(String, String),
}

/// A payload broadcast to all connected gateway sessions.
#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    pub audience: Audience,
    /// The dispatch event name (e.g. "MESSAGE_CREATE").
    pub event_name: &'static str,
    /// Serialized event data.
    pub data: Value,
}

impl BroadcastPayload {
    pub fn new(audience: Audience, event: &ServerEvent) -> Self {
        Self {
            audience,
            event_name: event.name(),
            data: event.data(),
        }
    }
}

/// The process-wide broadcast hub. Cloneable; store in AppState.
#[derive(Clone)]
pub struct GatewayBroadcast {
    sender: broadcast::Sender<Arc<BroadcastPayload>>,
}

impl Default for GatewayBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the broadcast channel. Each gateway session should call
    /// this once to get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastPayload>> {
        self.sender.subscribe()
    }

    /// Dispatch an event to every session in `audience`.
    pub fn dispatch(&self, audience: Audience, event: ServerEvent) {
        // send() returns Err if there are no receivers; that's fine.
        let _ = self
            .sender
            .send(Arc::new(BroadcastPayload::new(audience, &event)));
    }
}
