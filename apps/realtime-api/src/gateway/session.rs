//! Per-connection gateway session state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::fanout::Audience;

/// State for a single WebSocket connection.
pub struct GatewaySession {
    /// Unique session identifier (`gw_` prefixed ULID).
    pub session_id: String,
    /// Authenticated user ID.
    pub user_id: String,
    /// Display name from the verified identity (cached at IDENTIFY time).
    pub display_name: String,
    /// Conversations this session has joined.
    conversations: Mutex<HashSet<String>>,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl GatewaySession {
    pub fn new(session_id: String, user_id: String, display_name: String) -> Self {
        Self {
            session_id,
            user_id,
            display_name,
            conversations: Mutex::new(HashSet::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn join(&self, conversation_id: &str) {
        self.conversations.lock().insert(conversation_id.to_string());
    }

    /// Returns whether the session had joined the conversation.
    pub fn leave(&self, conversation_id: &str) -> bool {
        self.conversations.lock().remove(conversation_id)
    }

    pub fn has_joined(&self, conversation_id: &str) -> bool {
        self.conversations.lock().contains(conversation_id)
    }

    /// Whether a payload addressed to `audience` should be delivered here.
    pub fn wants(&self, audience: &Audience) -> bool {
        match audience {
            Audience::Everyone => true,
            Audience::AllExcept(user) => self.user_id != *user,
            Audience::User(user) => self.user_id == *user,
            Audience::Conversation(id) => self.has_joined(id),
            Audience::ConversationExcept(id, user) => self.user_id != *user && self.has_joined(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: &str) -> GatewaySession {
        GatewaySession::new("gw_test".into(), user.into(), "Test".into())
    }

    #[test]
    fn seq_starts_at_one_and_increases() {
        let s = session("usr_a");
        assert_eq!(s.next_seq(), 1);
        assert_eq!(s.next_seq(), 2);
    }

    #[test]
    fn audience_filtering() {
        let s = session("usr_a");
        s.join("cnv_1");

        assert!(s.wants(&Audience::Everyone));
        assert!(s.wants(&Audience::AllExcept("usr_b".into())));
        assert!(!s.wants(&Audience::AllExcept("usr_a".into())));
        assert!(s.wants(&Audience::User("usr_a".into())));
        assert!(!s.wants(&Audience::User("usr_b".into())));
        assert!(s.wants(&Audience::Conversation("cnv_1".into())));
        assert!(!s.wants(&Audience::Conversation("cnv_2".into())));
        assert!(s.wants(&Audience::ConversationExcept("cnv_1".into(), "usr_b".into())));
        assert!(!s.wants(&Audience::ConversationExcept("cnv_1".into(), "usr_a".into())));
    }

    #[test]
    fn leaving_stops_conversation_delivery() {
        let s = session("usr_a");
        s.join("cnv_1");
        assert!(s.leave("cnv_1"));
        assert!(!s.leave("cnv_1"));
        assert!(!s.wants(&Audience::Conversation("cnv_1".into())));
    }
}
