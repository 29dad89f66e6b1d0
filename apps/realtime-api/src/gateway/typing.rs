//! Ephemeral typing indicators keyed by (conversation, user).
//!
//! Entries carry an expiry instant. Reads treat anything past its expiry as
//! stopped; the background sweeper removes such entries and reports them so a
//! `TYPING_STOP` can be broadcast for clients that vanished mid-sentence.

use std::time::{Duration, Instant};

use dashmap::DashMap;

type TypingKey = (String, String);

pub struct TypingCoordinator {
    entries: DashMap<TypingKey, Instant>,
    ttl: Duration,
}

impl TypingCoordinator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Set or refresh the entry. Returns `true` if the user was not already
    /// typing in this conversation.
    pub fn start(&self, conversation_id: &str, user_id: &str) -> bool {
        let now = Instant::now();
        let previous = self
            .entries
            .insert(key(conversation_id, user_id), now + self.ttl);
        !previous.is_some_and(|expiry| expiry > now)
    }

    /// Clear the entry. Returns `true` if it was still active.
    pub fn stop(&self, conversation_id: &str, user_id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(&key(conversation_id, user_id))
            .is_some_and(|(_, expiry)| expiry > now)
    }

    pub fn is_active(&self, conversation_id: &str, user_id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(&key(conversation_id, user_id))
            .is_some_and(|expiry| *expiry > now)
    }

    /// Users currently typing in a conversation.
    pub fn active_in(&self, conversation_id: &str) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.key().0 == conversation_id && *e.value() > now)
            .map(|e| e.key().1.clone())
            .collect()
    }

    /// Remove expired entries, returning their (conversation, user) keys.
    pub fn sweep_expired(&self) -> Vec<(String, String)> {
        let now = Instant::now();
        let expired: Vec<TypingKey> = self
            .entries
            .iter()
            .filter(|e| *e.value() <= now)
            .map(|e| e.key().clone())
            .collect();

        // A concurrent refresh between the scan and removal wins.
        expired
            .into_iter()
            .filter(|k| self.entries.remove_if(k, |_, expiry| *expiry <= now).is_some())
            .collect()
    }

    /// Drop every entry for a user, returning the conversations whose
    /// indicator was still active.
    pub fn clear_user(&self, user_id: &str) -> Vec<String> {
        let now = Instant::now();
        let keys: Vec<TypingKey> = self
            .entries
            .iter()
            .filter(|e| e.key().1 == user_id)
            .map(|e| e.key().clone())
            .collect();

        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k))
            .filter(|(_, expiry)| *expiry > now)
            .map(|((conversation_id, _), _)| conversation_id)
            .collect()
    }
}

fn key(conversation_id: &str, user_id: &str) -> TypingKey {
    (conversation_id.to_string(), user_id.to_string())
}
