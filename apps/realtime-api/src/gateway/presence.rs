//! In-memory per-user presence tracking with multi-session support.
//!
//! Presence is per-**user**, not per-session. A user is online while at least
//! one gateway session is registered, and goes offline exactly once, when the
//! last session deregisters. Entries are never removed by a deregistration;
//! [`PresenceRegistry::sweep_stale`] drops empty ones after a retention window.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Per-user presence state. `last_seen` is set iff `sessions` is empty.
struct UserPresence {
    sessions: HashSet<String>,
    last_seen: Option<DateTime<Utc>>,
    /// Monotonic twin of `last_seen`, used for retention.
    emptied_at: Option<Instant>,
}

/// An online/offline transition the caller should broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Online,
    Offline { last_seen: DateTime<Utc> },
}

/// Thread-safe, DashMap-backed presence registry.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: DashMap<String, UserPresence>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to the user's set. Returns [`PresenceChange::Online`] if
    /// the set went from empty to non-empty.
    pub fn register_session(&self, user_id: &str, session_id: &str) -> Option<PresenceChange> {
        let mut entry = self
            .inner
            .entry(user_id.to_string())
            .or_insert_with(|| UserPresence {
                sessions: HashSet::new(),
                last_seen: None,
                emptied_at: None,
            });

        let was_online = !entry.sessions.is_empty();
        entry.sessions.insert(session_id.to_string());
        entry.last_seen = None;
        entry.emptied_at = None;

        (!was_online).then_some(PresenceChange::Online)
    }

    /// Remove a session. Returns [`PresenceChange::Offline`] if this was the
    /// user's last session. Unknown users or sessions are a no-op.
    pub fn deregister_session(&self, user_id: &str, session_id: &str) -> Option<PresenceChange> {
        let mut entry = self.inner.get_mut(user_id)?;
        if !entry.sessions.remove(session_id) || !entry.sessions.is_empty() {
            return None;
        }

        let now = Utc::now();
        entry.last_seen = Some(now);
        entry.emptied_at = Some(Instant::now());
        Some(PresenceChange::Offline { last_seen: now })
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner
            .get(user_id)
            .is_some_and(|e| !e.sessions.is_empty())
    }

    /// When the user's last session closed. `None` while online, and for users
    /// this registry has not seen (or has already garbage-collected).
    pub fn last_seen(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.inner.get(user_id).and_then(|e| e.last_seen)
    }

    pub fn session_count(&self, user_id: &str) -> usize {
        self.inner.get(user_id).map_or(0, |e| e.sessions.len())
    }

    pub fn online_users(&self) -> usize {
        self.inner.iter().filter(|e| !e.sessions.is_empty()).count()
    }

    /// Drop entries that have been empty for longer than `retention`.
    /// Returns the number of entries removed.
    pub fn sweep_stale(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, p| {
            !(p.sessions.is_empty()
                && p.emptied_at
                    .is_some_and(|at| now.duration_since(at) > retention))
        });
        before.saturating_sub(self.inner.len())
    }
}
