//! Persistence boundary for the real-time core.
//!
//! Every operation that must be atomic (match insert-if-absent, match status
//! compare-and-set, message append plus conversation summary, bulk mark-read)
//! is a single trait method, so implementations can make it one statement or
//! one transaction.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::conversation::{Conversation, ParticipantPair};
use crate::models::match_request::{MatchRequest, MatchStatus};
use crate::models::message::Message;
use crate::models::notification::Notification;
use crate::models::user_profile::UserProfile;

pub use memory::InMemoryStore;
pub use pg::PgStore;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached (pool exhausted, connection refused).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Query failure reported by Postgres.
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A persisted row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        use diesel::result::{DatabaseErrorKind, Error};

        match self {
            Self::Unavailable(_) => true,
            Self::Database(Error::DatabaseError(kind, _)) => matches!(
                kind,
                DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::ClosedConnection
            ),
            Self::Database(Error::BrokenTransactionManager) => true,
            _ => false,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        use diesel::result::{DatabaseErrorKind, Error};

        matches!(
            self,
            Self::Database(Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
        )
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for StoreError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyset position for notification pages. Rows strictly older than
/// `created_at` follow it, as do rows with the same timestamp and a smaller id.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationCursor {
    pub created_at: DateTime<Utc>,
    pub id: Option<String>,
}

impl NotificationCursor {
    pub fn follows(&self, n: &Notification) -> bool {
        n.created_at < self.created_at
            || (n.created_at == self.created_at
                && self.id.as_deref().is_some_and(|id| n.id.as_str() < id))
    }
}

impl From<&Notification> for NotificationCursor {
    fn from(n: &Notification) -> Self {
        Self {
            created_at: n.created_at,
            id: Some(n.id.clone()),
        }
    }
}

/// Read-only projections over match records.
#[derive(Debug, Clone, Copy)]
pub enum MatchQuery<'a> {
    SentBy(&'a str, MatchStatus),
    ReceivedBy(&'a str, MatchStatus),
    Involving(&'a str, MatchStatus),
}

impl MatchQuery<'_> {
    pub fn matches(&self, m: &MatchRequest) -> bool {
        match *self {
            Self::SentBy(user, status) => m.requester_id == user && m.status == status,
            Self::ReceivedBy(user, status) => m.target_id == user && m.status == status,
            Self::Involving(user, status) => m.involves(user) && m.status == status,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // -- profiles ----------------------------------------------------------

    async fn upsert_profile(&self, user_id: &str, display_name: &str) -> StoreResult<UserProfile>;
    async fn get_profiles(&self, user_ids: &[String]) -> StoreResult<Vec<UserProfile>>;
    async fn touch_last_seen(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()>;

    // -- match requests ----------------------------------------------------

    /// Atomically create a `pending` record for the pair, or reopen a
    /// `rejected` one. Returns `None` if the pair is already engaged
    /// (`pending`, `accepted`, or `blocked`).
    async fn insert_match_if_absent(
        &self,
        id: &str,
        requester_id: &str,
        target_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<MatchRequest>>;

    async fn get_match(&self, id: &str) -> StoreResult<Option<MatchRequest>>;

    async fn get_match_for_pair(&self, a: &str, b: &str) -> StoreResult<Option<MatchRequest>>;

    /// Compare-and-set on status. Returns `None` if the record does not exist
    /// or is not currently in `from`.
    async fn transition_match(
        &self,
        id: &str,
        from: MatchStatus,
        to: MatchStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<MatchRequest>>;

    /// Move the pair's record to `blocked`, creating it if needed.
    async fn block_pair(
        &self,
        id: &str,
        actor_id: &str,
        other_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<MatchRequest>;

    async fn list_matches(&self, query: MatchQuery<'_>) -> StoreResult<Vec<MatchRequest>>;

    // -- conversations -----------------------------------------------------

    /// Look the pair up first; create with `id` only if absent.
    async fn find_or_create_conversation(
        &self,
        id: &str,
        pair: &ParticipantPair,
        now: DateTime<Utc>,
    ) -> StoreResult<Conversation>;

    async fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>>;

    /// Conversations involving the user, most recently updated first.
    async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<Conversation>>;

    // -- messages ----------------------------------------------------------

    /// Insert the message and update the conversation's last-message fields
    /// as one unit.
    async fn append_message(&self, message: &Message, summary: &str) -> StoreResult<Message>;

    /// Move every `sent` message addressed to `reader_id` to `read`.
    /// Returns the number of messages changed.
    async fn mark_messages_read(&self, conversation_id: &str, reader_id: &str) -> StoreResult<u64>;

    /// The full log in append order.
    async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>>;

    /// Used to confirm an append whose commit acknowledgement was lost.
    async fn get_message(&self, conversation_id: &str, message_id: i64) -> StoreResult<Option<Message>>;

    /// Tombstone a message authored by `sender_id`. Returns `None` if no such
    /// message exists for that sender.
    async fn tombstone_message(
        &self,
        conversation_id: &str,
        message_id: i64,
        sender_id: &str,
    ) -> StoreResult<Option<Message>>;

    // -- notifications -----------------------------------------------------

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<Notification>;

    /// Returns `None` if the notification does not exist for this recipient.
    async fn mark_notification_read(
        &self,
        id: &str,
        recipient_id: &str,
    ) -> StoreResult<Option<Notification>>;

    async fn mark_all_notifications_read(&self, recipient_id: &str) -> StoreResult<u64>;

    /// Newest first by `(created_at, id)`, after `before` when given.
    async fn list_notifications(
        &self,
        recipient_id: &str,
        before: Option<&NotificationCursor>,
        limit: i64,
    ) -> StoreResult<Vec<Notification>>;

    async fn count_unread_notifications(&self, recipient_id: &str) -> StoreResult<i64>;
}
