use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use nikah_common::id::{prefix, PrefixedId};

use crate::db::schema::conversations;

/// A one-to-one conversation. Participants are stored normalized so that
/// `participant_a < participant_b`; the pair is unique.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub last_message: Option<String>,
    pub last_sender_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrefixedId for Conversation {
    const PREFIX: &'static str = prefix::CONVERSATION;
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// The other participant, or `None` if `user_id` is not in the conversation.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.participant_a == user_id {
            Some(&self.participant_b)
        } else if self.participant_b == user_id {
            Some(&self.participant_a)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [&str; 2] {
        [&self.participant_a, &self.participant_b]
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation<'a> {
    pub id: &'a str,
    pub participant_a: &'a str,
    pub participant_b: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An unordered pair of distinct users, normalized for lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: String,
    high: String,
}

impl ParticipantPair {
    /// Returns `None` when both sides are the same user.
    pub fn new(a: &str, b: &str) -> Option<Self> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Some(Self {
                low: a.to_string(),
                high: b.to_string(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                low: b.to_string(),
                high: a.to_string(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }
}
