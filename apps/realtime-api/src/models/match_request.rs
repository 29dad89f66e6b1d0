use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use nikah_common::id::{prefix, PrefixedId};

use crate::db::schema::match_requests;
use crate::models::text_enum;

/// Lifecycle state of a match request.
///
/// `pending → accepted | rejected`. `blocked` is set administratively and is
/// absorbing. A `rejected` pair may be re-requested, which resets the same
/// record to `pending`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, diesel::AsExpression,
    diesel::FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

text_enum!(MatchStatus, "match status", [
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    Blocked => "blocked",
]);

impl MatchStatus {
    /// Whether a record in this state prevents a new request between the pair.
    pub fn engages_pair(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// The target's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    Accept,
    Reject,
}

impl MatchDecision {
    pub fn target_status(&self) -> MatchStatus {
        match self {
            Self::Accept => MatchStatus::Accepted,
            Self::Reject => MatchStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, QueryableByName, Serialize, ToSchema)]
#[diesel(table_name = match_requests)]
pub struct MatchRequest {
    pub id: String,
    pub requester_id: String,
    pub target_id: String,
    #[serde(skip)]
    pub pair_key: String,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrefixedId for MatchRequest {
    const PREFIX: &'static str = prefix::MATCH;
}

impl MatchRequest {
    pub fn involves(&self, user_id: &str) -> bool {
        self.requester_id == user_id || self.target_id == user_id
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = match_requests)]
pub struct NewMatchRequest<'a> {
    pub id: &'a str,
    pub requester_id: &'a str,
    pub target_id: &'a str,
    pub pair_key: &'a str,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order-independent key for a pair of users: `"<smaller>|<larger>"`.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}|{b}")
    } else {
        format!("{b}|{a}")
    }
}
