use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use nikah_common::id::{prefix, PrefixedId};

use crate::db::schema::notifications;
use crate::models::text_enum;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, diesel::AsExpression,
    diesel::FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    MatchRequest,
    Other,
}

text_enum!(NotificationKind, "notification kind", [
    Message => "message",
    MatchRequest => "match_request",
    Other => "other",
]);

/// A durable notification. Only the `read` flag ever changes.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, ToSchema)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub kind: NotificationKind,
    pub text: String,
    pub conversation_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl PrefixedId for Notification {
    const PREFIX: &'static str = prefix::NOTIFICATION;
}
