use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::messages;
use crate::models::{serialize_i64_as_string, text_enum};

/// Maximum message text length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

const MAX_ATTACHMENT_URL_LEN: usize = 2048;

/// Delivery state of a message. Only moves forward: `sent → read`, and any
/// state may become the `deleted` tombstone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
    diesel::AsExpression, diesel::FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Read,
    Deleted,
}

text_enum!(MessageStatus, "message status", [
    Sent => "sent",
    Read => "read",
    Deleted => "deleted",
]);

impl MessageStatus {
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        next > *self
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema,
    diesel::AsExpression, diesel::FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    File,
}

text_enum!(MediaKind, "media kind", [
    Text => "text",
    Image => "image",
    Video => "video",
    Audio => "audio",
    File => "file",
]);

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = messages)]
pub struct Message {
    #[serde(serialize_with = "serialize_i64_as_string")]
    #[schema(value_type = String)]
    pub id: i64,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: Option<String>,
    pub attachment_url: Option<String>,
    pub media_kind: MediaKind,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage<'a> {
    pub id: i64,
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub body: Option<&'a str>,
    pub attachment_url: Option<&'a str>,
    pub media_kind: MediaKind,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
}

impl<'a> From<&'a Message> for NewMessage<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            id: m.id,
            conversation_id: &m.conversation_id,
            sender_id: &m.sender_id,
            receiver_id: &m.receiver_id,
            body: m.body.as_deref(),
            attachment_url: m.attachment_url.as_deref(),
            media_kind: m.media_kind,
            status: m.status,
            sent_at: m.sent_at,
        }
    }
}

/// Client-supplied message content: text, or an attachment with an optional caption.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MessageBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub media_kind: MediaKind,
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// A body that passed validation, plus the summary stored on the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBody {
    pub text: Option<String>,
    pub attachment_url: Option<String>,
    pub media_kind: MediaKind,
    pub summary: String,
}

impl MessageBody {
    pub fn validate(self) -> Result<ValidatedBody, String> {
        let text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if text.as_ref().is_some_and(|t| t.chars().count() > MAX_MESSAGE_CHARS) {
            return Err(format!(
                "Message text must be {MAX_MESSAGE_CHARS} characters or fewer"
            ));
        }

        let attachment_url = self
            .attachment_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        match (self.media_kind, attachment_url) {
            (MediaKind::Text, Some(_)) => {
                Err("Attachments require a non-text media_kind".to_string())
            }
            (MediaKind::Text, None) => {
                let text = text.ok_or_else(|| "Message text is required".to_string())?;
                Ok(ValidatedBody {
                    summary: text.clone(),
                    text: Some(text),
                    attachment_url: None,
                    media_kind: MediaKind::Text,
                })
            }
            (kind, Some(url)) => {
                if url.len() > MAX_ATTACHMENT_URL_LEN {
                    return Err("Attachment URL is too long".to_string());
                }
                Ok(ValidatedBody {
                    summary: format!("[{kind}]"),
                    text,
                    attachment_url: Some(url),
                    media_kind: kind,
                })
            }
            (kind, None) => Err(format!("A {kind} message requires an attachment_url")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Read));
        assert!(MessageStatus::Read.can_advance_to(MessageStatus::Deleted));
        assert!(!MessageStatus::Read.can_advance_to(MessageStatus::Sent));
        assert!(!MessageStatus::Deleted.can_advance_to(MessageStatus::Read));
        assert!(!MessageStatus::Sent.can_advance_to(MessageStatus::Sent));
    }

    #[test]
    fn text_body_is_trimmed_and_summarized() {
        let v = MessageBody::text("  Salaam  ").validate().unwrap();
        assert_eq!(v.text.as_deref(), Some("Salaam"));
        assert_eq!(v.summary, "Salaam");
        assert_eq!(v.media_kind, MediaKind::Text);
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(MessageBody::text("   ").validate().is_err());
        assert!(MessageBody::default().validate().is_err());
    }

    #[test]
    fn overlong_text_is_rejected() {
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(MessageBody::text(long).validate().is_err());
        let exact = "x".repeat(MAX_MESSAGE_CHARS);
        assert!(MessageBody::text(exact).validate().is_ok());
    }

    #[test]
    fn attachment_summary_names_the_media_kind() {
        let body = MessageBody {
            text: None,
            attachment_url: Some("https://cdn.example/p.jpg".into()),
            media_kind: MediaKind::Image,
        };
        let v = body.validate().unwrap();
        assert_eq!(v.summary, "[image]");
        assert!(v.text.is_none());
    }

    #[test]
    fn attachment_kind_mismatch_is_rejected() {
        let text_with_url = MessageBody {
            text: Some("hi".into()),
            attachment_url: Some("https://cdn.example/p.jpg".into()),
            media_kind: MediaKind::Text,
        };
        assert!(text_with_url.validate().is_err());

        let image_without_url = MessageBody {
            text: Some("caption".into()),
            attachment_url: None,
            media_kind: MediaKind::Image,
        };
        assert!(image_without_url.validate().is_err());
    }
}
