//! In-memory store for tests and database-less development.
//!
//! All tables live behind one `parking_lot::Mutex`, so every trait method is
//! atomic with respect to every other.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{MatchQuery, NotificationCursor, Store, StoreError, StoreResult};
use crate::models::conversation::{Conversation, ParticipantPair};
use crate::models::match_request::{pair_key, MatchRequest, MatchStatus};
use crate::models::message::{Message, MessageStatus};
use crate::models::notification::Notification;
use crate::models::user_profile::UserProfile;

#[derive(Default)]
struct Tables {
    profiles: HashMap<String, UserProfile>,
    matches: Vec<MatchRequest>,
    conversations: Vec<Conversation>,
    /// Append-only; insertion order is the log order.
    messages: Vec<Message>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_profile(&self, user_id: &str, display_name: &str) -> StoreResult<UserProfile> {
        let mut t = self.tables.lock();
        let profile = t
            .profiles
            .entry(user_id.to_string())
            .and_modify(|p| p.display_name = display_name.to_string())
            .or_insert_with(|| UserProfile {
                id: user_id.to_string(),
                display_name: display_name.to_string(),
                first_seen_at: Utc::now(),
                last_seen_at: None,
            });
        Ok(profile.clone())
    }

    async fn get_profiles(&self, user_ids: &[String]) -> StoreResult<Vec<UserProfile>> {
        let t = self.tables.lock();
        Ok(user_ids
            .iter()
            .filter_map(|id| t.profiles.get(id).cloned())
            .collect())
    }

    async fn touch_last_seen(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(p) = self.tables.lock().profiles.get_mut(user_id) {
            p.last_seen_at = Some(at);
        }
        Ok(())
    }

    async fn insert_match_if_absent(
        &self,
        id: &str,
        requester_id: &str,
        target_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<MatchRequest>> {
        let key = pair_key(requester_id, target_id);
        let mut t = self.tables.lock();

        if let Some(existing) = t.matches.iter_mut().find(|m| m.pair_key == key) {
            if existing.status.engages_pair() {
                return Ok(None);
            }
            existing.requester_id = requester_id.to_string();
            existing.target_id = target_id.to_string();
            existing.status = MatchStatus::Pending;
            existing.created_at = now;
            existing.updated_at = now;
            return Ok(Some(existing.clone()));
        }

        let record = MatchRequest {
            id: id.to_string(),
            requester_id: requester_id.to_string(),
            target_id: target_id.to_string(),
            pair_key: key,
            status: MatchStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        t.matches.push(record.clone());
        Ok(Some(record))
    }

    async fn get_match(&self, id: &str) -> StoreResult<Option<MatchRequest>> {
        Ok(self.tables.lock().matches.iter().find(|m| m.id == id).cloned())
    }

    async fn get_match_for_pair(&self, a: &str, b: &str) -> StoreResult<Option<MatchRequest>> {
        let key = pair_key(a, b);
        Ok(self
            .tables
            .lock()
            .matches
            .iter()
            .find(|m| m.pair_key == key)
            .cloned())
    }

    async fn transition_match(
        &self,
        id: &str,
        from: MatchStatus,
        to: MatchStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<MatchRequest>> {
        let mut t = self.tables.lock();
        Ok(t
            .matches
            .iter_mut()
            .find(|m| m.id == id && m.status == from)
            .map(|m| {
                m.status = to;
                m.updated_at = now;
                m.clone()
            }))
    }

    async fn block_pair(
        &self,
        id: &str,
        actor_id: &str,
        other_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<MatchRequest> {
        let key = pair_key(actor_id, other_id);
        let mut t = self.tables.lock();

        if let Some(existing) = t.matches.iter_mut().find(|m| m.pair_key == key) {
            if existing.status != MatchStatus::Blocked {
                existing.status = MatchStatus::Blocked;
                existing.updated_at = now;
            }
            return Ok(existing.clone());
        }

        let record = MatchRequest {
            id: id.to_string(),
            requester_id: actor_id.to_string(),
            target_id: other_id.to_string(),
            pair_key: key,
            status: MatchStatus::Blocked,
            created_at: now,
            updated_at: now,
        };
        t.matches.push(record.clone());
        Ok(record)
    }

    async fn list_matches(&self, query: MatchQuery<'_>) -> StoreResult<Vec<MatchRequest>> {
        let t = self.tables.lock();
        let mut out: Vec<MatchRequest> =
            t.matches.iter().filter(|m| query.matches(m)).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn find_or_create_conversation(
        &self,
        id: &str,
        pair: &ParticipantPair,
        now: DateTime<Utc>,
    ) -> StoreResult<Conversation> {
        let mut t = self.tables.lock();
        if let Some(existing) = t
            .conversations
            .iter()
            .find(|c| c.participant_a == pair.low() && c.participant_b == pair.high())
        {
            return Ok(existing.clone());
        }

        let conversation = Conversation {
            id: id.to_string(),
            participant_a: pair.low().to_string(),
            participant_b: pair.high().to_string(),
            last_message: None,
            last_sender_id: None,
            created_at: now,
            updated_at: now,
        };
        t.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        Ok(self
            .tables
            .lock()
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        let t = self.tables.lock();
        let mut out: Vec<Conversation> = t
            .conversations
            .iter()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    async fn append_message(&self, message: &Message, summary: &str) -> StoreResult<Message> {
        let mut t = self.tables.lock();
        if t.messages.iter().any(|m| m.id == message.id) {
            return Err(StoreError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                Box::new(String::from("duplicate message id")),
            )));
        }

        let conversation = t
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
            .ok_or(diesel::result::Error::NotFound)?;

        conversation.last_message = Some(summary.to_string());
        conversation.last_sender_id = Some(message.sender_id.clone());
        conversation.updated_at = message.sent_at;
        t.messages.push(message.clone());
        Ok(message.clone())
    }

    async fn mark_messages_read(&self, conversation_id: &str, reader_id: &str) -> StoreResult<u64> {
        let mut t = self.tables.lock();
        let mut changed = 0;
        for m in t.messages.iter_mut().filter(|m| {
            m.conversation_id == conversation_id
                && m.receiver_id == reader_id
                && m.status == MessageStatus::Sent
        }) {
            m.status = MessageStatus::Read;
            changed += 1;
        }
        Ok(changed)
    }

    async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        Ok(self
            .tables
            .lock()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn get_message(&self, conversation_id: &str, message_id: i64) -> StoreResult<Option<Message>> {
        Ok(self
            .tables
            .lock()
            .messages
            .iter()
            .find(|m| m.conversation_id == conversation_id && m.id == message_id)
            .cloned())
    }

    async fn tombstone_message(
        &self,
        conversation_id: &str,
        message_id: i64,
        sender_id: &str,
    ) -> StoreResult<Option<Message>> {
        let mut t = self.tables.lock();
        Ok(t
            .messages
            .iter_mut()
            .find(|m| {
                m.conversation_id == conversation_id
                    && m.id == message_id
                    && m.sender_id == sender_id
            })
            .map(|m| {
                if m.status.can_advance_to(MessageStatus::Deleted) {
                    m.status = MessageStatus::Deleted;
                }
                m.clone()
            }))
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<Notification> {
        self.tables.lock().notifications.push(notification.clone());
        Ok(notification.clone())
    }

    async fn mark_notification_read(
        &self,
        id: &str,
        recipient_id: &str,
    ) -> StoreResult<Option<Notification>> {
        let mut t = self.tables.lock();
        Ok(t
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }

    async fn mark_all_notifications_read(&self, recipient_id: &str) -> StoreResult<u64> {
        let mut t = self.tables.lock();
        let mut changed = 0;
        for n in t
            .notifications
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn list_notifications(
        &self,
        recipient_id: &str,
        before: Option<&NotificationCursor>,
        limit: i64,
    ) -> StoreResult<Vec<Notification>> {
        let t = self.tables.lock();
        let mut out: Vec<Notification> = t
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| before.map_or(true, |cursor| cursor.follows(n)))
            .cloned()
            .collect();
        out.sort_by(|a, b| (&b.created_at, &b.id).cmp(&(&a.created_at, &a.id)));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn count_unread_notifications(&self, recipient_id: &str) -> StoreResult<i64> {
        let t = self.tables.lock();
        Ok(t
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejected_pair_reopens_in_place() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let first = store
            .insert_match_if_absent("mtc_1", "usr_a", "usr_c", now)
            .await
            .unwrap()
            .unwrap();
        store
            .transition_match(&first.id, MatchStatus::Pending, MatchStatus::Rejected, now)
            .await
            .unwrap()
            .unwrap();

        let reopened = store
            .insert_match_if_absent("mtc_2", "usr_c", "usr_a", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reopened.id, "mtc_1");
        assert_eq!(reopened.requester_id, "usr_c");
        assert_eq!(reopened.status, MatchStatus::Pending);
        assert_eq!(store.tables.lock().matches.len(), 1);
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let m = store
            .insert_match_if_absent("mtc_1", "usr_a", "usr_b", now)
            .await
            .unwrap()
            .unwrap();

        let won = store
            .transition_match(&m.id, MatchStatus::Pending, MatchStatus::Accepted, now)
            .await
            .unwrap();
        let lost = store
            .transition_match(&m.id, MatchStatus::Pending, MatchStatus::Rejected, now)
            .await
            .unwrap();
        assert_eq!(won.unwrap().status, MatchStatus::Accepted);
        assert!(lost.is_none());
    }

    #[tokio::test]
    async fn append_to_missing_conversation_fails_without_side_effects() {
        let store = InMemoryStore::new();
        let message = Message {
            id: 1,
            conversation_id: "cnv_missing".into(),
            sender_id: "usr_a".into(),
            receiver_id: "usr_b".into(),
            body: Some("hi".into()),
            attachment_url: None,
            media_kind: crate::models::message::MediaKind::Text,
            status: MessageStatus::Sent,
            sent_at: Utc::now(),
        };
        assert!(store.append_message(&message, "hi").await.is_err());
        assert!(store.tables.lock().messages.is_empty());
    }

    #[tokio::test]
    async fn duplicate_message_id_is_a_unique_violation() {
        let store = InMemoryStore::new();
        let pair = ParticipantPair::new("usr_a", "usr_b").unwrap();
        let conversation = store
            .find_or_create_conversation("cnv_1", &pair, Utc::now())
            .await
            .unwrap();
        let message = Message {
            id: 7,
            conversation_id: conversation.id.clone(),
            sender_id: "usr_a".into(),
            receiver_id: "usr_b".into(),
            body: Some("hi".into()),
            attachment_url: None,
            media_kind: crate::models::message::MediaKind::Text,
            status: MessageStatus::Sent,
            sent_at: Utc::now(),
        };

        store.append_message(&message, "hi").await.unwrap();
        let again = store.append_message(&message, "hi").await.unwrap_err();
        assert!(again.is_unique_violation());
        assert!(!again.is_transient());
        assert_eq!(store.tables.lock().messages.len(), 1);
    }

    fn notification(id: &str, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id: id.into(),
            recipient_id: "usr_a".into(),
            sender_id: "usr_b".into(),
            kind: crate::models::notification::NotificationKind::Other,
            text: id.into(),
            conversation_id: None,
            read: false,
            created_at,
        }
    }

    #[tokio::test]
    async fn notifications_page_newest_first() {
        let store = InMemoryStore::new();
        let base = Utc::now();
        for i in 0..5 {
            store
                .insert_notification(&notification(&format!("ntf_{i}"), base + chrono::Duration::seconds(i)))
                .await
                .unwrap();
        }

        let page = store.list_notifications("usr_a", None, 2).await.unwrap();
        assert_eq!(page.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), ["ntf_4", "ntf_3"]);

        let cursor = NotificationCursor::from(&page[1]);
        let next = store.list_notifications("usr_a", Some(&cursor), 10).await.unwrap();
        assert_eq!(
            next.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            ["ntf_2", "ntf_1", "ntf_0"]
        );
    }

    #[tokio::test]
    async fn equal_timestamps_split_across_pages_by_id() {
        let store = InMemoryStore::new();
        let at = Utc::now();
        for id in ["ntf_a", "ntf_b", "ntf_c"] {
            store.insert_notification(&notification(id, at)).await.unwrap();
        }

        let page = store.list_notifications("usr_a", None, 2).await.unwrap();
        assert_eq!(page.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), ["ntf_c", "ntf_b"]);

        let cursor = NotificationCursor::from(&page[1]);
        let next = store.list_notifications("usr_a", Some(&cursor), 2).await.unwrap();
        assert_eq!(next.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), ["ntf_a"]);

        let time_only = NotificationCursor { created_at: at, id: None };
        assert!(store
            .list_notifications("usr_a", Some(&time_only), 10)
            .await
            .unwrap()
            .is_empty());
    }
}
