//! Durable notifications with live push to online recipients.

use std::sync::Arc;

use chrono::Utc;
use nikah_common::PrefixedId;

use crate::error::{CoreError, CoreResult};
use crate::gateway::events::ServerEvent;
use crate::gateway::fanout::{Audience, GatewayBroadcast};
use crate::gateway::presence::PresenceRegistry;
use crate::models::notification::{Notification, NotificationKind};
use crate::store::{NotificationCursor, Store};

use super::RetryPolicy;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

pub struct NotificationFanout {
    store: Arc<dyn Store>,
    presence: Arc<PresenceRegistry>,
    broadcast: GatewayBroadcast,
    retry: RetryPolicy,
}

impl NotificationFanout {
    pub fn new(
        store: Arc<dyn Store>,
        presence: Arc<PresenceRegistry>,
        broadcast: GatewayBroadcast,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            presence,
            broadcast,
            retry,
        }
    }

    /// Persist a notification, then push it to the recipient's live sessions
    /// if they are online. Offline recipients pick it up by listing.
    pub async fn notify(
        &self,
        recipient_id: &str,
        sender_id: &str,
        kind: NotificationKind,
        text: String,
        conversation_id: Option<&str>,
    ) -> CoreResult<Notification> {
        let record = Notification {
            id: Notification::generate_id(),
            recipient_id: recipient_id.to_string(),
            sender_id: sender_id.to_string(),
            kind,
            text,
            conversation_id: conversation_id.map(str::to_string),
            read: false,
            created_at: Utc::now(),
        };

        let stored = self
            .retry
            .run("insert_notification", || self.store.insert_notification(&record))
            .await?;

        if self.presence.is_online(recipient_id) {
            self.broadcast.dispatch(
                Audience::User(recipient_id.to_string()),
                ServerEvent::NotificationCreate {
                    notification: stored.clone(),
                },
            );
        }

        tracing::debug!(
            notification_id = %stored.id,
            user_id = %recipient_id,
            kind = %stored.kind,
            "notification created"
        );

        Ok(stored)
    }

    /// Idempotent: marking an already-read notification is a no-op.
    pub async fn mark_read(&self, id: &str, recipient_id: &str) -> CoreResult<Notification> {
        if !Notification::is_valid_id(id) {
            return Err(CoreError::NotFound("notification"));
        }
        self.store
            .mark_notification_read(id, recipient_id)
            .await?
            .ok_or(CoreError::NotFound("notification"))
    }

    pub async fn mark_all_read(&self, recipient_id: &str) -> CoreResult<u64> {
        Ok(self.store.mark_all_notifications_read(recipient_id).await?)
    }

    /// Newest first. `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn list(
        &self,
        recipient_id: &str,
        before: Option<&NotificationCursor>,
        limit: Option<i64>,
    ) -> CoreResult<Vec<Notification>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Ok(self
            .store
            .list_notifications(recipient_id, before, limit)
            .await?)
    }

    pub async fn unread_count(&self, recipient_id: &str) -> CoreResult<i64> {
        Ok(self.store.count_unread_notifications(recipient_id).await?)
    }
}
