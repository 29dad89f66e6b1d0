//! Conversation lookup and the per-conversation message log.
//!
//! Appends and read-marks for one conversation are serialized by a
//! per-conversation async lock that is held until the resulting event has been
//! handed to the broadcast hub, so live subscribers observe messages in append
//! order and never see `MESSAGES_READ` ahead of the write it reports.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use nikah_common::{snowflake, PrefixedId, SnowflakeGenerator};
use tokio::sync::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::gateway::events::ServerEvent;
use crate::gateway::fanout::{Audience, GatewayBroadcast};
use crate::models::conversation::{Conversation, ParticipantPair};
use crate::models::match_request::MatchStatus;
use crate::models::message::{Message, MessageBody, MessageStatus};
use crate::store::Store;

use super::{Actor, RetryPolicy};

pub struct ConversationLog {
    store: Arc<dyn Store>,
    snowflake: SnowflakeGenerator,
    retry: RetryPolicy,
    broadcast: GatewayBroadcast,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConversationLog {
    pub fn new(
        store: Arc<dyn Store>,
        snowflake: SnowflakeGenerator,
        retry: RetryPolicy,
        broadcast: GatewayBroadcast,
    ) -> Self {
        Self {
            store,
            snowflake,
            retry,
            broadcast,
            locks: DashMap::new(),
        }
    }

    /// Idempotent: the pair is looked up before anything is created.
    pub async fn find_or_create(&self, user_a: &str, user_b: &str) -> CoreResult<Conversation> {
        let pair = ParticipantPair::new(user_a, user_b)
            .ok_or_else(|| CoreError::Validation("Cannot start a conversation with yourself".into()))?;

        let conversation = self
            .store
            .find_or_create_conversation(&Conversation::generate_id(), &pair, Utc::now())
            .await?;

        tracing::debug!(conversation_id = %conversation.id, "conversation resolved");
        Ok(conversation)
    }

    /// Find or create a conversation with a mutually accepted match partner.
    pub async fn open_with(&self, user_id: &str, other_id: &str) -> CoreResult<Conversation> {
        self.require_accepted_match(user_id, other_id).await?;
        self.find_or_create(user_id, other_id).await
    }

    /// A conversation stays usable only while its pair's match is accepted;
    /// blocking closes it to both sides.
    async fn require_accepted_match(&self, user_id: &str, other_id: &str) -> CoreResult<()> {
        let accepted = self
            .store
            .get_match_for_pair(user_id, other_id)
            .await?
            .is_some_and(|m| m.status == MatchStatus::Accepted);
        if !accepted {
            return Err(CoreError::Unauthorized(
                "Conversations require an accepted match".into(),
            ));
        }
        Ok(())
    }

    /// Load a conversation the user takes part in.
    pub async fn get_for_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> CoreResult<Conversation> {
        if !Conversation::is_valid_id(conversation_id) {
            return Err(CoreError::ConversationNotFound);
        }

        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(CoreError::ConversationNotFound)?;
        let Some(counterpart) = conversation.counterpart(user_id) else {
            return Err(CoreError::Unauthorized(
                "Not a participant in this conversation".into(),
            ));
        };
        self.require_accepted_match(user_id, counterpart).await?;
        Ok(conversation)
    }

    pub async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<Conversation>> {
        Ok(self.store.list_conversations(user_id).await?)
    }

    /// Append a message and fan it out to the conversation's live subscribers.
    ///
    /// `receiver_id` defaults to the sender's counterpart; naming anyone else
    /// is rejected.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        sender: Actor<'_>,
        receiver_id: Option<&str>,
        body: MessageBody,
    ) -> CoreResult<Message> {
        let body = body.validate().map_err(CoreError::Validation)?;
        if !Conversation::is_valid_id(conversation_id) {
            return Err(CoreError::ConversationNotFound);
        }

        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(CoreError::ConversationNotFound)?;
        let counterpart = conversation
            .counterpart(sender.user_id)
            .ok_or(CoreError::ConversationNotFound)?;
        if receiver_id.is_some_and(|r| r != counterpart) {
            return Err(CoreError::Unauthorized(
                "Receiver is not the other participant".into(),
            ));
        }
        self.require_accepted_match(sender.user_id, counterpart).await?;

        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let id = self.snowflake.generate();
        let message = Message {
            id,
            conversation_id: conversation_id.to_string(),
            sender_id: sender.user_id.to_string(),
            receiver_id: counterpart.to_string(),
            body: body.text,
            attachment_url: body.attachment_url,
            media_kind: body.media_kind,
            status: MessageStatus::Sent,
            sent_at: snowflake::snowflake_datetime(id),
        };

        let stored = match self
            .retry
            .run("append_message", || {
                self.store.append_message(&message, &body.summary)
            })
            .await
        {
            Ok(stored) => stored,
            // An earlier attempt committed but its acknowledgement was lost.
            Err(e) if e.is_unique_violation() => {
                let committed = self.store.get_message(conversation_id, id).await?;
                match committed {
                    Some(m) if m.sender_id == message.sender_id => m,
                    _ => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };

        self.broadcast.dispatch(
            Audience::Conversation(conversation_id.to_string()),
            ServerEvent::MessageCreate {
                message: stored.clone(),
                sender_display_name: sender.display_name.to_string(),
            },
        );

        tracing::info!(
            conversation_id,
            user_id = %sender.user_id,
            message_id = stored.id,
            "message appended"
        );

        Ok(stored)
    }

    /// Mark everything addressed to `reader_id` as read. Emits one
    /// `MESSAGES_READ` event, and only if something changed.
    pub async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> CoreResult<u64> {
        self.get_for_participant(conversation_id, reader_id).await?;

        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let changed = self
            .store
            .mark_messages_read(conversation_id, reader_id)
            .await?;

        if changed > 0 {
            self.broadcast.dispatch(
                Audience::Conversation(conversation_id.to_string()),
                ServerEvent::MessagesRead {
                    conversation_id: conversation_id.to_string(),
                    reader_id: reader_id.to_string(),
                },
            );
            tracing::debug!(conversation_id, user_id = %reader_id, changed, "messages read");
        }

        Ok(changed)
    }

    /// The full log in append order.
    pub async fn list_messages(&self, conversation_id: &str, user_id: &str) -> CoreResult<Vec<Message>> {
        self.get_for_participant(conversation_id, user_id).await?;
        Ok(self.store.list_messages(conversation_id).await?)
    }

    /// The sender replaces their own message with a `deleted` tombstone.
    pub async fn tombstone(
        &self,
        conversation_id: &str,
        message_id: i64,
        user_id: &str,
    ) -> CoreResult<Message> {
        self.get_for_participant(conversation_id, user_id).await?;
        self.store
            .tombstone_message(conversation_id, message_id, user_id)
            .await?
            .ok_or(CoreError::NotFound("message"))
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop locks nobody is holding or waiting on.
    pub fn prune_locks(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }
}
