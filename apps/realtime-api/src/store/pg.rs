//! PostgreSQL store backed by `diesel-async` and a deadpool connection pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel::sql_types::{Text, Timestamptz};
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;

use super::{MatchQuery, NotificationCursor, Store, StoreError, StoreResult};
use crate::db::pool::DbPool;
use crate::db::schema::{conversations, match_requests, messages, notifications, user_profiles};
use crate::models::conversation::{Conversation, NewConversation, ParticipantPair};
use crate::models::match_request::{pair_key, MatchRequest, MatchStatus};
use crate::models::message::{Message, MessageStatus, NewMessage};
use crate::models::notification::Notification;
use crate::models::user_profile::{NewUserProfile, UserProfile};

/// Creates a pending record, or reopens a rejected one, in one statement.
/// Rows in any other state are left alone and nothing is returned.
const INSERT_MATCH_IF_ABSENT: &str = "\
    INSERT INTO match_requests (id, requester_id, target_id, pair_key, status, created_at, updated_at) \
    VALUES ($1, $2, $3, $4, 'pending', $5, $5) \
    ON CONFLICT (pair_key) DO UPDATE \
        SET requester_id = EXCLUDED.requester_id, \
            target_id = EXCLUDED.target_id, \
            status = 'pending', \
            created_at = EXCLUDED.created_at, \
            updated_at = EXCLUDED.updated_at \
        WHERE match_requests.status = 'rejected' \
    RETURNING id, requester_id, target_id, pair_key, status, created_at, updated_at";

const BLOCK_PAIR: &str = "\
    INSERT INTO match_requests (id, requester_id, target_id, pair_key, status, created_at, updated_at) \
    VALUES ($1, $2, $3, $4, 'blocked', $5, $5) \
    ON CONFLICT (pair_key) DO UPDATE \
        SET status = 'blocked', \
            updated_at = CASE WHEN match_requests.status = 'blocked' \
                THEN match_requests.updated_at ELSE EXCLUDED.updated_at END \
    RETURNING id, requester_id, target_id, pair_key, status, created_at, updated_at";

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_profile(&self, user_id: &str, display_name: &str) -> StoreResult<UserProfile> {
        let mut conn = self.pool.get().await?;

        let query = diesel::insert_into(user_profiles::table)
            .values(NewUserProfile {
                id: user_id,
                display_name,
                first_seen_at: Utc::now(),
            })
            .on_conflict(user_profiles::id)
            .do_update()
            .set(user_profiles::display_name.eq(display_name))
            .returning(UserProfile::as_returning());

        Ok(diesel_async::RunQueryDsl::get_result(query, &mut conn).await?)
    }

    async fn get_profiles(&self, user_ids: &[String]) -> StoreResult<Vec<UserProfile>> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::load(
            user_profiles::table
                .filter(user_profiles::id.eq_any(user_ids))
                .select(UserProfile::as_select()),
            &mut conn,
        )
        .await?)
    }

    async fn touch_last_seen(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;

        diesel_async::RunQueryDsl::execute(
            diesel::update(user_profiles::table.find(user_id))
                .set(user_profiles::last_seen_at.eq(Some(at))),
            &mut conn,
        )
        .await?;
        Ok(())
    }

    async fn insert_match_if_absent(
        &self,
        id: &str,
        requester_id: &str,
        target_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<MatchRequest>> {
        let mut conn = self.pool.get().await?;
        let key = pair_key(requester_id, target_id);

        let rows: Vec<MatchRequest> = diesel_async::RunQueryDsl::load(
            diesel::sql_query(INSERT_MATCH_IF_ABSENT)
                .bind::<Text, _>(id)
                .bind::<Text, _>(requester_id)
                .bind::<Text, _>(target_id)
                .bind::<Text, _>(&key)
                .bind::<Timestamptz, _>(now),
            &mut conn,
        )
        .await?;

        Ok(rows.into_iter().next())
    }

    async fn get_match(&self, id: &str) -> StoreResult<Option<MatchRequest>> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::get_result(
            match_requests::table
                .find(id)
                .select(MatchRequest::as_select()),
            &mut conn,
        )
        .await
        .optional()?)
    }

    async fn get_match_for_pair(&self, a: &str, b: &str) -> StoreResult<Option<MatchRequest>> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::get_result(
            match_requests::table
                .filter(match_requests::pair_key.eq(pair_key(a, b)))
                .select(MatchRequest::as_select()),
            &mut conn,
        )
        .await
        .optional()?)
    }

    async fn transition_match(
        &self,
        id: &str,
        from: MatchStatus,
        to: MatchStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<MatchRequest>> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::get_result(
            diesel::update(
                match_requests::table
                    .filter(match_requests::id.eq(id))
                    .filter(match_requests::status.eq(from)),
            )
            .set((
                match_requests::status.eq(to),
                match_requests::updated_at.eq(now),
            ))
            .returning(MatchRequest::as_returning()),
            &mut conn,
        )
        .await
        .optional()?)
    }

    async fn block_pair(
        &self,
        id: &str,
        actor_id: &str,
        other_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<MatchRequest> {
        let mut conn = self.pool.get().await?;
        let key = pair_key(actor_id, other_id);

        Ok(diesel_async::RunQueryDsl::get_result(
            diesel::sql_query(BLOCK_PAIR)
                .bind::<Text, _>(id)
                .bind::<Text, _>(actor_id)
                .bind::<Text, _>(other_id)
                .bind::<Text, _>(&key)
                .bind::<Timestamptz, _>(now),
            &mut conn,
        )
        .await?)
    }

    async fn list_matches(&self, query: MatchQuery<'_>) -> StoreResult<Vec<MatchRequest>> {
        let mut conn = self.pool.get().await?;

        let base: match_requests::BoxedQuery<'_, Pg> = match_requests::table.into_boxed();
        let filtered = match query {
            MatchQuery::SentBy(user, status) => base
                .filter(match_requests::requester_id.eq(user))
                .filter(match_requests::status.eq(status)),
            MatchQuery::ReceivedBy(user, status) => base
                .filter(match_requests::target_id.eq(user))
                .filter(match_requests::status.eq(status)),
            MatchQuery::Involving(user, status) => base
                .filter(
                    match_requests::requester_id
                        .eq(user)
                        .or(match_requests::target_id.eq(user)),
                )
                .filter(match_requests::status.eq(status)),
        };

        Ok(diesel_async::RunQueryDsl::load(
            filtered
                .order(match_requests::created_at.desc())
                .select(MatchRequest::as_select()),
            &mut conn,
        )
        .await?)
    }

    async fn find_or_create_conversation(
        &self,
        id: &str,
        pair: &ParticipantPair,
        now: DateTime<Utc>,
    ) -> StoreResult<Conversation> {
        let mut conn = self.pool.get().await?;

        let lookup = conversations::table
            .filter(conversations::participant_a.eq(pair.low()))
            .filter(conversations::participant_b.eq(pair.high()))
            .select(Conversation::as_select());

        let existing: Option<Conversation> =
            diesel_async::RunQueryDsl::get_result(lookup.clone(), &mut conn)
                .await
                .optional()?;
        if let Some(existing) = existing {
            return Ok(existing);
        }

        // A concurrent creator may win; the unique pair index turns our insert
        // into a no-op and the second lookup returns their row.
        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(conversations::table)
                .values(NewConversation {
                    id,
                    participant_a: pair.low(),
                    participant_b: pair.high(),
                    created_at: now,
                    updated_at: now,
                })
                .on_conflict((conversations::participant_a, conversations::participant_b))
                .do_nothing(),
            &mut conn,
        )
        .await?;

        Ok(diesel_async::RunQueryDsl::get_result(lookup, &mut conn).await?)
    }

    async fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::get_result(
            conversations::table
                .find(id)
                .select(Conversation::as_select()),
            &mut conn,
        )
        .await
        .optional()?)
    }

    async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::load(
            conversations::table
                .filter(
                    conversations::participant_a
                        .eq(user_id)
                        .or(conversations::participant_b.eq(user_id)),
                )
                .order(conversations::updated_at.desc())
                .select(Conversation::as_select()),
            &mut conn,
        )
        .await?)
    }

    async fn append_message(&self, message: &Message, summary: &str) -> StoreResult<Message> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let inserted: Message = diesel_async::RunQueryDsl::get_result(
                    diesel::insert_into(messages::table)
                        .values(NewMessage::from(message))
                        .returning(Message::as_returning()),
                    conn,
                )
                .await?;

                let updated = diesel_async::RunQueryDsl::execute(
                    diesel::update(conversations::table.find(&inserted.conversation_id)).set((
                        conversations::last_message.eq(Some(summary)),
                        conversations::last_sender_id.eq(Some(inserted.sender_id.as_str())),
                        conversations::updated_at.eq(inserted.sent_at),
                    )),
                    conn,
                )
                .await?;

                if updated == 0 {
                    return Err(StoreError::Database(diesel::result::Error::NotFound));
                }

                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
    }

    async fn mark_messages_read(&self, conversation_id: &str, reader_id: &str) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;

        let changed = diesel_async::RunQueryDsl::execute(
            diesel::update(
                messages::table
                    .filter(messages::conversation_id.eq(conversation_id))
                    .filter(messages::receiver_id.eq(reader_id))
                    .filter(messages::status.eq(MessageStatus::Sent)),
            )
            .set(messages::status.eq(MessageStatus::Read)),
            &mut conn,
        )
        .await?;

        Ok(changed as u64)
    }

    async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::load(
            messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .order(messages::id.asc())
                .select(Message::as_select()),
            &mut conn,
        )
        .await?)
    }

    async fn get_message(&self, conversation_id: &str, message_id: i64) -> StoreResult<Option<Message>> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::get_result(
            messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .filter(messages::id.eq(message_id))
                .select(Message::as_select()),
            &mut conn,
        )
        .await
        .optional()?)
    }

    async fn tombstone_message(
        &self,
        conversation_id: &str,
        message_id: i64,
        sender_id: &str,
    ) -> StoreResult<Option<Message>> {
        let mut conn = self.pool.get().await?;

        let updated: Option<Message> = diesel_async::RunQueryDsl::get_result(
            diesel::update(
                messages::table
                    .filter(messages::conversation_id.eq(conversation_id))
                    .filter(messages::id.eq(message_id))
                    .filter(messages::sender_id.eq(sender_id))
                    .filter(messages::status.ne(MessageStatus::Deleted)),
            )
            .set(messages::status.eq(MessageStatus::Deleted))
            .returning(Message::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;

        if updated.is_some() {
            return Ok(updated);
        }

        // Already a tombstone, or not this sender's message.
        Ok(diesel_async::RunQueryDsl::get_result(
            messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .filter(messages::id.eq(message_id))
                .filter(messages::sender_id.eq(sender_id))
                .select(Message::as_select()),
            &mut conn,
        )
        .await
        .optional()?)
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<Notification> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(notifications::table)
                .values(notification)
                .returning(Notification::as_returning()),
            &mut conn,
        )
        .await?)
    }

    async fn mark_notification_read(
        &self,
        id: &str,
        recipient_id: &str,
    ) -> StoreResult<Option<Notification>> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::get_result(
            diesel::update(
                notifications::table
                    .filter(notifications::id.eq(id))
                    .filter(notifications::recipient_id.eq(recipient_id)),
            )
            .set(notifications::read.eq(true))
            .returning(Notification::as_returning()),
            &mut conn,
        )
        .await
        .optional()?)
    }

    async fn mark_all_notifications_read(&self, recipient_id: &str) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;

        let changed = diesel_async::RunQueryDsl::execute(
            diesel::update(
                notifications::table
                    .filter(notifications::recipient_id.eq(recipient_id))
                    .filter(notifications::read.eq(false)),
            )
            .set(notifications::read.eq(true)),
            &mut conn,
        )
        .await?;

        Ok(changed as u64)
    }

    async fn list_notifications(
        &self,
        recipient_id: &str,
        before: Option<&NotificationCursor>,
        limit: i64,
    ) -> StoreResult<Vec<Notification>> {
        let mut conn = self.pool.get().await?;

        let mut query: notifications::BoxedQuery<'_, Pg> = notifications::table
            .filter(notifications::recipient_id.eq(recipient_id))
            .into_boxed();
        match before {
            Some(NotificationCursor { created_at, id: Some(id) }) => {
                query = query.filter(
                    notifications::created_at.lt(*created_at).or(notifications::created_at
                        .eq(*created_at)
                        .and(notifications::id.lt(id.clone()))),
                );
            }
            Some(NotificationCursor { created_at, id: None }) => {
                query = query.filter(notifications::created_at.lt(*created_at));
            }
            None => {}
        }

        Ok(diesel_async::RunQueryDsl::load(
            query
                .order((notifications::created_at.desc(), notifications::id.desc()))
                .limit(limit)
                .select(Notification::as_select()),
            &mut conn,
        )
        .await?)
    }

    async fn count_unread_notifications(&self, recipient_id: &str) -> StoreResult<i64> {
        let mut conn = self.pool.get().await?;

        Ok(diesel_async::RunQueryDsl::get_result(
            notifications::table
                .filter(notifications::recipient_id.eq(recipient_id))
                .filter(notifications::read.eq(false))
                .count(),
            &mut conn,
        )
        .await?)
    }
}
