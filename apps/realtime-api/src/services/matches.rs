//! The match request state machine.
//!
//! `pending → accepted | rejected`; `blocked` is absorbing. At most one record
//! exists per unordered pair. A `rejected` pair can be re-requested, which
//! reopens the same record as `pending`.

use std::sync::Arc;

use chrono::Utc;
use nikah_common::PrefixedId;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{CoreError, CoreResult};
use crate::models::conversation::Conversation;
use crate::models::match_request::{MatchDecision, MatchRequest, MatchStatus};
use crate::models::notification::NotificationKind;
use crate::store::{MatchQuery, Store};

use super::{Actor, ConversationLog, NotificationFanout};

/// Result of a successful response to a match request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchResponseOutcome {
    #[serde(rename = "match")]
    pub match_request: MatchRequest,
    /// Created eagerly on acceptance.
    pub conversation: Option<Conversation>,
}

pub struct MatchLifecycle {
    store: Arc<dyn Store>,
    conversations: Arc<ConversationLog>,
    notifications: Arc<NotificationFanout>,
}

impl MatchLifecycle {
    pub fn new(
        store: Arc<dyn Store>,
        conversations: Arc<ConversationLog>,
        notifications: Arc<NotificationFanout>,
    ) -> Self {
        Self {
            store,
            conversations,
            notifications,
        }
    }

    /// Create a `pending` request and notify the target. Fails with
    /// `DuplicateRequest` while the pair is pending, accepted, or blocked.
    pub async fn request(&self, requester: Actor<'_>, target_id: &str) -> CoreResult<MatchRequest> {
        if requester.user_id == target_id {
            return Err(CoreError::Validation(
                "Cannot send a match request to yourself".into(),
            ));
        }

        let created = self
            .store
            .insert_match_if_absent(
                &MatchRequest::generate_id(),
                requester.user_id,
                target_id,
                Utc::now(),
            )
            .await?
            .ok_or(CoreError::DuplicateRequest)?;

        tracing::info!(
            match_id = %created.id,
            user_id = %requester.user_id,
            target_id,
            "match requested"
        );

        let text = format!("{} sent you a match request", requester.display_name);
        if let Err(e) = self
            .notifications
            .notify(target_id, requester.user_id, NotificationKind::MatchRequest, text, None)
            .await
        {
            tracing::error!(match_id = %created.id, error = %e, "match request notification failed");
        }

        Ok(created)
    }

    /// The target accepts or rejects a pending request. Acceptance creates the
    /// pair's conversation and notifies the requester.
    pub async fn respond(
        &self,
        actor: Actor<'_>,
        match_id: &str,
        decision: MatchDecision,
    ) -> CoreResult<MatchResponseOutcome> {
        if !MatchRequest::is_valid_id(match_id) {
            return Err(CoreError::NotFound("match request"));
        }

        let current = self
            .store
            .get_match(match_id)
            .await?
            .ok_or(CoreError::NotFound("match request"))?;

        if current.target_id != actor.user_id {
            return Err(CoreError::Unauthorized(
                "Only the recipient can respond to a match request".into(),
            ));
        }

        let next = decision.target_status();
        let invalid = |from: MatchStatus| CoreError::InvalidTransition(format!("{from} -> {next}"));
        if current.status != MatchStatus::Pending {
            return Err(invalid(current.status));
        }

        // Compare-and-set: a concurrent response or block wins the race.
        let updated = self
            .store
            .transition_match(match_id, MatchStatus::Pending, next, Utc::now())
            .await?
            .ok_or_else(|| invalid(current.status))?;

        tracing::info!(match_id, user_id = %actor.user_id, status = %next, "match responded");

        let conversation = match decision {
            MatchDecision::Reject => None,
            MatchDecision::Accept => {
                let conversation = self
                    .conversations
                    .find_or_create(&updated.requester_id, &updated.target_id)
                    .await?;

                let text = format!("{} accepted your match request", actor.display_name);
                if let Err(e) = self
                    .notifications
                    .notify(
                        &updated.requester_id,
                        actor.user_id,
                        NotificationKind::Other,
                        text,
                        Some(&conversation.id),
                    )
                    .await
                {
                    tracing::error!(match_id, error = %e, "match accepted notification failed");
                }

                Some(conversation)
            }
        };

        Ok(MatchResponseOutcome {
            match_request: updated,
            conversation,
        })
    }

    /// Move the pair to the absorbing `blocked` state.
    pub async fn block(&self, actor: Actor<'_>, other_id: &str) -> CoreResult<MatchRequest> {
        if actor.user_id == other_id {
            return Err(CoreError::Validation("Cannot block yourself".into()));
        }

        let blocked = self
            .store
            .block_pair(&MatchRequest::generate_id(), actor.user_id, other_id, Utc::now())
            .await?;

        tracing::info!(match_id = %blocked.id, user_id = %actor.user_id, "pair blocked");
        Ok(blocked)
    }

    pub async fn pending_sent_by(&self, user_id: &str) -> CoreResult<Vec<MatchRequest>> {
        Ok(self
            .store
            .list_matches(MatchQuery::SentBy(user_id, MatchStatus::Pending))
            .await?)
    }

    pub async fn pending_received_by(&self, user_id: &str) -> CoreResult<Vec<MatchRequest>> {
        Ok(self
            .store
            .list_matches(MatchQuery::ReceivedBy(user_id, MatchStatus::Pending))
            .await?)
    }

    pub async fn accepted_for(&self, user_id: &str) -> CoreResult<Vec<MatchRequest>> {
        Ok(self
            .store
            .list_matches(MatchQuery::Involving(user_id, MatchStatus::Accepted))
            .await?)
    }
}
