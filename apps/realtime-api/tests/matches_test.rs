mod common;

use realtime_api::error::CoreError;
use realtime_api::models::match_request::{MatchDecision, MatchStatus};
use realtime_api::models::notification::NotificationKind;

use common::{seed_user, test_state};

#[tokio::test]
async fn request_creates_pending_and_notifies_target() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    let request = state.matches.request(amina.actor(), &bilal.id).await.unwrap();
    assert_eq!(request.status, MatchStatus::Pending);
    assert_eq!(request.requester_id, amina.id);
    assert_eq!(request.target_id, bilal.id);
    assert!(request.id.starts_with("mtc_"));

    let inbox = state.notifications.list(&bilal.id, None, None).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::MatchRequest);
    assert_eq!(inbox[0].sender_id, amina.id);
    assert!(inbox[0].text.contains("Amina"));
}

#[tokio::test]
async fn duplicate_request_is_rejected_in_either_direction() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    state.matches.request(amina.actor(), &bilal.id).await.unwrap();

    let again = state.matches.request(amina.actor(), &bilal.id).await;
    assert!(matches!(again, Err(CoreError::DuplicateRequest)));

    let reverse = state.matches.request(bilal.actor(), &amina.id).await;
    assert!(matches!(reverse, Err(CoreError::DuplicateRequest)));
}

#[tokio::test]
async fn concurrent_requests_from_both_sides_create_one_record() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    let (first, second) = tokio::join!(
        state.matches.request(amina.actor(), &bilal.id),
        state.matches.request(bilal.actor(), &amina.id),
    );

    let wins = [first.is_ok(), second.is_ok()];
    assert_eq!(wins.iter().filter(|ok| **ok).count(), 1);

    let pending_a = state.matches.pending_sent_by(&amina.id).await.unwrap();
    let pending_b = state.matches.pending_sent_by(&bilal.id).await.unwrap();
    assert_eq!(pending_a.len() + pending_b.len(), 1);
}

#[tokio::test]
async fn self_request_is_a_validation_error() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;

    let result = state.matches.request(amina.actor(), &amina.id).await;
    assert!(matches!(result, Err(CoreError::Validation(_))));
}

#[tokio::test]
async fn accept_creates_conversation_and_notifies_requester() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    let request = state.matches.request(amina.actor(), &bilal.id).await.unwrap();
    let outcome = state
        .matches
        .respond(bilal.actor(), &request.id, MatchDecision::Accept)
        .await
        .unwrap();

    assert_eq!(outcome.match_request.status, MatchStatus::Accepted);
    let conversation = outcome.conversation.expect("conversation on accept");
    assert!(conversation.has_participant(&amina.id));
    assert!(conversation.has_participant(&bilal.id));

    let inbox = state.notifications.list(&amina.id, None, None).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::Other);
    assert_eq!(inbox[0].conversation_id.as_deref(), Some(conversation.id.as_str()));
}

#[tokio::test]
async fn reject_creates_no_conversation() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    let request = state.matches.request(amina.actor(), &bilal.id).await.unwrap();
    let outcome = state
        .matches
        .respond(bilal.actor(), &request.id, MatchDecision::Reject)
        .await
        .unwrap();

    assert_eq!(outcome.match_request.status, MatchStatus::Rejected);
    assert!(outcome.conversation.is_none());
    assert!(state.conversations.list_for_user(&amina.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn responding_twice_is_an_invalid_transition() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    let request = state.matches.request(amina.actor(), &bilal.id).await.unwrap();
    state
        .matches
        .respond(bilal.actor(), &request.id, MatchDecision::Accept)
        .await
        .unwrap();

    let again = state
        .matches
        .respond(bilal.actor(), &request.id, MatchDecision::Accept)
        .await;
    assert!(matches!(again, Err(CoreError::InvalidTransition(_))));

    let reject_after = state
        .matches
        .respond(bilal.actor(), &request.id, MatchDecision::Reject)
        .await;
    assert!(matches!(reject_after, Err(CoreError::InvalidTransition(_))));
}

#[tokio::test]
async fn only_the_target_may_respond() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;
    let chidi = seed_user(&state, "Chidi").await;

    let request = state.matches.request(amina.actor(), &bilal.id).await.unwrap();

    let by_requester = state
        .matches
        .respond(amina.actor(), &request.id, MatchDecision::Accept)
        .await;
    assert!(matches!(by_requester, Err(CoreError::Unauthorized(_))));

    let by_stranger = state
        .matches
        .respond(chidi.actor(), &request.id, MatchDecision::Accept)
        .await;
    assert!(matches!(by_stranger, Err(CoreError::Unauthorized(_))));
}

#[tokio::test]
async fn responding_to_unknown_request_is_not_found() {
    let state = test_state();
    let bilal = seed_user(&state, "Bilal").await;

    let result = state
        .matches
        .respond(bilal.actor(), "mtc_missing", MatchDecision::Accept)
        .await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn rejected_pair_can_be_requested_again() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    let first = state.matches.request(amina.actor(), &bilal.id).await.unwrap();
    state
        .matches
        .respond(bilal.actor(), &first.id, MatchDecision::Reject)
        .await
        .unwrap();

    let retried = state.matches.request(amina.actor(), &bilal.id).await.unwrap();
    assert_eq!(retried.id, first.id);
    assert_eq!(retried.status, MatchStatus::Pending);
    state
        .matches
        .respond(bilal.actor(), &retried.id, MatchDecision::Reject)
        .await
        .unwrap();

    // Either side may reopen; the direction follows the new requester.
    let reopened = state.matches.request(bilal.actor(), &amina.id).await.unwrap();
    assert_eq!(reopened.id, first.id);
    assert_eq!(reopened.requester_id, bilal.id);
    assert_eq!(reopened.target_id, amina.id);
}

#[tokio::test]
async fn blocked_pair_stays_blocked() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    let request = state.matches.request(amina.actor(), &bilal.id).await.unwrap();
    let blocked = state.matches.block(bilal.actor(), &amina.id).await.unwrap();
    assert_eq!(blocked.id, request.id);
    assert_eq!(blocked.status, MatchStatus::Blocked);

    let respond = state
        .matches
        .respond(bilal.actor(), &request.id, MatchDecision::Accept)
        .await;
    assert!(matches!(respond, Err(CoreError::InvalidTransition(_))));

    let retry = state.matches.request(amina.actor(), &bilal.id).await;
    assert!(matches!(retry, Err(CoreError::DuplicateRequest)));

    let open = state.conversations.open_with(&amina.id, &bilal.id).await;
    assert!(matches!(open, Err(CoreError::Unauthorized(_))));
}

#[tokio::test]
async fn block_without_prior_request_creates_blocked_record() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    let blocked = state.matches.block(amina.actor(), &bilal.id).await.unwrap();
    assert_eq!(blocked.status, MatchStatus::Blocked);

    let request = state.matches.request(bilal.actor(), &amina.id).await;
    assert!(matches!(request, Err(CoreError::DuplicateRequest)));
}

#[tokio::test]
async fn listings_follow_direction_and_status() {
    let state = test_state();
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;
    let chidi = seed_user(&state, "Chidi").await;

    let to_bilal = state.matches.request(amina.actor(), &bilal.id).await.unwrap();
    state.matches.request(amina.actor(), &chidi.id).await.unwrap();

    let sent = state.matches.pending_sent_by(&amina.id).await.unwrap();
    assert_eq!(sent.len(), 2);

    let received = state.matches.pending_received_by(&bilal.id).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, to_bilal.id);
    assert!(state.matches.pending_received_by(&amina.id).await.unwrap().is_empty());

    state
        .matches
        .respond(bilal.actor(), &to_bilal.id, MatchDecision::Accept)
        .await
        .unwrap();

    assert_eq!(state.matches.pending_sent_by(&amina.id).await.unwrap().len(), 1);
    let accepted_a = state.matches.accepted_for(&amina.id).await.unwrap();
    let accepted_b = state.matches.accepted_for(&bilal.id).await.unwrap();
    assert_eq!(accepted_a.len(), 1);
    assert_eq!(accepted_b.len(), 1);
    assert!(state.matches.accepted_for(&chidi.id).await.unwrap().is_empty());
}
