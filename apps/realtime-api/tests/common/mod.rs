#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use nikah_common::id::{prefix, prefixed_ulid};
use realtime_api::auth::tokens::{self, TokenIdentity};
use realtime_api::config::Config;
use realtime_api::db::kv::{KeyValueStore, MemoryStore};
use realtime_api::models::conversation::Conversation;
use realtime_api::models::match_request::MatchDecision;
use realtime_api::services::Actor;
use realtime_api::store::{InMemoryStore, Store};
use realtime_api::AppState;

/// A user known to the auth collaborator, with a live access token.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub name: String,
    pub token: String,
}

impl TestUser {
    pub fn actor(&self) -> Actor<'_> {
        Actor {
            user_id: &self.id,
            display_name: &self.name,
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn identity(&self) -> TokenIdentity {
        TokenIdentity {
            user_id: self.id.clone(),
            display_name: self.name.clone(),
        }
    }
}

/// Build a test AppState over the in-memory store and key-value store.
pub fn test_state() -> AppState {
    test_state_with(Config::default())
}

pub fn test_state_with(config: Config) -> AppState {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    AppState::new(store, kv, config)
}

/// Build the full application router wired to a fresh test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = realtime_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Register a user: profile row plus an access token in the KV store.
pub async fn seed_user(state: &AppState, name: &str) -> TestUser {
    let user = TestUser {
        id: prefixed_ulid(prefix::USER),
        name: name.to_string(),
        token: tokens::generate_access_token(),
    };
    tokens::store_access_token(state.kv.as_ref(), &user.token, &user.identity())
        .await
        .expect("store access token");
    state
        .store
        .upsert_profile(&user.id, &user.name)
        .await
        .expect("upsert profile");
    user
}

/// Issue a single-use gateway ticket for the user.
pub async fn issue_ticket(state: &AppState, user: &TestUser) -> String {
    let ticket = tokens::generate_ws_ticket();
    tokens::store_ws_ticket(state.kv.as_ref(), &ticket, &user.identity())
        .await
        .expect("store ticket");
    ticket
}

/// `a` requests `b`, `b` accepts. Returns the conversation created on acceptance.
pub async fn matched_pair(state: &AppState, a: &TestUser, b: &TestUser) -> Conversation {
    let request = state
        .matches
        .request(a.actor(), &b.id)
        .await
        .expect("request match");
    state
        .matches
        .respond(b.actor(), &request.id, MatchDecision::Accept)
        .await
        .expect("accept match")
        .conversation
        .expect("conversation created on accept")
}

/// Poll until `cond` holds, panicking after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
