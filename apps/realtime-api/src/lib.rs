pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use config::Config;
use db::kv::KeyValueStore;
use gateway::fanout::GatewayBroadcast;
use gateway::presence::PresenceRegistry;
use gateway::typing::TypingCoordinator;
use nikah_common::SnowflakeGenerator;
use services::{ConversationLog, MatchLifecycle, NotificationFanout, RetryPolicy};
use store::Store;

/// Shared application state available to all route handlers and gateway sessions.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub kv: Arc<dyn KeyValueStore>,
    pub config: Arc<Config>,
    pub broadcast: GatewayBroadcast,
    pub presence: Arc<PresenceRegistry>,
    pub typing: Arc<TypingCoordinator>,
    pub conversations: Arc<ConversationLog>,
    pub matches: Arc<MatchLifecycle>,
    pub notifications: Arc<NotificationFanout>,
}

impl AppState {
    /// Wire the core components together over the given store and key-value store.
    pub fn new(store: Arc<dyn Store>, kv: Arc<dyn KeyValueStore>, config: Config) -> Self {
        let retry = RetryPolicy::from_config(&config);
        let broadcast = GatewayBroadcast::new();
        let presence = Arc::new(PresenceRegistry::new());
        let typing = Arc::new(TypingCoordinator::new(config.typing_ttl()));

        let notifications = Arc::new(NotificationFanout::new(
            store.clone(),
            presence.clone(),
            broadcast.clone(),
            retry.clone(),
        ));
        let conversations = Arc::new(ConversationLog::new(
            store.clone(),
            SnowflakeGenerator::new(config.worker_id),
            retry,
            broadcast.clone(),
        ));
        let matches = Arc::new(MatchLifecycle::new(
            store.clone(),
            conversations.clone(),
            notifications.clone(),
        ));

        Self {
            store,
            kv,
            config: Arc::new(config),
            broadcast,
            presence,
            typing,
            conversations,
            matches,
            notifications,
        }
    }
}
