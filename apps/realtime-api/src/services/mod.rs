//! Stateful components of the real-time core. Each one owns a single concern
//! and is driven by the gateway command handlers and the HTTP routes.

pub mod conversations;
pub mod matches;
pub mod notifications;
pub mod retry;

pub use conversations::ConversationLog;
pub use matches::MatchLifecycle;
pub use notifications::NotificationFanout;
pub use retry::RetryPolicy;

/// The verified identity on whose behalf an operation runs.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub user_id: &'a str,
    pub display_name: &'a str,
}

impl<'a> From<&'a crate::auth::middleware::AuthUser> for Actor<'a> {
    fn from(user: &'a crate::auth::middleware::AuthUser) -> Self {
        Self {
            user_id: &user.user_id,
            display_name: &user.display_name,
        }
    }
}

impl<'a> From<&'a crate::gateway::session::GatewaySession> for Actor<'a> {
    fn from(session: &'a crate::gateway::session::GatewaySession) -> Self {
        Self {
            user_id: &session.user_id,
            display_name: &session.display_name,
        }
    }
}
