//! Background housekeeping: typing expiry, presence GC, idle conversation locks.

use tokio::task::JoinHandle;
use tokio::time;

use crate::AppState;

use super::events::ServerEvent;
use super::fanout::Audience;

/// Run one housekeeping pass. Returns the number of typing entries expired.
pub fn sweep_once(state: &AppState) -> usize {
    let expired = state.typing.sweep_expired();
    for (conversation_id, user_id) in &expired {
        state.broadcast.dispatch(
            Audience::ConversationExcept(conversation_id.clone(), user_id.clone()),
            ServerEvent::TypingStop {
                conversation_id: conversation_id.clone(),
                user_id: user_id.clone(),
            },
        );
    }

    let removed = state.presence.sweep_stale(state.config.presence_retention());
    let pruned = state.conversations.prune_locks();
    if removed > 0 || pruned > 0 {
        tracing::debug!(
            presence_removed = removed,
            locks_pruned = pruned,
            "housekeeping sweep"
        );
    }

    expired.len()
}

/// Spawn the periodic sweeper on the current runtime.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    let period = state.config.typing_sweep_interval();
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweep_once(&state);
        }
    })
}
