//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time;

use crate::AppState;

use super::dispatch::execute;
use super::events::{
    ClientMessage, Command, GatewayMessage, HeartbeatPayload, IdentifyPayload, ServerEvent,
    OP_COMMAND, OP_HEARTBEAT, OP_IDENTIFY,
};
use super::fanout::{Audience, BroadcastPayload};
use super::handler::handle_identify;
use super::presence::PresenceChange;
use super::session::GatewaySession;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
const CLOSE_AUTH_FAILED: u16 = 4004;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Timeout for receiving IDENTIFY after connection (seconds).
const IDENTIFY_TIMEOUT_SECS: u64 = 10;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Why the handshake did not produce an IDENTIFY payload.
enum HandshakeError {
    /// Close frame already sent.
    Closed,
    /// Close with 4004 and this reason.
    AuthFailed(&'static str),
}

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: Wait for IDENTIFY within timeout.
    let identify = time::timeout(
        Duration::from_secs(IDENTIFY_TIMEOUT_SECS),
        await_identify(&mut ws_tx, &mut ws_rx),
    )
    .await;

    let payload = match identify {
        Ok(Ok(payload)) => payload,
        Ok(Err(HandshakeError::Closed)) => return,
        Ok(Err(HandshakeError::AuthFailed(reason))) => {
            tracing::debug!(%reason, "handshake failed");
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, reason).await;
            return;
        }
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Handshake timeout").await;
            return;
        }
    };

    // Step 2: Redeem the ticket.
    let (session, ready_msg) = match handle_identify(&state, payload).await {
        Ok(result) => result,
        Err(reason) => {
            tracing::debug!(%reason, "identify handler failed");
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, reason).await;
            return;
        }
    };

    // Subscribe before announcing presence so nothing addressed to this
    // session after READY is missed.
    let broadcast_rx = state.broadcast.subscribe();

    if send_json(&mut ws_tx, &ready_msg).await.is_err() {
        return;
    }

    let session = Arc::new(session);
    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.user_id,
        "gateway session established"
    );

    if let Some(PresenceChange::Online) = state
        .presence
        .register_session(&session.user_id, &session.session_id)
    {
        tracing::info!(user_id = %session.user_id, "user online");
        state.broadcast.dispatch(
            Audience::AllExcept(session.user_id.clone()),
            ServerEvent::Online {
                user_id: session.user_id.clone(),
            },
        );
    }

    // Step 3: Main event loop.
    run_session(&state, &session, ws_tx, ws_rx, broadcast_rx).await;

    // Step 4: Teardown. A dropped connection is the normal way out.
    disconnect(&state, &session).await;

    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.user_id,
        "gateway session ended"
    );
}

async fn await_identify(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsStream,
) -> Result<IdentifyPayload, HandshakeError> {
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => return Err(HandshakeError::Closed),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, "ws read error during identify");
                return Err(HandshakeError::Closed);
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(_) => {
                let _ = send_close(ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                return Err(HandshakeError::Closed);
            }
        };

        if client_msg.op != OP_IDENTIFY {
            let _ = send_close(ws_tx, CLOSE_NOT_AUTHENTICATED, "Expected IDENTIFY").await;
            return Err(HandshakeError::Closed);
        }

        return serde_json::from_value(client_msg.d)
            .map_err(|_| HandshakeError::AuthFailed("Invalid IDENTIFY payload"));
    }
    Err(HandshakeError::Closed)
}

/// Main session event loop: read client messages, forward broadcasts, enforce heartbeat.
async fn run_session(
    state: &AppState,
    session: &GatewaySession,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut broadcast_rx: broadcast::Receiver<Arc<BroadcastPayload>>,
) {
    // Heartbeat deadline: client must heartbeat within 1.5× the interval.
    let heartbeat_deadline = state.config.heartbeat_interval() * 3 / 2;
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            // Client sends us a message.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(_) => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                                break;
                            }
                        };

                        match client_msg.op {
                            OP_HEARTBEAT => {
                                got_heartbeat = true;
                                let payload: HeartbeatPayload =
                                    serde_json::from_value(client_msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
                                if send_json(&mut ws_tx, &GatewayMessage::heartbeat_ack(payload.seq)).await.is_err() {
                                    break;
                                }
                            }
                            OP_COMMAND => {
                                let result = run_command(state, session, client_msg).await;
                                if send_json(&mut ws_tx, &result).await.is_err() {
                                    break;
                                }
                            }
                            OP_IDENTIFY => {
                                // Already identified.
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Already identified").await;
                                break;
                            }
                            _ => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_id = %session.session_id, "ws read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                }
            }

            // Broadcast event from the fanout hub.
            result = broadcast_rx.recv() => {
                match result {
                    Ok(payload) => {
                        if !session.wants(&payload.audience) {
                            continue;
                        }

                        let seq = session.next_seq();
                        let msg = GatewayMessage::dispatch(payload.event_name, seq, payload.data.clone());
                        if send_json(&mut ws_tx, &msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            session_id = %session.session_id,
                            skipped = n,
                            "gateway session lagged behind broadcast"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            // Heartbeat timeout check.
            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(
                        session_id = %session.session_id,
                        "heartbeat timeout, closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

/// Decode and execute a COMMAND frame. Failures become error results; the
/// session stays open.
async fn run_command(state: &AppState, session: &GatewaySession, msg: ClientMessage) -> GatewayMessage {
    let Some(name) = msg.t else {
        return GatewayMessage::command_err("", msg.nonce, "BAD_REQUEST", "Missing command name");
    };

    let command = match Command::parse(&name, msg.d) {
        Ok(c) => c,
        Err(reason) => {
            tracing::debug!(session_id = %session.session_id, command = %name, %reason, "bad command");
            return GatewayMessage::command_err(&name, msg.nonce, "BAD_REQUEST", &reason);
        }
    };

    match execute(state, session, command).await {
        Ok(data) => GatewayMessage::command_ok(&name, msg.nonce, data),
        Err(err) => {
            tracing::debug!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                command = %name,
                code = err.code(),
                error = %err,
                "command rejected"
            );
            GatewayMessage::command_err(&name, msg.nonce, err.code(), &err.public_message())
        }
    }
}

/// Deregister presence; on the user's last session, announce OFFLINE, persist
/// last-seen, and clear their typing indicators.
async fn disconnect(state: &AppState, session: &GatewaySession) {
    let Some(PresenceChange::Offline { last_seen }) = state
        .presence
        .deregister_session(&session.user_id, &session.session_id)
    else {
        return;
    };

    tracing::info!(user_id = %session.user_id, "user offline");
    state.broadcast.dispatch(
        Audience::AllExcept(session.user_id.clone()),
        ServerEvent::Offline {
            user_id: session.user_id.clone(),
            last_seen,
        },
    );

    for conversation_id in state.typing.clear_user(&session.user_id) {
        state.broadcast.dispatch(
            Audience::ConversationExcept(conversation_id.clone(), session.user_id.clone()),
            ServerEvent::TypingStop {
                conversation_id,
                user_id: session.user_id.clone(),
            },
        );
    }

    if let Err(e) = state.store.touch_last_seen(&session.user_id, last_seen).await {
        tracing::error!(user_id = %session.user_id, error = %e, "failed to persist last seen");
    }
}

async fn send_json(ws_tx: &mut WsSink, msg: &GatewayMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
