mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use realtime_api::config::Config;
use realtime_api::AppState;

use common::{issue_ticket, matched_pair, seed_user, test_state_with, wait_until, TestUser};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: start an actual TCP server for WebSocket testing.
async fn start_ws_server() -> (SocketAddr, AppState) {
    start_ws_server_with(Config::default()).await
}

async fn start_ws_server_with(config: Config) -> (SocketAddr, AppState) {
    let state = test_state_with(config);
    let app = realtime_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr) -> Ws {
    let url = format!("ws://{addr}/gateway");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

async fn send(ws: &mut Ws, frame: Value) {
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("ws send");
}

/// Next text frame as JSON. Panics on close or timeout.
async fn next_frame(ws: &mut Ws) -> Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse frame");
            }
            tungstenite::Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => continue,
        }
    }
}

/// Skip frames until one matches.
async fn wait_for(ws: &mut Ws, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let frame = next_frame(ws).await;
        if pred(&frame) {
            return frame;
        }
    }
}

/// Every frame up to and including the first one that matches.
async fn collect_until(ws: &mut Ws, pred: impl Fn(&Value) -> bool) -> Vec<Value> {
    let mut frames = Vec::new();
    loop {
        let frame = next_frame(ws).await;
        let done = pred(&frame);
        frames.push(frame);
        if done {
            return frames;
        }
    }
}

fn is_event(name: &'static str) -> impl Fn(&Value) -> bool {
    move |f| f["op"] == 0 && f["t"] == name
}

/// Wait for the close frame and return its code.
async fn close_code(ws: &mut Ws) -> u16 {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Close(Some(frame)) => return u16::from(frame.code),
            tungstenite::Message::Close(None) => panic!("close frame without a code"),
            _ => continue,
        }
    }
}

async fn identify(addr: SocketAddr, ticket: &str) -> (Ws, Value) {
    let mut ws = connect(addr).await;
    send(&mut ws, json!({ "op": 2, "d": { "ticket": ticket } })).await;
    let ready = next_frame(&mut ws).await;
    assert_eq!(ready["op"], 0, "READY should be op=0 (DISPATCH)");
    assert_eq!(ready["t"], "READY");
    (ws, ready)
}

/// Identify and wait until the registry reports the user online.
async fn go_online(addr: SocketAddr, state: &AppState, user: &TestUser) -> Ws {
    let ticket = issue_ticket(state, user).await;
    let (ws, _) = identify(addr, &ticket).await;
    let presence = state.presence.clone();
    let user_id = user.id.clone();
    wait_until(move || presence.is_online(&user_id)).await;
    ws
}

/// Send a COMMAND and wait for its result.
async fn command(ws: &mut Ws, name: &str, data: Value, nonce: &str) -> Value {
    send(ws, json!({ "op": 4, "t": name, "d": data, "nonce": nonce })).await;
    let result = wait_for(ws, |f| f["op"] == 5 && f["nonce"] == nonce).await;
    assert_eq!(result["t"], name);
    result["d"].clone()
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identify_returns_ready() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;
    state.matches.request(bilal.actor(), &amina.id).await.unwrap();
    let ticket = issue_ticket(&state, &amina).await;

    let (_ws, ready) = identify(addr, &ticket).await;
    assert_eq!(ready["s"], 1);

    let d = &ready["d"];
    assert!(d["session_id"].as_str().unwrap().starts_with("gw_"));
    assert_eq!(d["user"]["id"], amina.id.as_str());
    assert_eq!(d["user"]["display_name"], "Amina");
    assert_eq!(d["unread_notifications"], 1);
    assert_eq!(d["heartbeat_interval"], 41_250);
}

#[tokio::test]
async fn invalid_ticket_closes_with_auth_failed() {
    let (addr, _state) = start_ws_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, json!({ "op": 2, "d": { "ticket": "wst_bogus" } })).await;
    assert_eq!(close_code(&mut ws).await, 4004);
}

#[tokio::test]
async fn ticket_is_single_use() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let ticket = issue_ticket(&state, &amina).await;

    let (_first, _) = identify(addr, &ticket).await;

    let mut second = connect(addr).await;
    send(&mut second, json!({ "op": 2, "d": { "ticket": ticket } })).await;
    assert_eq!(close_code(&mut second).await, 4004);
}

#[tokio::test]
async fn frame_before_identify_closes_with_not_authenticated() {
    let (addr, _state) = start_ws_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, json!({ "op": 1, "d": { "seq": 0 } })).await;
    assert_eq!(close_code(&mut ws).await, 4003);
}

#[tokio::test]
async fn malformed_json_closes_session() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let mut ws = go_online(addr, &state, &amina).await;

    ws.send(tungstenite::Message::Text("{not json".into()))
        .await
        .expect("ws send");
    assert_eq!(close_code(&mut ws).await, 4000);
}

#[tokio::test]
async fn second_identify_closes_session() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let mut ws = go_online(addr, &state, &amina).await;

    send(&mut ws, json!({ "op": 2, "d": { "ticket": "wst_again" } })).await;
    assert_eq!(close_code(&mut ws).await, 4000);
}

#[tokio::test]
async fn unknown_opcode_closes_session() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let mut ws = go_online(addr, &state, &amina).await;

    send(&mut ws, json!({ "op": 99, "d": null })).await;
    assert_eq!(close_code(&mut ws).await, 4001);
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_is_acknowledged() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let mut ws = go_online(addr, &state, &amina).await;

    send(&mut ws, json!({ "op": 1, "d": { "seq": 1 } })).await;
    let ack = next_frame(&mut ws).await;
    assert_eq!(ack["op"], 6);
    assert_eq!(ack["d"]["ack"], 1);
}

#[tokio::test]
async fn missed_heartbeats_close_the_session() {
    let config = Config {
        heartbeat_interval_ms: 100,
        ..Config::default()
    };
    let (addr, state) = start_ws_server_with(config).await;
    let amina = seed_user(&state, "Amina").await;
    let mut ws = go_online(addr, &state, &amina).await;

    assert_eq!(close_code(&mut ws).await, 4009);

    let presence = state.presence.clone();
    let user_id = amina.id.clone();
    wait_until(move || !presence.is_online(&user_id)).await;
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn online_and_offline_fire_once_per_user() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;
    let mut watcher = go_online(addr, &state, &amina).await;

    let mut first = go_online(addr, &state, &bilal).await;
    let ticket = issue_ticket(&state, &bilal).await;
    let (mut second, _) = identify(addr, &ticket).await;
    let presence = state.presence.clone();
    let bilal_id = bilal.id.clone();
    wait_until(move || presence.session_count(&bilal_id) == 2).await;

    first.close(None).await.expect("close first");
    let presence = state.presence.clone();
    let bilal_id = bilal.id.clone();
    wait_until(move || presence.session_count(&bilal_id) == 1).await;
    assert!(state.presence.is_online(&bilal.id));

    second.close(None).await.expect("close second");

    let frames = collect_until(&mut watcher, is_event("OFFLINE")).await;
    let online = frames.iter().filter(|f| is_event("ONLINE")(*f)).count();
    assert_eq!(online, 1);
    let offline = frames.last().unwrap();
    assert_eq!(offline["d"]["user_id"], bilal.id.as_str());
    assert!(offline["d"]["last_seen"].is_string());

    let seqs: Vec<u64> = frames.iter().filter_map(|f| f["s"].as_u64()).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_commands_get_error_results_and_keep_the_session() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;
    let conversation = matched_pair(&state, &amina, &bilal).await;
    let mut ws = go_online(addr, &state, &amina).await;

    let missing_fields = command(&mut ws, "SEND_MESSAGE", json!({}), "c1").await;
    assert_eq!(missing_fields["ok"], false);
    assert_eq!(missing_fields["error"]["code"], "BAD_REQUEST");

    let unknown = command(&mut ws, "DANCE", json!({}), "c2").await;
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown["error"]["code"], "BAD_REQUEST");

    let not_joined = command(
        &mut ws,
        "TYPING_START",
        json!({ "conversation_id": conversation.id }),
        "c3",
    )
    .await;
    assert_eq!(not_joined["ok"], false);
    assert_eq!(not_joined["error"]["code"], "UNAUTHORIZED");

    send(&mut ws, json!({ "op": 1, "d": { "seq": 7 } })).await;
    let ack = wait_for(&mut ws, |f| f["op"] == 6).await;
    assert_eq!(ack["d"]["ack"], 7);
}

#[tokio::test]
async fn salaam_round_trip_over_the_gateway() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;
    let conversation = matched_pair(&state, &amina, &bilal).await;

    let mut a = go_online(addr, &state, &amina).await;
    let mut b = go_online(addr, &state, &bilal).await;
    wait_for(&mut a, is_event("ONLINE")).await;

    let joined = command(
        &mut a,
        "JOIN_CONVERSATION",
        json!({ "conversation_id": conversation.id }),
        "j1",
    )
    .await;
    assert_eq!(joined["ok"], true);
    assert_eq!(joined["data"]["conversation"]["id"], conversation.id.as_str());

    let sent = command(
        &mut a,
        "SEND_MESSAGE",
        json!({
            "conversation_id": conversation.id,
            "receiver_id": bilal.id,
            "body": { "text": "Salaam" },
        }),
        "s1",
    )
    .await;
    assert_eq!(sent["ok"], true);
    assert_eq!(sent["data"]["status"], "sent");

    let created = wait_for(&mut a, is_event("MESSAGE_CREATE")).await;
    assert_eq!(created["d"]["message"]["body"], "Salaam");
    assert_eq!(created["d"]["sender_display_name"], "Amina");

    // Bilal has not joined yet: only the notification reaches him.
    let note = wait_for(&mut b, is_event("NOTIFICATION_CREATE")).await;
    assert_eq!(note["d"]["notification"]["kind"], "message");
    assert_eq!(
        note["d"]["notification"]["conversation_id"],
        conversation.id.as_str()
    );

    let joined = command(
        &mut b,
        "JOIN_CONVERSATION",
        json!({ "conversation_id": conversation.id }),
        "j2",
    )
    .await;
    assert_eq!(joined["ok"], true);
    assert_eq!(joined["data"]["marked_read"], 1);

    let read = wait_for(&mut a, is_event("MESSAGES_READ")).await;
    assert_eq!(read["d"]["reader_id"], bilal.id.as_str());
    assert_eq!(read["d"]["conversation_id"], conversation.id.as_str());
}

#[tokio::test]
async fn typing_reaches_the_peer_and_clears_on_disconnect() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;
    let conversation = matched_pair(&state, &amina, &bilal).await;
    let join = json!({ "conversation_id": conversation.id });

    let mut a = go_online(addr, &state, &amina).await;
    let mut b = go_online(addr, &state, &bilal).await;
    command(&mut a, "JOIN_CONVERSATION", join.clone(), "j1").await;
    command(&mut b, "JOIN_CONVERSATION", join.clone(), "j2").await;

    let started = command(&mut b, "TYPING_START", join.clone(), "t1").await;
    assert_eq!(started["ok"], true);
    assert_eq!(started["data"]["ttl_ms"], 5_000);

    let typing = wait_for(&mut a, is_event("TYPING_START")).await;
    assert_eq!(typing["d"]["user_id"], bilal.id.as_str());
    assert!(state.typing.is_active(&conversation.id, &bilal.id));

    b.close(None).await.expect("close");

    let frames = collect_until(&mut a, is_event("TYPING_STOP")).await;
    assert!(frames.iter().any(|f| is_event("OFFLINE")(f)));
    let stop = frames.last().unwrap();
    assert_eq!(stop["d"]["user_id"], bilal.id.as_str());
    assert!(!state.typing.is_active(&conversation.id, &bilal.id));
}

#[tokio::test]
async fn match_request_pushes_to_online_target() {
    let (addr, state) = start_ws_server().await;
    let amina = seed_user(&state, "Amina").await;
    let bilal = seed_user(&state, "Bilal").await;

    let mut a = go_online(addr, &state, &amina).await;
    let mut b = go_online(addr, &state, &bilal).await;

    let requested = command(&mut a, "MATCH_REQUEST", json!({ "target_id": bilal.id }), "m1").await;
    assert_eq!(requested["ok"], true);
    let match_id = requested["data"]["id"].as_str().unwrap().to_string();

    let note = wait_for(&mut b, is_event("NOTIFICATION_CREATE")).await;
    assert_eq!(note["d"]["notification"]["kind"], "match_request");

    let duplicate = command(&mut b, "MATCH_REQUEST", json!({ "target_id": amina.id }), "m2").await;
    assert_eq!(duplicate["ok"], false);
    assert_eq!(duplicate["error"]["code"], "DUPLICATE_REQUEST");

    let accepted = command(
        &mut b,
        "MATCH_RESPONSE",
        json!({ "match_id": match_id, "decision": "accept" }),
        "m3",
    )
    .await;
    assert_eq!(accepted["ok"], true);
    assert_eq!(accepted["data"]["match"]["status"], "accepted");
    assert!(accepted["data"]["conversation"]["id"].is_string());

    let note = wait_for(&mut a, is_event("NOTIFICATION_CREATE")).await;
    assert_eq!(note["d"]["notification"]["kind"], "other");
}
