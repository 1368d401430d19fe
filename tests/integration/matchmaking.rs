//! Integration tests for session matchmaking.
//!
//! Drives real WebSocket clients against an in-process relay server and
//! verifies the join flow: room updates, role assignment by join order,
//! the one-shot start signal, and capacity rejection.
//!
//! Verification command: `cargo test --test matchmaking`

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use matchpoint_proto::action::Action;
use matchpoint_proto::role::Role;
use matchpoint_proto::wire::{self, ClientMessage, ServerMessage};
use matchpoint_relay::relay::{RelayState, start_server_with_state};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Starts a relay server on a random port, returning its state for
/// registry-level assertions.
async fn start_relay() -> (std::net::SocketAddr, Arc<RelayState>) {
    let state = Arc::new(RelayState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start test relay");
    (addr, state)
}

/// Connects a WebSocket client and waits for its `Welcome`, returning the
/// server-assigned player id.
async fn connect(addr: std::net::SocketAddr) -> (WsStream, String) {
    let url = format!("ws://{addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let msg = recv(&mut ws).await;
    let ServerMessage::Welcome { player_id } = msg else {
        panic!("expected Welcome, got {msg:?}");
    };
    (ws, player_id)
}

/// Sends a client message on a WebSocket.
async fn send(ws: &mut WsStream, msg: &ClientMessage) {
    let bytes = wire::encode(msg).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

/// Receives and decodes a server message, with a timeout.
async fn recv(ws: &mut WsStream) -> ServerMessage {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("recv timed out")
        .unwrap()
        .unwrap();
    wire::decode(&msg.into_data()).unwrap()
}

/// Asserts that no server message arrives within a short window.
async fn assert_silent(ws: &mut WsStream) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected no message, got {result:?}");
}

/// Joins a session and asserts only the resulting `RoomUpdate` membership.
async fn join(ws: &mut WsStream, session_key: &str) -> Vec<String> {
    send(
        ws,
        &ClientMessage::JoinGame {
            session_key: session_key.to_string(),
        },
    )
    .await;
    let msg = recv(ws).await;
    let ServerMessage::RoomUpdate { members } = msg else {
        panic!("expected RoomUpdate, got {msg:?}");
    };
    members
}

#[tokio::test]
async fn first_join_sees_itself_in_room_update() {
    let (addr, _state) = start_relay().await;
    let (mut ws, p1) = connect(addr).await;

    let members = join(&mut ws, "alpha").await;
    assert_eq!(members, vec![p1]);
}

#[tokio::test]
async fn second_join_runs_the_full_match_sequence() {
    let (addr, _state) = start_relay().await;
    let (mut ws1, p1) = connect(addr).await;
    let (mut ws2, p2) = connect(addr).await;

    let members = join(&mut ws1, "alpha").await;
    assert_eq!(members, vec![p1.clone()]);

    // The second join triggers, in order: RoomUpdate to both, AssignRole
    // to each individually, StartGame to both.
    let members = join(&mut ws2, "alpha").await;
    assert_eq!(members, vec![p1.clone(), p2.clone()]);

    assert_eq!(
        recv(&mut ws2).await,
        ServerMessage::AssignRole {
            role: Role::B,
            player_id: p2.clone(),
            other_id: p1.clone(),
        }
    );
    assert_eq!(recv(&mut ws2).await, ServerMessage::StartGame);

    assert_eq!(
        recv(&mut ws1).await,
        ServerMessage::RoomUpdate {
            members: vec![p1.clone(), p2.clone()]
        }
    );
    assert_eq!(
        recv(&mut ws1).await,
        ServerMessage::AssignRole {
            role: Role::A,
            player_id: p1.clone(),
            other_id: p2.clone(),
        }
    );
    assert_eq!(recv(&mut ws1).await, ServerMessage::StartGame);
}

#[tokio::test]
async fn duplicate_join_leaves_membership_unchanged() {
    let (addr, state) = start_relay().await;
    let (mut ws, p1) = connect(addr).await;

    let members = join(&mut ws, "alpha").await;
    assert_eq!(members, vec![p1.clone()]);

    // Rejoining is idempotent: another RoomUpdate, same single member,
    // and no match is triggered.
    let members = join(&mut ws, "alpha").await;
    assert_eq!(members, vec![p1.clone()]);
    assert_silent(&mut ws).await;

    assert_eq!(state.sessions.members("alpha").await.unwrap(), vec![p1]);
}

#[tokio::test]
async fn third_join_is_rejected_and_not_admitted() {
    let (addr, state) = start_relay().await;
    let (mut ws1, p1) = connect(addr).await;
    let (mut ws2, p2) = connect(addr).await;
    let (mut ws3, _p3) = connect(addr).await;

    join(&mut ws1, "alpha").await;
    join(&mut ws2, "alpha").await;

    // Drain the match sequence on both members.
    recv(&mut ws2).await; // AssignRole
    recv(&mut ws2).await; // StartGame
    recv(&mut ws1).await; // RoomUpdate
    recv(&mut ws1).await; // AssignRole
    recv(&mut ws1).await; // StartGame

    // The third joiner gets an explicit rejection, not membership.
    send(
        &mut ws3,
        &ClientMessage::JoinGame {
            session_key: "alpha".to_string(),
        },
    )
    .await;
    let msg = recv(&mut ws3).await;
    let ServerMessage::Error { reason } = msg else {
        panic!("expected Error, got {msg:?}");
    };
    assert!(reason.contains("full"), "got: {reason}");

    assert_eq!(
        state.sessions.members("alpha").await.unwrap(),
        vec![p1, p2]
    );

    // Members saw nothing of the failed join, and the rejected player
    // receives no relayed traffic.
    send(
        &mut ws1,
        &ClientMessage::PlayerAction {
            session_key: "alpha".to_string(),
            action: Action::new("move", vec![42]),
        },
    )
    .await;
    let msg = recv(&mut ws2).await;
    assert!(matches!(msg, ServerMessage::PlayerAction { .. }));
    assert_silent(&mut ws3).await;
}

#[tokio::test]
async fn start_game_fires_exactly_once_despite_further_traffic() {
    let (addr, _state) = start_relay().await;
    let (mut ws1, _p1) = connect(addr).await;
    let (mut ws2, _p2) = connect(addr).await;

    join(&mut ws1, "alpha").await;
    join(&mut ws2, "alpha").await;

    recv(&mut ws2).await; // AssignRole
    assert_eq!(recv(&mut ws2).await, ServerMessage::StartGame);
    recv(&mut ws1).await; // RoomUpdate
    recv(&mut ws1).await; // AssignRole
    assert_eq!(recv(&mut ws1).await, ServerMessage::StartGame);

    // Action traffic after the match must never re-trigger StartGame.
    for i in 0..3u8 {
        send(
            &mut ws1,
            &ClientMessage::PlayerAction {
                session_key: "alpha".to_string(),
                action: Action::new("move", vec![i]),
            },
        )
        .await;
    }
    for i in 0..3u8 {
        let msg = recv(&mut ws2).await;
        assert_eq!(
            msg,
            ServerMessage::PlayerAction {
                action: Action::new("move", vec![i])
            }
        );
    }
    assert_silent(&mut ws1).await;
    assert_silent(&mut ws2).await;
}

#[tokio::test]
async fn sessions_with_different_keys_are_independent() {
    let (addr, _state) = start_relay().await;
    let (mut ws1, p1) = connect(addr).await;
    let (mut ws2, p2) = connect(addr).await;

    let members = join(&mut ws1, "alpha").await;
    assert_eq!(members, vec![p1]);

    // A join under a different key matches nobody.
    let members = join(&mut ws2, "beta").await;
    assert_eq!(members, vec![p2]);

    assert_silent(&mut ws1).await;
    assert_silent(&mut ws2).await;
}

#[tokio::test]
async fn session_keys_are_case_sensitive_over_the_wire() {
    let (addr, state) = start_relay().await;
    let (mut ws1, _p1) = connect(addr).await;
    let (mut ws2, _p2) = connect(addr).await;

    join(&mut ws1, "Room1").await;
    join(&mut ws2, "room1").await;

    // Two distinct sessions, both still waiting.
    assert_eq!(state.sessions.session_count().await, 2);
    assert_silent(&mut ws1).await;
    assert_silent(&mut ws2).await;
}
