//! Relay server core: shared state, WebSocket handler, and message routing.
//!
//! The server accepts one WebSocket connection per player, assigns each a
//! connection id, and dispatches the two inbound message kinds: session
//! joins go through the [`SessionRegistry`], actions are forwarded to the
//! other member of the named session. When a connection closes, the player
//! is removed from its session and the remaining member is notified.
//!
//! The relay is a dumb forwarder by contract: it never decodes action
//! payloads, never validates their contents, and has no authority over
//! game state.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use matchpoint_proto::action::Action;
use matchpoint_proto::wire::{self, ClientMessage, ServerMessage};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::sessions::{JoinOutcome, SessionRegistry};

/// Shared relay server state: connected players and their sessions.
pub struct RelayState {
    /// Maps player id to a channel sender for delivering WebSocket messages.
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
    /// Session membership and matchmaking state.
    pub sessions: SessionRegistry,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a new relay state with no connections and no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            sessions: SessionRegistry::new(),
        }
    }

    /// Registers a player's outbound channel sender.
    ///
    /// Player ids are generated server-side per connection, so an id can
    /// never be registered twice.
    pub async fn register(&self, player_id: &str, sender: mpsc::UnboundedSender<Message>) {
        let mut conns = self.connections.write().await;
        conns.insert(player_id.to_string(), sender);
    }

    /// Removes a player from the connection registry.
    pub async fn unregister(&self, player_id: &str) {
        let mut conns = self.connections.write().await;
        conns.remove(player_id);
    }

    /// Returns a clone of the sender for the given player, if connected.
    pub async fn get_sender(&self, player_id: &str) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(player_id).cloned()
    }

    /// Send a WebSocket Close frame to all connected players.
    ///
    /// Each player's writer task forwards the close frame, which the
    /// client-side reader detects as disconnection. Useful for graceful
    /// shutdown and testing.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (player_id, sender) in conns.iter() {
            tracing::info!(player_id = %player_id, "sending close frame to player");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection for a single player.
///
/// The connection lifecycle:
/// 1. Assign a fresh player id and register the outbound channel.
/// 2. Send `Welcome` carrying the id.
/// 3. Enter the message loop, dispatching joins and actions.
/// 4. On disconnect, leave the session, notify the remaining member, and
///    unregister. This cleanup runs exactly once per connection.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // The connection id is ours to assign; clients learn it from Welcome.
    let player_id = Uuid::now_v7().to_string();

    // Create a channel for sending messages to this player's WebSocket writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(&player_id, tx).await;

    let welcome = ServerMessage::Welcome {
        player_id: player_id.clone(),
    };
    if let Err(e) = send_server_msg(&mut ws_sender, &welcome).await {
        tracing::warn!(player_id = %player_id, error = %e, "failed to send Welcome");
        state.unregister(&player_id).await;
        return;
    }

    tracing::info!(player_id = %player_id, "connection accepted");

    // Spawn a writer task that forwards messages from the channel to the WebSocket.
    let writer_player_id = player_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(player_id = %writer_player_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process incoming messages from this player.
    let reader_player_id = player_id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(&reader_player_id, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(player_id = %reader_player_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // Disconnect cleanup: leave the session, tell whoever is left.
    handle_disconnect(&player_id, &state).await;
    state.unregister(&player_id).await;
    tracing::info!(player_id = %player_id, "player disconnected");
}

/// Handles a binary WebSocket frame from a connected player.
///
/// Undecodable frames are logged and dropped; the connection stays up.
async fn handle_binary_message(player_id: &str, data: &[u8], state: &Arc<RelayState>) {
    let msg = match wire::decode::<ClientMessage>(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(player_id = %player_id, error = %e, "failed to decode message");
            return;
        }
    };

    match msg {
        ClientMessage::JoinGame { session_key } => {
            handle_join(state, player_id, &session_key).await;
        }
        ClientMessage::PlayerAction {
            session_key,
            action,
        } => {
            relay_action(state, &session_key, player_id, action).await;
        }
    }
}

/// Runs a join through the registry and emits the resulting notifications.
///
/// Emission order on a match is fixed: `RoomUpdate` to all members, then
/// `AssignRole` individually, then the `StartGame` broadcast.
async fn handle_join(state: &Arc<RelayState>, player_id: &str, session_key: &str) {
    match state.sessions.join(session_key, player_id).await {
        Ok(JoinOutcome::Joined { members }) => {
            tracing::info!(
                player_id = %player_id,
                session_key = %session_key,
                members = members.len(),
                "player joined session"
            );
            broadcast_room_update(state, &members).await;
        }
        Ok(JoinOutcome::AlreadyMember { members }) => {
            tracing::debug!(
                player_id = %player_id,
                session_key = %session_key,
                "duplicate join, membership unchanged"
            );
            broadcast_room_update(state, &members).await;
        }
        Ok(JoinOutcome::Matched {
            members,
            assignments,
        }) => {
            tracing::info!(session_key = %session_key, "session matched, starting game");
            broadcast_room_update(state, &members).await;

            let [first, second] = &assignments;
            send_to_player(
                state,
                &first.player_id,
                &ServerMessage::AssignRole {
                    role: first.role,
                    player_id: first.player_id.clone(),
                    other_id: second.player_id.clone(),
                },
            )
            .await;
            send_to_player(
                state,
                &second.player_id,
                &ServerMessage::AssignRole {
                    role: second.role,
                    player_id: second.player_id.clone(),
                    other_id: first.player_id.clone(),
                },
            )
            .await;

            for member in &members {
                send_to_player(state, member, &ServerMessage::StartGame).await;
            }
        }
        Err(e) => {
            tracing::warn!(
                player_id = %player_id,
                session_key = %session_key,
                "join rejected: session full"
            );
            send_to_player(
                state,
                player_id,
                &ServerMessage::Error {
                    reason: e.to_string(),
                },
            )
            .await;
        }
    }
}

/// Forwards an action to every member of the session except the sender.
///
/// An unknown session key is a silent no-op — there is nobody to notify
/// and no feedback channel for this class of error.
async fn relay_action(state: &Arc<RelayState>, session_key: &str, sender_id: &str, action: Action) {
    let Some(members) = state.sessions.members(session_key).await else {
        tracing::debug!(
            player_id = %sender_id,
            session_key = %session_key,
            "action for unknown session dropped"
        );
        return;
    };

    tracing::debug!(
        player_id = %sender_id,
        session_key = %session_key,
        kind = %action.kind,
        "relaying action"
    );

    let msg = ServerMessage::PlayerAction { action };
    for member in members.iter().filter(|m| m.as_str() != sender_id) {
        send_to_player(state, member, &msg).await;
    }
}

/// Removes a disconnected player from its session and notifies survivors.
async fn handle_disconnect(player_id: &str, state: &Arc<RelayState>) {
    for update in state.sessions.leave(player_id).await {
        tracing::info!(
            player_id = %player_id,
            session_key = %update.session_key,
            remaining = update.remaining.len(),
            "player left session"
        );
        broadcast_room_update(state, &update.remaining).await;
    }
}

/// Sends a `RoomUpdate` with the given member list to each listed member.
async fn broadcast_room_update(state: &Arc<RelayState>, members: &[String]) {
    let msg = ServerMessage::RoomUpdate {
        members: members.to_vec(),
    };
    for member in members {
        send_to_player(state, member, &msg).await;
    }
}

/// Sends a server message to a connected player via its channel.
///
/// Players that disconnected between snapshot and send are skipped.
async fn send_to_player(state: &Arc<RelayState>, player_id: &str, msg: &ServerMessage) {
    if let Some(sender) = state.get_sender(player_id).await
        && let Ok(bytes) = wire::encode(msg)
    {
        let _ = sender.send(Message::Binary(bytes.into()));
    }
}

/// Encodes and sends a server message directly on a WebSocket sender.
async fn send_server_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> Result<(), String> {
    let bytes = wire::encode(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the relay server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
