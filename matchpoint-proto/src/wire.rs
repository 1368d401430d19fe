//! Wire message types for the Matchpoint relay protocol.
//!
//! Defines the two closed message enums — [`ClientMessage`] inbound,
//! [`ServerMessage`] outbound — that are postcard-encoded and carried in
//! WebSocket binary frames. There is no dynamic event-name dispatch:
//! every message kind is a variant, matched exhaustively on both ends.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::action::Action;
use crate::role::Role;

/// Messages sent by a player to the relay server.
///
/// Disconnection has no message of its own; it is signalled by the
/// WebSocket stream closing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Join (or create) the session identified by `session_key`.
    ///
    /// The key is an arbitrary case-sensitive string chosen by the first
    /// joiner; the server does not validate its format.
    JoinGame {
        /// Session to join or create.
        session_key: String,
    },

    /// Ask the server to forward an action to the other session member.
    PlayerAction {
        /// Session whose members should receive the action.
        session_key: String,
        /// The opaque action envelope to forward.
        action: Action,
    },
}

/// Messages sent by the relay server to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// First message on every connection: the server-assigned player id.
    Welcome {
        /// Opaque connection identifier, unique for the process lifetime.
        player_id: String,
    },

    /// Sent to all current members of a session after any join or leave.
    RoomUpdate {
        /// Member ids in join order.
        members: Vec<String>,
    },

    /// Sent individually to each member once a session fills to two players.
    AssignRole {
        /// The recipient's role, fixed for the session's lifetime.
        role: Role,
        /// The recipient's own player id.
        player_id: String,
        /// The opposing player's id.
        other_id: String,
    },

    /// Broadcast to both members once a session becomes active.
    StartGame,

    /// An action forwarded from the other member of the session.
    PlayerAction {
        /// The action envelope, untouched by the server.
        action: Action,
    },

    /// Server rejects a request (e.g. joining a full session).
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Error type for wire encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a wire message into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the message cannot be serialized.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(msg).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a wire message from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be deserialized.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
