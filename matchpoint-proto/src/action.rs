//! The opaque action envelope relayed between players.
//!
//! An [`Action`] is a type tag plus a payload blob. The relay server reads
//! neither: it forwards the whole envelope verbatim to the other member of
//! the sender's session. All payload semantics (movement deltas, physics
//! events, and so on) belong to the presentation layer on both ends.

use serde::{Deserialize, Serialize};

/// A tagged application-level message with an opaque payload.
///
/// The `kind` tag exists so clients can dispatch without decoding the
/// payload; the server treats both fields as freight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Application-defined type tag (e.g. `"move"`, `"dropBall"`).
    pub kind: String,
    /// Opaque payload bytes, encoded and decoded by the presentation layer.
    pub payload: Vec<u8>,
}

impl Action {
    /// Creates an action envelope from a type tag and payload bytes.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}
