//! Player role assignment for a matched session.

use serde::{Deserialize, Serialize};

/// The binary designation given to each of the two matched players.
///
/// Assigned strictly by join order: the first member of a session gets
/// [`Role::A`], the second [`Role::B`]. Once assigned, a role is never
/// reassigned — a vacated role is not recycled to the remaining player.
/// The presentation layer decides what the labels mean (side of the
/// board, color, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Role of the first player to join a session.
    A,
    /// Role of the second player to join a session.
    B,
}

impl Role {
    /// Returns the role held by the opposing player.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}
