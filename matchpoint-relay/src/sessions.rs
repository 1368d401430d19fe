//! Session registry and membership management.
//!
//! Maintains the in-memory map from session key to [`Session`] and owns
//! every member-list mutation. All state lives behind one [`RwLock`]: a
//! join and a concurrent disconnect cannot interleave inside a session's
//! member list, which is what keeps the two-member capacity invariant and
//! the exactly-once role assignment honest under concurrent connections.
//!
//! Sessions are ephemeral — lost on relay restart. A session whose last
//! member leaves is pruned immediately so the registry cannot grow without
//! bound under session-key churn.

use std::collections::HashMap;

use matchpoint_proto::role::Role;
use tokio::sync::RwLock;

/// Maximum number of members per session.
pub const SESSION_CAPACITY: usize = 2;

/// Lifecycle state of a session.
///
/// `Active` is terminal. A member leaving an active session does not
/// revert it to `Waiting`, and the departed member's role is never
/// recycled to whoever remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Zero or one members; waiting for the match to fill.
    Waiting,
    /// Two members joined at some point; roles assigned, start signalled.
    Active,
}

/// A matchmaking/relay grouping of up to two players.
#[derive(Debug, Clone)]
pub struct Session {
    /// The key the session was created under.
    pub key: String,
    /// Member ids in join order.
    pub members: Vec<String>,
    /// Current lifecycle state.
    pub state: SessionState,
}

/// Errors surfaced to a joining player.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session already has two members.
    #[error("session {session_key} is full")]
    SessionFull {
        /// The key the join was attempted against.
        session_key: String,
    },
}

/// One player's role assignment, produced when a session fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    /// The player receiving the role.
    pub player_id: String,
    /// The assigned role.
    pub role: Role,
}

/// Result of a successful [`SessionRegistry::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The player was appended; the session is not (newly) full. Covers
    /// both a first member joining a `Waiting` session and a player
    /// refilling an `Active` session that lost a member — the latter
    /// never re-fires the match.
    Joined {
        /// Member list after the join.
        members: Vec<String>,
    },
    /// The player was already a member; the list is unchanged.
    AlreadyMember {
        /// Member list, identical to before the call.
        members: Vec<String>,
    },
    /// This join brought a waiting session to capacity: roles are now
    /// assigned by join order and the game can start.
    Matched {
        /// Member list after the join.
        members: Vec<String>,
        /// Role assignments, in member order (first joiner, second joiner).
        assignments: [RoleAssignment; 2],
    },
}

impl JoinOutcome {
    /// The member list carried by any outcome variant.
    #[must_use]
    pub fn members(&self) -> &[String] {
        match self {
            Self::Joined { members }
            | Self::AlreadyMember { members }
            | Self::Matched { members, .. } => members,
        }
    }
}

/// A session's post-departure membership, reported by [`SessionRegistry::leave`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveUpdate {
    /// The session the player was removed from.
    pub session_key: String,
    /// Members still present. Empty when the session was pruned.
    pub remaining: Vec<String>,
}

/// In-memory map of active sessions.
///
/// Thread-safe via a single [`RwLock`] around the whole map — coarse, but
/// every operation is a short in-memory mutation, so contention is not a
/// concern at two members per session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Creates a new, empty session registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a player to a session, creating the session if the key is new.
    ///
    /// Rejoining a session the player is already in is idempotent. The
    /// `Waiting → Active` transition happens exactly once, on the join
    /// that appends the second distinct member; the returned
    /// [`JoinOutcome::Matched`] carries both role assignments, computed
    /// from list positions inside the critical section.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionFull`] if the session already has
    /// two members; the player is not admitted in any form.
    pub async fn join(
        &self,
        session_key: &str,
        player_id: &str,
    ) -> Result<JoinOutcome, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_key.to_string())
            .or_insert_with(|| Session {
                key: session_key.to_string(),
                members: Vec::new(),
                state: SessionState::Waiting,
            });

        if session.members.iter().any(|m| m == player_id) {
            return Ok(JoinOutcome::AlreadyMember {
                members: session.members.clone(),
            });
        }
        if session.members.len() >= SESSION_CAPACITY {
            return Err(SessionError::SessionFull {
                session_key: session_key.to_string(),
            });
        }

        session.members.push(player_id.to_string());

        if session.members.len() == SESSION_CAPACITY && session.state == SessionState::Waiting {
            session.state = SessionState::Active;
            let assignments = [
                RoleAssignment {
                    player_id: session.members[0].clone(),
                    role: Role::A,
                },
                RoleAssignment {
                    player_id: session.members[1].clone(),
                    role: Role::B,
                },
            ];
            return Ok(JoinOutcome::Matched {
                members: session.members.clone(),
                assignments,
            });
        }

        Ok(JoinOutcome::Joined {
            members: session.members.clone(),
        })
    }

    /// Removes a player from every session containing it (at most one in
    /// practice) and prunes sessions left empty.
    ///
    /// Returns one [`LeaveUpdate`] per affected session so the caller can
    /// notify the remaining member. Safe to call for a player in no
    /// session — the result is simply empty.
    pub async fn leave(&self, player_id: &str) -> Vec<LeaveUpdate> {
        let mut sessions = self.sessions.write().await;
        let mut updates = Vec::new();
        sessions.retain(|key, session| {
            let had = session.members.len();
            session.members.retain(|m| m != player_id);
            if session.members.len() == had {
                return true;
            }
            updates.push(LeaveUpdate {
                session_key: key.clone(),
                remaining: session.members.clone(),
            });
            !session.members.is_empty()
        });
        updates
    }

    /// Returns a snapshot of a session's member list, or `None` for an
    /// unknown key.
    pub async fn members(&self, session_key: &str) -> Option<Vec<String>> {
        let sessions = self.sessions.read().await;
        sessions.get(session_key).map(|s| s.members.clone())
    }

    /// Returns a full snapshot of a session, if it exists.
    pub async fn get(&self, session_key: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(session_key).cloned()
    }

    /// Number of sessions currently in the registry.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}
