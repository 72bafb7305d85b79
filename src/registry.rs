//! Session registry
//!
//! The in-memory authority mapping each live connection to its authenticated
//! identity and current channel. A [`Session`] exists for a connection if and
//! only if that connection has passed the handshake and has not yet
//! disconnected. The registry is owned by the `ChatServer` actor, so every
//! operation here (in particular the taken-check folded into
//! [`SessionRegistry::try_register`]) runs as one critical section.

use std::collections::HashMap;

use thiserror::Error;

use crate::message::UserRef;
use crate::types::ConnectionId;

/// Registration failed because a live session already holds the username
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Nickname already in use.")]
pub struct NicknameInUse;

/// One authenticated connection's record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub current_channel: String,
}

impl Session {
    /// The `{id, name}` wire reference for this session's user
    pub fn user_ref(&self) -> UserRef {
        UserRef {
            id: self.user_id.clone(),
            name: self.username.clone(),
        }
    }
}

/// Live-session table: ConnectionId -> Session
///
/// Username uniqueness is enforced across live sessions only; the durable
/// user directory is not consulted here.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, failing if the username is already live.
    ///
    /// The uniqueness check and the insert are one operation so two
    /// concurrent handshakes for the same name cannot both succeed.
    pub fn try_register(
        &mut self,
        connection_id: ConnectionId,
        user_id: String,
        username: String,
        channel_id: String,
    ) -> Result<(), NicknameInUse> {
        if self.is_username_taken(&username) {
            return Err(NicknameInUse);
        }
        self.sessions.insert(
            connection_id,
            Session {
                user_id,
                username,
                current_channel: channel_id,
            },
        );
        Ok(())
    }

    /// Remove and return the session, if any.
    ///
    /// Absence is routine: connections that never finished the handshake
    /// have no session, and repeated disconnect signals hit this path too.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection_id)
    }

    /// Whether any live session holds this username
    pub fn is_username_taken(&self, username: &str) -> bool {
        self.sessions.values().any(|s| s.username == username)
    }

    pub fn lookup(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    /// Snapshot of everyone online as `{id, name}` references
    pub fn online_users(&self) -> Vec<UserRef> {
        self.sessions.values().map(Session::user_ref).collect()
    }

    /// Connections whose session is currently in the given channel
    pub fn connections_in_channel(&self, channel_id: &str) -> Vec<ConnectionId> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.current_channel == channel_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// All registered connections
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
