use std::collections::HashSet;

use uuid::Uuid;

/// Lifecycle of a realtime connection.
///
/// `Connecting` only exists before the upgrade handshake has verified a
/// token; a [`Session`] is created already authenticated, so in practice it
/// moves `Authenticated → Disconnected` once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Disconnected,
}

/// Per-connection state, owned by the task reading that connection's socket.
/// Never shared and never persisted.
#[derive(Debug)]
pub struct Session {
    pub conn_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    state: SessionState,
    rooms: HashSet<Uuid>,
}

impl Session {
    pub fn new(conn_id: Uuid, user_id: Uuid, username: String) -> Self {
        Self {
            conn_id,
            user_id,
            username,
            state: SessionState::Authenticated,
            rooms: HashSet::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Returns true if the room was not joined before.
    pub fn join(&mut self, chat_id: Uuid) -> bool {
        self.is_open() && self.rooms.insert(chat_id)
    }

    /// Returns true if the room was joined before.
    pub fn leave(&mut self, chat_id: Uuid) -> bool {
        self.rooms.remove(&chat_id)
    }

    pub fn in_room(&self, chat_id: Uuid) -> bool {
        self.rooms.contains(&chat_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drop all room memberships; no further events are accepted.
    pub fn close(&mut self) {
        self.rooms.clear();
        self.state = SessionState::Disconnected;
    }
}
