use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the WebSocket gateway, server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Server confirms the authenticated identity bound to this connection
    Ready { user_id: Uuid, username: String },

    /// A message was persisted in a chat this connection has joined
    ReceiveMessage(Message),

    /// Another member started typing
    Typing { chat_id: Uuid, user_id: Uuid },

    /// Another member stopped typing
    StopTyping { chat_id: Uuid, user_id: Uuid },

    /// Unicast failure report for the event this connection just sent
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Events sent FROM client TO server over WebSocket.
///
/// Deserialization is strict: an unknown `type` or a missing field fails to
/// parse and is answered with [`ServerEvent::Error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase",
    deny_unknown_fields
)]
pub enum ClientEvent {
    /// Subscribe this connection to a chat room
    JoinChat { chat_id: Uuid },

    /// Unsubscribe this connection from a chat room
    LeaveChat { chat_id: Uuid },

    /// Persist a message and fan it out to the room
    SendMessage { chat_id: Uuid, content: String },

    Typing { chat_id: Uuid },

    StopTyping { chat_id: Uuid },
}

impl ClientEvent {
    /// Every client event is scoped to a chat.
    pub fn chat_id(&self) -> Uuid {
        match self {
            Self::JoinChat { chat_id }
            | Self::LeaveChat { chat_id }
            | Self::SendMessage { chat_id, .. }
            | Self::Typing { chat_id }
            | Self::StopTyping { chat_id } => *chat_id,
        }
    }
}
