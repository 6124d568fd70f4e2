use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};
use uuid::Uuid;

use kin_types::events::ServerEvent;

struct ConnectionHandle {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Routing table for live connections and the chat rooms they joined.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RoomRegistryInner>,
}

#[derive(Default)]
struct RoomRegistryInner {
    /// conn_id -> outbound channel of that connection
    connections: RwLock<HashMap<Uuid, ConnectionHandle>>,

    /// chat_id -> conn_ids currently joined
    rooms: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `user_id`. Returns (conn_id, receiver).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, ConnectionHandle { user_id, tx });
        (conn_id, rx)
    }

    /// Forget a connection and drop it from every room. Returns how many
    /// rooms it was in.
    pub async fn unregister(&self, conn_id: Uuid) -> usize {
        self.inner.connections.write().await.remove(&conn_id);

        let mut rooms = self.inner.rooms.write().await;
        let mut left = 0;
        rooms.retain(|_, members| {
            if members.remove(&conn_id) {
                left += 1;
            }
            !members.is_empty()
        });
        left
    }

    /// Add a connection to a room. Idempotent; false for unknown connections.
    pub async fn join(&self, conn_id: Uuid, chat_id: Uuid) -> bool {
        if !self.inner.connections.read().await.contains_key(&conn_id) {
            return false;
        }
        self.inner
            .rooms
            .write()
            .await
            .entry(chat_id)
            .or_default()
            .insert(conn_id);
        true
    }

    /// Remove a connection from a room. Idempotent.
    pub async fn leave(&self, conn_id: Uuid, chat_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(&chat_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(&chat_id);
            }
        }
    }

    /// Send a targeted event to one connection.
    pub async fn send_to(&self, conn_id: Uuid, event: ServerEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&conn_id) {
            Some(handle) => handle.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver `event` to every connection in the room whose user passes
    /// `accept`, except `skip`. Returns the number of deliveries.
    pub async fn broadcast_to_room<F>(
        &self,
        chat_id: Uuid,
        event: &ServerEvent,
        skip: Option<Uuid>,
        accept: F,
    ) -> usize
    where
        F: Fn(Uuid) -> bool,
    {
        let rooms = self.inner.rooms.read().await;
        let Some(members) = rooms.get(&chat_id) else {
            trace!("broadcast to empty room {}", chat_id);
            return 0;
        };

        let connections = self.inner.connections.read().await;
        let mut delivered = 0;
        for conn_id in members {
            if Some(*conn_id) == skip {
                continue;
            }
            let Some(handle) = connections.get(conn_id) else {
                continue;
            };
            if !accept(handle.user_id) {
                debug!("skipping conn {} of non-member {} in room {}", conn_id, handle.user_id, chat_id);
                continue;
            }
            if handle.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn is_in_room(&self, conn_id: Uuid, chat_id: Uuid) -> bool {
        self.inner
            .rooms
            .read()
            .await
            .get(&chat_id)
            .is_some_and(|members| members.contains(&conn_id))
    }

    pub async fn room_size(&self, chat_id: Uuid) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(&chat_id)
            .map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
