use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kin_chat::{AppendedMessage, ChatError, ChatService};
use kin_types::events::{ClientEvent, ServerEvent};

use crate::rooms::RoomRegistry;
use crate::session::Session;

/// Routes inbound realtime events to the chat core and fans results out to
/// the rooms they concern.
#[derive(Clone)]
pub struct Dispatcher {
    rooms: RoomRegistry,
    chat: ChatService,
}

impl Dispatcher {
    pub fn new(chat: ChatService) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            chat,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Register an authenticated connection and queue its `ready` event.
    pub async fn connect(
        &self,
        user_id: Uuid,
        username: String,
    ) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (conn_id, rx) = self.rooms.register(user_id).await;
        self.rooms
            .send_to(
                conn_id,
                ServerEvent::Ready {
                    user_id,
                    username: username.clone(),
                },
            )
            .await;
        info!("{} ({}) connected as {}", username, user_id, conn_id);
        (Session::new(conn_id, user_id, username), rx)
    }

    /// Drop the connection from the room table.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let rooms = self.rooms.unregister(conn_id).await;
        debug!("conn {} unregistered, left {} rooms", conn_id, rooms);
    }

    /// Parse and handle one text frame from `session`'s socket.
    pub async fn handle_text(&self, session: &mut Session, text: &str) {
        if !session.is_open() {
            return;
        }

        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(session, event).await,
            Err(e) => {
                warn!(
                    "{} ({}) bad event: {} -- raw: {}",
                    session.username,
                    session.user_id,
                    e,
                    truncate(text, 200)
                );
                self.rooms
                    .send_to(session.conn_id, ServerEvent::error("Malformed event"))
                    .await;
            }
        }
    }

    pub async fn handle_event(&self, session: &mut Session, event: ClientEvent) {
        if !session.is_open() {
            return;
        }

        match event {
            ClientEvent::JoinChat { chat_id } => {
                session.join(chat_id);
                self.rooms.join(session.conn_id, chat_id).await;
                debug!("{} joined room {}", session.username, chat_id);
            }

            ClientEvent::LeaveChat { chat_id } => {
                session.leave(chat_id);
                self.rooms.leave(session.conn_id, chat_id).await;
                debug!("{} left room {}", session.username, chat_id);
            }

            ClientEvent::SendMessage { chat_id, content } => {
                match self.chat.append_message(chat_id, session.user_id, &content).await {
                    Ok(appended) => {
                        self.publish_message(&appended, Some(session.conn_id)).await;
                    }
                    Err(e) => self.report(session, chat_id, e).await,
                }
            }

            ClientEvent::Typing { chat_id } => {
                self.relay_typing(session, chat_id, ServerEvent::Typing {
                    chat_id,
                    user_id: session.user_id,
                })
                .await;
            }

            ClientEvent::StopTyping { chat_id } => {
                self.relay_typing(session, chat_id, ServerEvent::StopTyping {
                    chat_id,
                    user_id: session.user_id,
                })
                .await;
            }
        }
    }

    /// Fan a persisted message out to the chat's room, restricted to
    /// connections of current members. The sending connection, if any, gets
    /// its own copy even when it never joined the room.
    pub async fn publish_message(&self, appended: &AppendedMessage, sender_conn: Option<Uuid>) -> usize {
        let chat_id = appended.message.chat_id;
        let event = ServerEvent::ReceiveMessage(appended.message.clone());
        let members = &appended.members;

        let mut delivered = self
            .rooms
            .broadcast_to_room(chat_id, &event, None, |user| members.contains(&user))
            .await;

        if let Some(conn_id) = sender_conn {
            if !self.rooms.is_in_room(conn_id, chat_id).await && self.rooms.send_to(conn_id, event).await {
                delivered += 1;
            }
        }

        debug!("message {} delivered to {} connections", appended.message.id, delivered);
        delivered
    }

    async fn relay_typing(&self, session: &Session, chat_id: Uuid, event: ServerEvent) {
        if !session.in_room(chat_id) {
            debug!("{} typing in unjoined room {}, ignored", session.username, chat_id);
            return;
        }
        self.rooms
            .broadcast_to_room(chat_id, &event, Some(session.conn_id), |_| true)
            .await;
    }

    /// Unicast a failed operation back to the originating connection.
    async fn report(&self, session: &Session, chat_id: Uuid, err: ChatError) {
        let message = match &err {
            ChatError::Internal(e) => {
                error!("sendMessage from {} to chat {} failed: {:#}", session.user_id, chat_id, e);
                "Failed to send message".to_string()
            }
            other => {
                warn!("sendMessage from {} to chat {} rejected: {}", session.user_id, chat_id, other);
                other.to_string()
            }
        };
        self.rooms.send_to(session.conn_id, ServerEvent::error(message)).await;
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kin_chat::DEFAULT_CACHE_TTL;
    use kin_db::Database;
    use kin_db::models::NewUser;
    use kin_types::models::Chat;

    use super::*;

    struct Harness {
        dispatcher: Dispatcher,
        chat: ChatService,
    }

    impl Harness {
        fn new() -> Self {
            let db = Arc::new(Database::open_in_memory().unwrap());
            let chat = ChatService::new(db, DEFAULT_CACHE_TTL);
            Self {
                dispatcher: Dispatcher::new(chat.clone()),
                chat,
            }
        }

        fn user(&self, name: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.chat
                .db()
                .create_user(&NewUser {
                    id: &id.to_string(),
                    username: name,
                    email: &format!("{}@x.com", name),
                    full_name: &format!("{} full", name),
                    password_hash: "x",
                })
                .unwrap();
            id
        }

        async fn direct(&self, a: Uuid, b_name: &str) -> Chat {
            let email = format!("{}@x.com", b_name);
            self.chat
                .access_or_create_direct_chat(a, Some(email.as_str()))
                .await
                .unwrap()
        }

        async fn connect(&self, user_id: Uuid, name: &str) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
            let (session, mut rx) = self.dispatcher.connect(user_id, name.to_string()).await;
            assert!(matches!(rx.try_recv(), Ok(ServerEvent::Ready { .. })));
            (session, rx)
        }

        async fn send(&self, session: &mut Session, event: serde_json::Value) {
            self.dispatcher.handle_text(session, &event.to_string()).await;
        }
    }

    fn join(chat_id: Uuid) -> serde_json::Value {
        serde_json::json!({ "type": "joinChat", "data": { "chatId": chat_id } })
    }

    fn send_message(chat_id: Uuid, content: &str) -> serde_json::Value {
        serde_json::json!({ "type": "sendMessage", "data": { "chatId": chat_id, "content": content } })
    }

    #[tokio::test]
    async fn message_reaches_room_and_sender() {
        let h = Harness::new();
        let a = h.user("alice");
        let b = h.user("bob");
        let chat = h.direct(a, "bob").await;

        let (mut sa, mut rxa) = h.connect(a, "alice").await;
        let (mut sb, mut rxb) = h.connect(b, "bob").await;
        h.send(&mut sb, join(chat.id)).await;

        // Alice never joined; she still gets her own message back
        h.send(&mut sa, send_message(chat.id, "hi")).await;

        let Ok(ServerEvent::ReceiveMessage(got)) = rxb.try_recv() else {
            panic!("bob should receive the message");
        };
        assert_eq!(got.content, "hi");
        assert_eq!(got.chat_id, chat.id);
        assert_eq!(got.sender.id, a);
        assert_eq!(got.sender.username, "alice");

        let Ok(ServerEvent::ReceiveMessage(echo)) = rxa.try_recv() else {
            panic!("alice should receive her own message");
        };
        assert_eq!(echo.id, got.id);
        assert!(rxa.try_recv().is_err());
        assert!(rxb.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_member_gets_error_and_nothing_is_sent() {
        let h = Harness::new();
        let a = h.user("alice");
        let b = h.user("bob");
        let c = h.user("carol");
        let chat = h.direct(a, "bob").await;

        let (mut sb, mut rxb) = h.connect(b, "bob").await;
        let (mut sc, mut rxc) = h.connect(c, "carol").await;
        h.send(&mut sb, join(chat.id)).await;
        // Joining is not authorized; sending is
        h.send(&mut sc, join(chat.id)).await;

        h.send(&mut sc, send_message(chat.id, "intrusion")).await;

        match rxc.try_recv() {
            Ok(ServerEvent::Error { message }) => assert_eq!(message, "Not a member of this chat"),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(rxb.try_recv().is_err());
        assert!(h.chat.list_messages(chat.id, a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outsider_in_room_does_not_receive_messages() {
        let h = Harness::new();
        let a = h.user("alice");
        let b = h.user("bob");
        let c = h.user("carol");
        let chat = h.direct(a, "bob").await;

        let (mut sb, mut rxb) = h.connect(b, "bob").await;
        let (mut sc, mut rxc) = h.connect(c, "carol").await;
        h.send(&mut sb, join(chat.id)).await;
        h.send(&mut sc, join(chat.id)).await;

        let appended = h.chat.append_message(chat.id, a, "private").await.unwrap();
        assert_eq!(h.dispatcher.publish_message(&appended, None).await, 1);

        assert!(matches!(rxb.try_recv(), Ok(ServerEvent::ReceiveMessage(_))));
        assert!(rxc.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_skips_sender_and_requires_join() {
        let h = Harness::new();
        let a = h.user("alice");
        let b = h.user("bob");
        let chat = h.direct(a, "bob").await;

        let (mut sa, mut rxa) = h.connect(a, "alice").await;
        let (mut sb, mut rxb) = h.connect(b, "bob").await;
        h.send(&mut sb, join(chat.id)).await;

        // Not joined yet: dropped
        h.send(&mut sa, serde_json::json!({ "type": "typing", "data": { "chatId": chat.id } }))
            .await;
        assert!(rxb.try_recv().is_err());

        h.send(&mut sa, join(chat.id)).await;
        h.send(&mut sa, serde_json::json!({ "type": "typing", "data": { "chatId": chat.id } }))
            .await;
        h.send(&mut sa, serde_json::json!({ "type": "stopTyping", "data": { "chatId": chat.id } }))
            .await;

        assert_eq!(
            rxb.try_recv().unwrap(),
            ServerEvent::Typing { chat_id: chat.id, user_id: a }
        );
        assert_eq!(
            rxb.try_recv().unwrap(),
            ServerEvent::StopTyping { chat_id: chat.id, user_id: a }
        );
        assert!(rxa.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_events_get_error_unicast() {
        let h = Harness::new();
        let a = h.user("alice");
        let b = h.user("bob");
        let chat = h.direct(a, "bob").await;

        let (mut sa, mut rxa) = h.connect(a, "alice").await;
        let (mut sb, mut rxb) = h.connect(b, "bob").await;
        h.send(&mut sa, join(chat.id)).await;
        h.send(&mut sb, join(chat.id)).await;

        h.dispatcher.handle_text(&mut sa, "not json").await;
        h.send(&mut sa, serde_json::json!({ "type": "shout", "data": { "chatId": chat.id } }))
            .await;
        h.send(&mut sa, serde_json::json!({ "type": "sendMessage", "data": { "chatId": chat.id } }))
            .await;

        for _ in 0..3 {
            assert_eq!(rxa.try_recv().unwrap(), ServerEvent::error("Malformed event"));
        }
        assert!(rxb.try_recv().is_err());
    }

    #[tokio::test]
    async fn blank_content_is_rejected() {
        let h = Harness::new();
        let a = h.user("alice");
        h.user("bob");
        let chat = h.direct(a, "bob").await;

        let (mut sa, mut rxa) = h.connect(a, "alice").await;
        h.send(&mut sa, send_message(chat.id, "  ")).await;
        assert_eq!(rxa.try_recv().unwrap(), ServerEvent::error("Invalid data"));
    }

    #[tokio::test]
    async fn disconnect_clears_rooms_and_closed_sessions_are_ignored() {
        let h = Harness::new();
        let a = h.user("alice");
        h.user("bob");
        let chat = h.direct(a, "bob").await;

        let (mut sa, mut rxa) = h.connect(a, "alice").await;
        h.send(&mut sa, join(chat.id)).await;
        assert_eq!(h.dispatcher.rooms().room_size(chat.id).await, 1);

        sa.close();
        h.dispatcher.disconnect(sa.conn_id).await;
        assert_eq!(h.dispatcher.rooms().room_size(chat.id).await, 0);
        assert_eq!(h.dispatcher.rooms().connection_count().await, 0);

        h.send(&mut sa, send_message(chat.id, "ghost")).await;
        assert!(rxa.try_recv().is_err());
        assert!(h.chat.list_messages(chat.id, a).await.unwrap().is_empty());
    }
}
