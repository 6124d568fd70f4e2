use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use kin_api::auth::{AppState, AppStateInner, create_token};
use kin_chat::{ChatError, ChatService, DEFAULT_CACHE_TTL};
use kin_db::Database;
use kin_db::models::NewUser;
use kin_gateway::dispatcher::Dispatcher;
use kin_types::events::ServerEvent;

const SECRET: &str = "gateway-test-secret";

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
}

impl TestServer {
    async fn start() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let chat = ChatService::new(db, DEFAULT_CACHE_TTL);
        let state: AppState = Arc::new(AppStateInner {
            dispatcher: Dispatcher::new(chat.clone()),
            chat,
            jwt_secret: SECRET.into(),
        });

        let app = kin_server::build_router(state.clone(), kin_server::cors_layer(None).unwrap());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Creates `<name>` with email `<name>@x.com`; returns (id, token).
    fn user(&self, name: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        self.state
            .chat
            .db()
            .create_user(&NewUser {
                id: &id.to_string(),
                username: name,
                email: &format!("{}@x.com", name),
                full_name: &format!("{} Example", name),
                password_hash: "unused",
            })
            .unwrap();
        (id, create_token(SECRET, id, name).unwrap())
    }

    async fn connect(&self, token: &str) -> Ws {
        let url = format!("ws://{}/gateway?token={}", self.addr, token);
        let (mut ws, _) = connect_async(url).await.unwrap();
        assert!(matches!(next_event(&mut ws).await, ServerEvent::Ready { .. }));
        ws
    }

    async fn wait_for_room_size(&self, chat_id: Uuid, size: usize) {
        for _ in 0..100 {
            if self.state.dispatcher.rooms().room_size(chat_id).await == size {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {} never reached {} connections", chat_id, size);
    }
}

async fn send(ws: &mut Ws, event: serde_json::Value) {
    ws.send(Message::text(event.to_string())).await.unwrap();
}

async fn next_event(ws: &mut Ws) -> ServerEvent {
    let read = async {
        while let Some(frame) = ws.next().await {
            if let Message::Text(text) = frame.unwrap() {
                return serde_json::from_str::<ServerEvent>(text.as_str()).unwrap();
            }
        }
        panic!("socket closed");
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out waiting for an event")
}

async fn assert_silent(ws: &mut Ws) {
    let next = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(next.is_err(), "unexpected frame: {:?}", next);
}

#[tokio::test]
async fn handshake_requires_valid_token() {
    let server = TestServer::start().await;

    for url in [
        format!("ws://{}/gateway", server.addr),
        format!("ws://{}/gateway?token=bogus", server.addr),
    ] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
            other => panic!("expected 401, got {:?}", other.map(|_| ())),
        }
    }
    assert_eq!(server.state.dispatcher.rooms().connection_count().await, 0);
}

#[tokio::test]
async fn handshake_accepts_header_tokens() {
    let server = TestServer::start().await;
    let (u1, t1) = server.user("alice");

    let cases = [
        (format!("ws://{}/gateway", server.addr), "authorization", format!("Bearer {}", t1)),
        (format!("ws://{}/gateway", server.addr), "auth-token", t1.clone()),
        // A non-bearer scheme is ignored in favour of the query token
        (
            format!("ws://{}/gateway?token={}", server.addr, t1),
            "authorization",
            "Basic YWxpY2U6cHc=".to_string(),
        ),
    ];

    for (url, name, value) in cases {
        let mut req = url.into_client_request().unwrap();
        req.headers_mut().insert(name, value.parse().unwrap());
        let (mut ws, _) = connect_async(req).await.unwrap();
        match next_event(&mut ws).await {
            ServerEvent::Ready { user_id, .. } => assert_eq!(user_id, u1, "{}", name),
            other => panic!("expected ready, got {:?}", other),
        }
    }

    // Basic alone carries no usable token
    let mut req = format!("ws://{}/gateway", server.addr).into_client_request().unwrap();
    req.headers_mut().insert("authorization", "Basic YWxpY2U6cHc=".parse().unwrap());
    match connect_async(req).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
        other => panic!("expected 401, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn message_round_trip_and_delete() {
    let server = TestServer::start().await;
    let (u1, t1) = server.user("alice");
    let (_u2, t2) = server.user("bob");

    let chat = server
        .state
        .chat
        .access_or_create_direct_chat(u1, Some("bob@x.com"))
        .await
        .unwrap();

    let mut alice = server.connect(&t1).await;
    let mut bob = server.connect(&t2).await;

    send(&mut bob, serde_json::json!({ "type": "joinChat", "data": { "chatId": chat.id } })).await;
    server.wait_for_room_size(chat.id, 1).await;

    send(
        &mut alice,
        serde_json::json!({ "type": "sendMessage", "data": { "chatId": chat.id, "content": "hi" } }),
    )
    .await;

    let ServerEvent::ReceiveMessage(m1) = next_event(&mut bob).await else {
        panic!("bob expected receiveMessage");
    };
    assert_eq!(m1.content, "hi");
    assert_eq!(m1.chat_id, chat.id);
    assert_eq!(m1.sender.id, u1);
    assert_eq!(m1.sender.full_name, "alice Example");

    let ServerEvent::ReceiveMessage(echo) = next_event(&mut alice).await else {
        panic!("alice expected her own message");
    };
    assert_eq!(echo.id, m1.id);

    let stored = server.state.chat.get_chat(chat.id).await.unwrap();
    assert_eq!(stored.latest_message.map(|m| m.id), Some(m1.id));

    // Typing goes to the others in the room only
    send(&mut alice, serde_json::json!({ "type": "joinChat", "data": { "chatId": chat.id } })).await;
    server.wait_for_room_size(chat.id, 2).await;
    send(&mut alice, serde_json::json!({ "type": "typing", "data": { "chatId": chat.id } })).await;
    assert_eq!(
        next_event(&mut bob).await,
        ServerEvent::Typing { chat_id: chat.id, user_id: u1 }
    );
    assert_silent(&mut alice).await;

    server.state.chat.delete_chat(chat.id, u1).await.unwrap();
    let gone = server.state.chat.list_messages(chat.id, u1).await;
    assert!(matches!(gone, Err(ChatError::NotFound(_))));
}

#[tokio::test]
async fn non_member_send_is_rejected_privately() {
    let server = TestServer::start().await;
    let (u1, _) = server.user("alice");
    let (_, t2) = server.user("bob");
    let (_, t3) = server.user("mallory");

    let chat = server
        .state
        .chat
        .access_or_create_direct_chat(u1, Some("bob@x.com"))
        .await
        .unwrap();

    let mut bob = server.connect(&t2).await;
    let mut mallory = server.connect(&t3).await;
    send(&mut bob, serde_json::json!({ "type": "joinChat", "data": { "chatId": chat.id } })).await;
    send(&mut mallory, serde_json::json!({ "type": "joinChat", "data": { "chatId": chat.id } })).await;
    server.wait_for_room_size(chat.id, 2).await;

    send(
        &mut mallory,
        serde_json::json!({ "type": "sendMessage", "data": { "chatId": chat.id, "content": "psst" } }),
    )
    .await;

    assert!(matches!(next_event(&mut mallory).await, ServerEvent::Error { .. }));
    assert_silent(&mut bob).await;
    assert!(server.state.chat.list_messages(chat.id, u1).await.unwrap().is_empty());

    // Malformed frames are answered the same way
    mallory.send(Message::text("{\"type\":\"nope\"}")).await.unwrap();
    assert_eq!(next_event(&mut mallory).await, ServerEvent::error("Malformed event"));
}

#[tokio::test]
async fn disconnect_drops_room_membership() {
    let server = TestServer::start().await;
    let (u1, t1) = server.user("alice");
    server.user("bob");
    let chat = server
        .state
        .chat
        .access_or_create_direct_chat(u1, Some("bob@x.com"))
        .await
        .unwrap();

    let mut alice = server.connect(&t1).await;
    send(&mut alice, serde_json::json!({ "type": "joinChat", "data": { "chatId": chat.id } })).await;
    server.wait_for_room_size(chat.id, 1).await;

    alice.close(None).await.unwrap();
    server.wait_for_room_size(chat.id, 0).await;
    for _ in 0..100 {
        if server.state.dispatcher.rooms().connection_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connection was never unregistered");
}

#[tokio::test]
async fn join_racing_a_dropped_socket_leaves_no_stale_member() {
    let server = TestServer::start().await;
    let (u1, t1) = server.user("alice");
    server.user("bob");
    let chat = server
        .state
        .chat
        .access_or_create_direct_chat(u1, Some("bob@x.com"))
        .await
        .unwrap();

    for _ in 0..20 {
        let mut alice = server.connect(&t1).await;
        send(&mut alice, serde_json::json!({ "type": "joinChat", "data": { "chatId": chat.id } })).await;
        drop(alice);
    }

    for _ in 0..100 {
        if server.state.dispatcher.rooms().connection_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.state.dispatcher.rooms().connection_count().await, 0);
    assert_eq!(server.state.dispatcher.rooms().room_size(chat.id).await, 0);
}

#[tokio::test]
async fn health_check_responds() {
    let server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.ends_with("ok"), "{}", response);
}
