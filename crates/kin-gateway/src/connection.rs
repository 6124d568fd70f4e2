use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use kin_types::api::Claims;
use kin_types::events::ServerEvent;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one WebSocket connection whose token was verified at the upgrade.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, claims: Claims) {
    let (mut sender, mut receiver) = socket.split();

    let (mut session, mut rx) = dispatcher.connect(claims.sub, claims.username).await;
    let conn_id = session.conn_id;
    let user_id = session.user_id;
    let username = session.username.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Outbound: queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("failed to encode {} event: {}", event_kind(&event), e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Inbound: client events -> dispatcher
    let recv_dispatcher = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    recv_dispatcher.handle_text(&mut session, text.as_str()).await;
                }
                Message::Binary(_) => {
                    recv_dispatcher
                        .rooms()
                        .send_to(session.conn_id, ServerEvent::error("Malformed event"))
                        .await;
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Ping(_) => {}
            }
        }
        session.close();
    });

    // Both tasks are stopped before unregistering so no in-flight join can
    // re-add this connection.
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = &mut recv_task => {
            send_task.abort();
            let _ = send_task.await;
        }
    }

    dispatcher.disconnect(conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

fn event_kind(event: &ServerEvent) -> &'static str {
    match event {
        ServerEvent::Ready { .. } => "ready",
        ServerEvent::ReceiveMessage(_) => "receiveMessage",
        ServerEvent::Typing { .. } => "typing",
        ServerEvent::StopTyping { .. } => "stopTyping",
        ServerEvent::Error { .. } => "error",
    }
}
