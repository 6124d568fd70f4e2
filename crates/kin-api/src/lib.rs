//! REST surface of the chat backend: the auth service plus the chat routes.

pub mod auth;
pub mod chats;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod users;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// Public auth routes plus the token-protected chat routes.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/chats", get(chats::list_chats))
        .route("/api/chats/access", post(chats::access_chat))
        .route("/api/chats/group", post(chats::create_group))
        .route("/api/chats/friends", get(chats::list_friends))
        .route("/api/chats/message", post(messages::send_message))
        .route("/api/chats/messages/{chat_id}", get(messages::list_messages))
        .route("/api/chats/{chat_id}", delete(chats::delete_chat))
        .route("/api/users/friends", post(users::add_friend))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
