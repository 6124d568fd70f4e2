use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use kin_types::api::{AccessChatRequest, Claims, CreateGroupRequest, DeleteChatResponse};
use kin_types::models::{Chat, FriendProfile};

use crate::auth::AppState;
use crate::error::ApiError;

pub(crate) fn parse_chat_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::bad_request("Invalid chat id"))
}

/// Open the direct chat with the user owning `email`, creating it on first use.
pub async fn access_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<AccessChatRequest>, JsonRejection>,
) -> Result<Json<Chat>, ApiError> {
    let Json(req) = payload?;
    let chat = state
        .chat
        .access_or_create_direct_chat(claims.sub, req.email.as_deref())
        .await?;
    Ok(Json(chat))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Chat>>, ApiError> {
    Ok(Json(state.chat.list_chats(claims.sub).await?))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let chat = state
        .chat
        .create_group_chat(claims.sub, req.name.as_deref(), &req.user_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

/// Members only. Removes the chat together with its messages.
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<DeleteChatResponse>, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    state.chat.delete_chat(chat_id, claims.sub).await?;
    info!("{} ({}) deleted chat {}", claims.username, claims.sub, chat_id);

    Ok(Json(DeleteChatResponse {
        success: true,
        chat_id,
    }))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<FriendProfile>>, ApiError> {
    Ok(Json(state.chat.list_friends(claims.sub).await?))
}
