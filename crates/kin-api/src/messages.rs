use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use uuid::Uuid;

use kin_types::api::{Claims, SendMessageRequest};
use kin_types::models::Message;

use crate::auth::AppState;
use crate::chats::parse_chat_id;
use crate::error::ApiError;

/// Persist a message and fan it out to the chat's realtime room.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(req) = payload?;

    let chat_id = req.chat_id.as_deref().and_then(|id| id.parse::<Uuid>().ok());
    let (Some(chat_id), Some(content)) = (chat_id, req.content) else {
        return Err(ApiError::bad_request("Invalid data"));
    };

    let appended = state.chat.append_message(chat_id, claims.sub, &content).await?;
    state.dispatcher.publish_message(&appended, None).await;

    Ok(Json(appended.message))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let chat_id = parse_chat_id(&chat_id)?;
    Ok(Json(state.chat.list_messages(chat_id, claims.sub).await?))
}
