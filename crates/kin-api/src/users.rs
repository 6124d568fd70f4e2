use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};

use kin_types::api::{AddFriendRequest, Claims};
use kin_types::models::FriendProfile;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn add_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<AddFriendRequest>, JsonRejection>,
) -> Result<Json<FriendProfile>, ApiError> {
    let Json(req) = payload?;
    let friend = state.chat.add_friend(claims.sub, req.email.as_deref()).await?;
    Ok(Json(friend))
}
