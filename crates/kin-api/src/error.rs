use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use kin_chat::ChatError;
use kin_types::api::ErrorBody;

/// Everything a handler can fail with, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid email or password")]
    BadCredentials,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Chat(ChatError::Internal(err.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Chat(ChatError::Unauthenticated) | Self::BadCredentials => StatusCode::UNAUTHORIZED,
            Self::Chat(ChatError::Forbidden(_)) => StatusCode::FORBIDDEN,
            Self::Chat(ChatError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Chat(ChatError::InvalidInput(_)) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Chat(ChatError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected request body: {}", rejection.body_text());
        Self::BadRequest("Invalid data".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Chat(ChatError::Internal(e)) = &self {
            error!("request failed: {:#}", e);
        }
        let status = self.status();
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
