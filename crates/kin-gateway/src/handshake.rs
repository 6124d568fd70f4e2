use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{DecodingKey, Validation, decode};

use kin_chat::ChatError;
use kin_types::api::Claims;

/// Header older clients put the raw token in.
pub const LEGACY_TOKEN_HEADER: &str = "auth-token";

/// Validate a session token and return its claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ChatError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ChatError::Unauthenticated)
}

/// Token from `Authorization: Bearer <t>`, falling back to the legacy header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    bearer
        .or_else(|| {
            headers
                .get(LEGACY_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
