use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use kin_chat::ChatError;
use kin_gateway::handshake::{bearer_token, verify_token};

use crate::auth::AppState;
use crate::error::ApiError;

/// Validate the bearer token (or legacy `auth-token` header) and expose the
/// claims to handlers as an extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ChatError::Unauthenticated)?;
    let claims = verify_token(token, &state.jwt_secret)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
