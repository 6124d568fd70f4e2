use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::{error, info};
use uuid::Uuid;

use kin_chat::ChatService;
use kin_db::models::NewUser;
use kin_gateway::dispatcher::Dispatcher;
use kin_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;

/// Issued tokens stay valid for 30 days.
const TOKEN_LIFETIME_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

/// Run blocking work (DB, password hashing) off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(ApiError::internal)
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    // Validate input
    let username = req.username.trim().to_string();
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::bad_request("Username must be 3 to 32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("Password must be at least 8 characters"));
    }
    let email = req.email.trim().to_string();
    if !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email"));
    }
    let full_name = req
        .full_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| username.clone());

    let user_id = Uuid::new_v4();
    let db = state.chat.db().clone();
    let uid = user_id.to_string();
    let name = username.clone();
    let password = req.password;
    let created = blocking(move || {
        if db.get_user_by_username(&name)?.is_some() || db.get_user_by_email(&email)?.is_some() {
            return Ok(false);
        }

        // Hash password with Argon2id
        let password_hash = hash_password(&password)?;
        db.create_user(&NewUser {
            id: &uid,
            username: &name,
            email: &email,
            full_name: &full_name,
            password_hash: &password_hash,
        })?;
        Ok(true)
    })
    .await?;

    if !created {
        return Err(ApiError::Conflict("Username or email already taken".into()));
    }

    let token = create_token(&state.jwt_secret, user_id, &username).map_err(ApiError::internal)?;
    info!("Registered {} ({})", username, user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let db = state.chat.db().clone();
    let user = blocking(move || {
        let Some(user) = db.get_user_by_email(req.email.trim())? else {
            return Ok(None);
        };
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored hash for {} is corrupt: {}", user.id, e))?;
        let verified = Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_ok();
        Ok(verified.then_some(user))
    })
    .await?
    .ok_or(ApiError::BadCredentials)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::internal(anyhow::anyhow!("corrupt user id {}: {}", user.id, e)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username).map_err(ApiError::internal)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("argon2 hashing failed: {}", e))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
