//! Router assembly for the kin server: REST routes, the realtime gateway
//! upgrade and the HTTP layers around them.

pub mod config;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use kin_api::auth::AppState;
use kin_api::error::ApiError;
use kin_chat::ChatError;
use kin_gateway::{connection, handshake};

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Permissive CORS unless an explicit origin list is configured.
pub fn cors_layer(origins: Option<&[String]>) -> anyhow::Result<CorsLayer> {
    let Some(origins) = origins else {
        return Ok(CorsLayer::permissive());
    };
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .merge(kin_api::router(state))
        .merge(ws_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

/// The token is checked before upgrading; a rejected handshake never gets a socket.
/// Headers are read the same way as on REST routes, with `?token=` as the
/// fallback for browser clients that cannot set headers.
async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = handshake::bearer_token(&headers).or(query.token.as_deref()) else {
        warn!("Gateway handshake without a token");
        return ApiError::from(ChatError::Unauthenticated).into_response();
    };

    match handshake::verify_token(token, &state.jwt_secret) {
        Ok(claims) => {
            let dispatcher = state.dispatcher.clone();
            ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, claims))
        }
        Err(e) => {
            warn!("Gateway handshake rejected: {}", e);
            ApiError::from(e).into_response()
        }
    }
}
