use std::sync::Arc;

use tracing::{info, warn};

use kin_api::auth::{AppState, AppStateInner};
use kin_chat::ChatService;
use kin_db::Database;
use kin_gateway::dispatcher::Dispatcher;
use kin_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kin=debug,kin_server=debug,kin_api=debug,kin_gateway=debug,kin_chat=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    // Shared state
    let chat = ChatService::new(db, config.cache_ttl);
    let state: AppState = Arc::new(AppStateInner {
        dispatcher: Dispatcher::new(chat.clone()),
        chat,
        jwt_secret: config.jwt_secret.clone(),
    });

    let cors = kin_server::cors_layer(config.cors_origins.as_deref())?;
    let app = kin_server::build_router(state, cors);

    let addr = config.addr()?;
    info!("Kin server listening on {}", addr);
    info!("Cache TTL: {}s", config.cache_ttl.as_secs());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("Received Ctrl+C, shutting down...");
    }
}
