use axum::routing::get;
use axum::Router;
use heli_server::config::ServerConfig;
use heli_server::session::{run_session, SessionBroadcast, SessionCommand};
use heli_server::ws::{ws_handler, AppState};
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid server configuration");
        std::process::exit(1);
    }

    let (session_tx, session_rx) = mpsc::channel::<SessionCommand>(config.command_capacity);
    let (broadcast_tx, _) = broadcast::channel::<SessionBroadcast>(config.broadcast_capacity);

    // Spawn the session task
    let bc_tx = broadcast_tx.clone();
    tokio::spawn(async move {
        run_session(session_rx, bc_tx).await;
    });

    // Axum app
    let app_state = AppState {
        session_tx,
        broadcast_tx,
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!("Starting helicopter relay on {}", config.listen_addr);

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.listen_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
