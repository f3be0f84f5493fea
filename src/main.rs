//! Arena Round Server - relay rooms with an authoritative round coordinator
//!
//! This is the main entry point for the server. It handles:
//! - WebSocket connections, one peer per connection in a named room
//! - HTTP endpoints for health and room inspection
//! - Loading the arena layout asset shared by all rooms

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use arena_round_server::app::AppState;
use arena_round_server::assets::{load_arena_layout, DirAssetLoader};
use arena_round_server::config::Config;
use arena_round_server::http::build_router;
use arena_round_server::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Arena Round Server");
    info!("Server address: {}", config.server_addr);

    // Arena layout; falls back to the built-in arena on any failure
    let loader = DirAssetLoader::new(config.assets_dir.clone());
    let arena = load_arena_layout(&loader, &config.arena_name).await;
    let settings = config.match_settings(arena);
    info!(
        total_rounds = settings.total_rounds,
        min_players = settings.min_players,
        max_players = config.max_players_per_room,
        "Match settings ready"
    );

    // Create application state
    let state = AppState::new(config.clone(), settings);

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws?room=<name>", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
