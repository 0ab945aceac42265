//! Gateway service entry point.
//!
//! WebSocket gateway for real-time marketplace chat.

use anyhow::{Context, Result};
use chat_store::{RedisChatStore, RoomDirectory, UserDirectory};
use gateway::{create_router, AppState, GatewayConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting chat gateway");

    let config = GatewayConfig::from_env()?;

    info!("Configuration:");
    info!("  HTTP_PORT: {}", config.http_port);
    info!("  METRICS_PORT: {}", config.metrics_port);
    info!("  REDIS_URL: {}", config.redis_url);
    info!("  Allowed origins: {:?}", config.origins.allowed());
    info!(
        "  Timings: pong_wait={:?} ping_period={:?} write_wait={:?} max_message_size={}",
        config.timings.pong_wait,
        config.timings.ping_period,
        config.timings.write_wait,
        config.timings.max_message_size
    );

    // Start Prometheus metrics server
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()
        .context("Failed to start Prometheus exporter")?;
    info!("Prometheus metrics server started on port {}", config.metrics_port);

    // Connect to Redis
    info!("Connecting to Redis at {}", config.redis_url);
    let store = Arc::new(RedisChatStore::new(&config.redis_url)?);
    if let Err(e) = store.ping().await {
        error!("Redis is not reachable yet: {}", e);
    }
    let users: Arc<dyn UserDirectory> = store.clone();
    let rooms: Arc<dyn RoomDirectory> = store;

    let state = Arc::new(AppState::new(
        users,
        rooms,
        config.timings,
        config.origins.clone(),
    ));

    // Create HTTP router
    let app = create_router(state);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Gateway listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
