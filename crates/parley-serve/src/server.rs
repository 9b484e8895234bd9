// ABOUTME: HTTP server setup and lifecycle for parley-serve.
// ABOUTME: Binds the router, waits for shutdown signals, drains bridge and registry.

use crate::routes::router;
use crate::AppState;
use anyhow::{Context, Result};
use parley_core::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

/// Drain window granted to in-flight bridge tasks at shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Run the chat-bot server until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<()> {
    info!("Starting parley server");
    info!("  Address: {}", config.bind_addr());
    info!("  Database: {}", config.db_path().display());

    let state = AppState::build(config).await?;

    // Preload active bots so the first webhook hit serves from cache.
    match state.registry.active_bots().await {
        Ok(bots) => info!(count = bots.len(), "preloaded active bots"),
        Err(e) => info!(error = %e, "could not preload active bots"),
    }
    let refresh_task = state.registry.spawn_refresh();

    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("Parley server listening on {addr}");

    axum::serve(listener, router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running HTTP server")?;

    // Stop the registry refresher, then drain the task bridge. The bridge
    // shutdown blocks while polling, so it runs off the async runtime.
    state.registry.shutdown();
    let _ = refresh_task.await;

    let bridge = Arc::clone(&state.bridge);
    tokio::task::spawn_blocking(move || bridge.shutdown(SHUTDOWN_DRAIN))
        .await
        .context("draining task bridge")?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
