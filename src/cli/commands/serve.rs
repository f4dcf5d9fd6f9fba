use anyhow::Context;

use crate::app::{app, AppState};
use crate::config::config;
use crate::database::{open_store, DatabaseManager};

/// Open the configured store and serve until the process is stopped
pub async fn handle(port: Option<u16>) -> anyhow::Result<()> {
    let config = config();
    tracing::info!("Starting eventmaster-api in {:?} mode", config.environment);

    let store = open_store().await.context("failed to open document store")?;
    tracing::info!("Using {} store", store.backend_name());

    let port = port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app(AppState::new(store)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    DatabaseManager::close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
