//! peer-relay server entry point.
//!
//! Starts the hub and the Axum HTTP server with the WebSocket endpoint and
//! static file serving.

use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use peer_relay::api;
use peer_relay::app_state::AppState;
use peer_relay::config::{LogFormat, RelayConfig};
use peer_relay::domain::{Hub, UuidIdentity};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = RelayConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    tracing::info!(
        addr = %config.listen_addr,
        static_dir = %config.static_dir.display(),
        "starting peer-relay"
    );

    // Start the hub
    let hub = Hub::spawn(config.hub_event_capacity, config.drop_policy);

    // Build application state
    let app_state = AppState {
        hub,
        identities: Arc::new(UuidIdentity),
        limits: config.limits,
    };

    let app = api::build_app(app_state, &config.static_dir);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
