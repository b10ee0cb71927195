//! HTTP server module
//!
//! Provides the Axum-based HTTP server for serving metrics.

pub mod handlers;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::exporter::Exporter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub exporter: Arc<Exporter>,
    /// Metrics path the router was built with
    pub metrics_path: Arc<str>,
}

impl AppState {
    pub fn new(exporter: Arc<Exporter>) -> Self {
        let metrics_path = Arc::from(exporter.current().config().server.path.as_str());
        Self {
            exporter,
            metrics_path,
        }
    }
}

/// Build the router: `/`, `/health` and the configured metrics path
pub fn router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.to_string();
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(&metrics_path, get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parse a bind address. "localhost" maps to 127.0.0.1.
pub fn parse_bind_address(bind_address: &str) -> Result<IpAddr> {
    if bind_address == "localhost" {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    bind_address.parse().map_err(|e| {
        anyhow::anyhow!(
            "Invalid bind_address '{}': {}. Use an IP address (e.g., '0.0.0.0', '127.0.0.1') or 'localhost'.",
            bind_address,
            e
        )
    })
}

/// Run the HTTP server until a shutdown signal arrives
///
/// # Errors
/// Returns an error if the server fails to bind or serve
pub async fn run(exporter: Arc<Exporter>) -> Result<()> {
    let state = AppState::new(exporter);
    let (bind_address, port) = {
        let current = state.exporter.current();
        let server = &current.config().server;
        (parse_bind_address(&server.bind_address)?, server.port)
    };

    let addr = SocketAddr::from((bind_address, port));
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, metrics_path = %state.metrics_path, "Server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
