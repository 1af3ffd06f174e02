//! HTTP API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::context::NetworkContext;
use crate::events::EventBroadcaster;
use crate::services::DeviceRegistry;
use crate::state::Config;

pub mod http;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
#[derive(Clone)]
pub struct AppState {
    /// Current speakers and per-room locks.
    pub registry: Arc<DeviceRegistry>,
    /// Fan-out for `/events` subscribers.
    pub events: Arc<EventBroadcaster>,
    /// Network configuration (port, local IP).
    pub network: NetworkContext,
    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        events: Arc<EventBroadcaster>,
        network: NetworkContext,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            events,
            network,
            config,
        }
    }

    /// Directory served under the static mount.
    #[must_use]
    pub fn static_dir(&self) -> PathBuf {
        self.config.cache_dir.clone()
    }
}

/// Starts the HTTP server on the configured port and serves until `shutdown`
/// is cancelled.
///
/// A configured port of 0 binds an ephemeral port; the port actually bound is
/// stored in the network context either way so announcement URLs match.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let port = state.config.bind_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { port, source })?;
    let bound = listener.local_addr()?.port();

    state.network.set_port(bound);

    log::info!("[Server] Listening on http://0.0.0.0:{}", bound);
    let urls = state.network.url_builder();
    log::info!(
        "[Server] Announcements under {}, events at {}",
        urls.static_url(""),
        urls.events_url()
    );
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    log::info!("[Server] Stopped");
    Ok(())
}
