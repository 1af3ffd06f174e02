//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. The standalone server calls
//! [`bootstrap_services`]; tests call [`bootstrap_with`] to swap in fake
//! capabilities.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::AppState;
use crate::context::NetworkContext;
use crate::events::EventBroadcaster;
use crate::protocol_constants::SOAP_TIMEOUT_SECS;
use crate::services::{Announcer, DeviceRegistry, PlayerCommands, RegistryConfig};
use crate::sonos::discovery::{SsdpConfig, SsdpDiscovery};
use crate::sonos::{SonosClientImpl, SpeakerControl, SpeakerDiscovery, SpeakerTopology};
use crate::speech::{HttpSpeechRenderer, SpeechCache, SpeechRenderer};
use crate::state::Config;

/// Errors that can occur while wiring services.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The shared HTTP client could not be built.
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The speech cache directory could not be created.
    #[error("Failed to create cache directory {path}: {source}")]
    CacheDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Capability implementations the services are built on.
#[derive(Clone)]
pub struct Capabilities {
    speakers: Arc<dyn SpeakerControl>,
    topology: Arc<dyn SpeakerTopology>,
    discovery: Arc<dyn SpeakerDiscovery>,
    renderer: Arc<dyn SpeechRenderer>,
}

impl Capabilities {
    /// Bundles one device client with a prober and a speech renderer.
    pub fn new<S>(
        speakers: Arc<S>,
        discovery: Arc<dyn SpeakerDiscovery>,
        renderer: Arc<dyn SpeechRenderer>,
    ) -> Self
    where
        S: SpeakerControl + 'static,
    {
        Self {
            topology: Arc::clone(&speakers) as Arc<dyn SpeakerTopology>,
            speakers,
            discovery,
            renderer,
        }
    }
}

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Current speakers, per-room locks and the refresh loop.
    pub registry: Arc<DeviceRegistry>,
    /// Fan-out of change notifications.
    pub events: Arc<EventBroadcaster>,
    /// Per-room and household commands.
    pub players: Arc<PlayerCommands>,
    /// Spoken announcements.
    pub announcer: Arc<Announcer>,
    /// Rendered announcement cache.
    pub speech: Arc<SpeechCache>,
    /// Network configuration (port, local IP).
    pub network: NetworkContext,
    /// Configuration the services were built from.
    pub config: Arc<Config>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Runs the first discovery pass and starts the refresh loop.
    pub async fn start(&self) {
        self.registry.start().await;
    }

    /// Builds the state shared by the HTTP handlers.
    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.events),
            self.network.clone(),
            Arc::clone(&self.config),
        )
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to the server and other listeners
        self.cancel_token.cancel();

        self.registry.stop().await;

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for speaker and speech requests.
///
/// Using a shared client enables connection pooling.
fn create_http_client() -> Result<Client, BootstrapError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(SOAP_TIMEOUT_SECS))
        .build()?)
}

/// Bootstraps all services with the UPnP client, SSDP prober and HTTP speech
/// renderer.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the HTTP client cannot
/// be built, or the cache directory cannot be created.
pub fn bootstrap_services(
    config: Config,
    network: NetworkContext,
) -> Result<BootstrappedServices, BootstrapError> {
    let http_client = create_http_client()?;

    let capabilities = Capabilities::new(
        Arc::new(SonosClientImpl::new(http_client.clone())),
        Arc::new(SsdpDiscovery::new(SsdpConfig::default())),
        Arc::new(HttpSpeechRenderer::new(http_client)),
    );

    bootstrap_with(config, network, capabilities)
}

/// Bootstraps all services on the given capabilities.
///
/// The wiring order follows the dependencies:
///
/// 1. Event broadcaster
/// 2. Device registry (depends on topology, discovery, broadcaster)
/// 3. Speech cache (depends on renderer)
/// 4. Player commands and announcer (depend on all of the above)
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the cache directory
/// cannot be created.
pub fn bootstrap_with(
    config: Config,
    network: NetworkContext,
    capabilities: Capabilities,
) -> Result<BootstrappedServices, BootstrapError> {
    config.validate().map_err(BootstrapError::InvalidConfig)?;

    std::fs::create_dir_all(&config.cache_dir).map_err(|source| BootstrapError::CacheDir {
        path: config.cache_dir.display().to_string(),
        source,
    })?;

    let Capabilities {
        speakers,
        topology,
        discovery,
        renderer,
    } = capabilities;
    let retry = config.retry_policy();

    let events = Arc::new(EventBroadcaster::new(config.event_queue_capacity));

    let registry = Arc::new(DeviceRegistry::new(
        topology,
        discovery,
        Arc::clone(&events),
        RegistryConfig {
            refresh_interval: config.discovery_interval(),
            discovery_timeout: config.discovery_timeout(),
        },
    ));

    let speech = Arc::new(SpeechCache::new(config.cache_dir.clone(), renderer));

    let players = Arc::new(PlayerCommands::new(
        Arc::clone(&registry),
        Arc::clone(&speakers),
        Arc::clone(&events),
        retry.clone(),
    ));

    let announcer = Arc::new(Announcer::new(
        Arc::clone(&registry),
        speakers,
        Arc::clone(&speech),
        network.clone(),
        Arc::clone(&events),
        retry,
    ));

    // Announcement URLs must carry the port the server binds
    network.set_port(config.bind_port);

    log::info!(
        "[Bootstrap] Services ready (cache: {}, discovery every {}s)",
        config.cache_dir.display(),
        config.discovery_interval_secs
    );

    Ok(BootstrappedServices {
        registry,
        events,
        players,
        announcer,
        speech,
        network,
        config: Arc::new(config),
        cancel_token: CancellationToken::new(),
    })
}
