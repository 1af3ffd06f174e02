//! Speaker discovery on the local network.
//!
//! - `ssdp` - M-SEARCH probing over multicast and directed broadcast
//! - `types` - discovery results, handles and UUID normalization

pub mod ssdp;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;

pub use ssdp::SsdpConfig;
pub use types::{
    normalize_uuid, DiscoveredSpeaker, DiscoveryError, DiscoveryResult, Speaker,
};

use crate::sonos::traits::SpeakerDiscovery;

/// SSDP implementation of [`SpeakerDiscovery`].
#[derive(Debug, Clone, Default)]
pub struct SsdpDiscovery {
    config: SsdpConfig,
}

impl SsdpDiscovery {
    /// Creates a prober with the given SSDP settings.
    #[must_use]
    pub fn new(config: SsdpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SpeakerDiscovery for SsdpDiscovery {
    async fn probe(&self, timeout: Duration) -> DiscoveryResult<Vec<DiscoveredSpeaker>> {
        let config = SsdpConfig {
            discovery_timeout: timeout,
            ..self.config.clone()
        };
        ssdp::probe(&config).await
    }
}
