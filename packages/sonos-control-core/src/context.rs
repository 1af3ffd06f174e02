//! Network configuration context.
//!
//! This module provides [`NetworkContext`], which knows the address speakers
//! can reach this host at. It supports both explicit configuration and
//! auto-detection of the local IP.

use std::net::IpAddr;
#[cfg(test)]
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol_constants::STATIC_MOUNT;

/// Network configuration shared across services.
///
/// # Modes
///
/// - **Explicit**: the advertise IP comes from configuration.
///   Use [`NetworkContext::explicit`].
/// - **Auto-detect**: the local IP is detected from the network interfaces.
///   Use [`NetworkContext::auto_detect`].
#[derive(Clone)]
pub struct NetworkContext {
    /// Server port.
    pub port: Arc<RwLock<u16>>,
    /// IP address that speakers can reach us at.
    pub local_ip: Arc<RwLock<String>>,
    /// IP detector for re-checking the address (auto-detect mode only).
    ip_detector: Option<Arc<dyn IpDetector>>,
}

impl NetworkContext {
    /// Creates a `NetworkContext` with an explicit advertise IP.
    #[must_use]
    pub fn explicit(bind_port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            port: Arc::new(RwLock::new(bind_port)),
            local_ip: Arc::new(RwLock::new(advertise_ip.to_string())),
            ip_detector: None,
        }
    }

    /// Creates a `NetworkContext` whose IP comes from `ip_detector`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial IP detection fails.
    pub fn auto_detect(
        bind_port: u16,
        ip_detector: Arc<dyn IpDetector>,
    ) -> Result<Self, NetworkError> {
        let local_ip = ip_detector.detect()?;
        Ok(Self {
            port: Arc::new(RwLock::new(bind_port)),
            local_ip: Arc::new(RwLock::new(local_ip)),
            ip_detector: Some(ip_detector),
        })
    }

    /// Creates a `NetworkContext` for testing with a fixed IP.
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::explicit(5005, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)))
    }

    /// Detects the current local IP address using the configured detector.
    pub fn detect_ip(&self) -> Result<String, NetworkError> {
        match &self.ip_detector {
            Some(detector) => detector.detect(),
            None => Err(NetworkError::NoDetector),
        }
    }

    /// Re-runs detection and stores a changed address.
    ///
    /// Explicit contexts keep their configured address.
    pub fn refresh_local_ip(&self) {
        if self.ip_detector.is_none() {
            return;
        }
        match self.detect_ip() {
            Ok(ip) if ip != self.get_local_ip() => {
                log::info!("[Network] Local IP changed: {} -> {}", self.get_local_ip(), ip);
                self.set_local_ip(ip);
            }
            Ok(_) => {}
            Err(e) => log::warn!("[Network] IP detection failed: {}", e),
        }
    }

    /// Returns the current port value.
    #[must_use]
    pub fn get_port(&self) -> u16 {
        *self.port.read()
    }

    /// Returns the current local IP.
    #[must_use]
    pub fn get_local_ip(&self) -> String {
        self.local_ip.read().clone()
    }

    /// Sets the port.
    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
    }

    /// Updates the local IP address.
    pub fn set_local_ip(&self, ip: String) {
        *self.local_ip.write() = ip;
    }

    /// Returns a `UrlBuilder` for the current network configuration.
    #[must_use]
    pub fn url_builder(&self) -> UrlBuilder {
        UrlBuilder::new(self.get_local_ip(), self.get_port())
    }

    /// Returns the URL a speaker fetches `file` from.
    #[must_use]
    pub fn static_url(&self, file: &str) -> String {
        self.url_builder().static_url(file)
    }
}

/// Trait for detecting the local IP address.
pub trait IpDetector: Send + Sync {
    /// Detects the local IP address.
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Default IP detector using the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    /// Creates a new `LocalIpDetector` wrapped in an Arc.
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Could not detect local IP address.
    #[error("Failed to detect local IP: {0}")]
    Detection(String),

    /// No IP detector configured (explicit mode).
    #[error("No IP detector configured (using explicit mode)")]
    NoDetector,
}

/// Builder for URLs served by this host.
pub struct UrlBuilder {
    ip: String,
    port: u16,
}

impl UrlBuilder {
    /// Creates a new `UrlBuilder` for the given server address.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Returns the base URL for the server (e.g., `http://192.168.1.100:5005`).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    /// Returns the URL of `file` under the static mount.
    #[must_use]
    pub fn static_url(&self, file: &str) -> String {
        format!("{}{}/{}", self.base_url(), STATIC_MOUNT, file)
    }

    /// Returns the server-sent events URL.
    #[must_use]
    pub fn events_url(&self) -> String {
        format!("{}/events", self.base_url())
    }
}
