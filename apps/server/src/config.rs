//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `SONOS_API_PORT`
    pub bind_port: u16,

    /// IP address to advertise to Sonos speakers in announcement URLs.
    /// If not specified, auto-detection will be attempted.
    /// Override: `SONOS_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Interval in seconds between background discovery passes.
    /// Override: `SONOS_DISCOVERY_INTERVAL`
    pub discovery_interval: u64,

    /// How long each discovery probe listens for answers (seconds).
    pub discovery_timeout: u64,

    /// Directory for rendered announcements, served under `/static`.
    /// Override: `SONOS_TTS_CACHE_DIR`
    pub tts_cache_dir: PathBuf,

    /// Capacity of each `/events` subscriber queue.
    pub event_queue_capacity: usize,

    /// Retries after the first attempt of a device operation.
    pub retry_max: u32,

    /// Pause before each retry (milliseconds).
    pub retry_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = sonos_control_core::Config::default();
        Self {
            bind_port: core.bind_port,
            advertise_ip: None,
            discovery_interval: core.discovery_interval_secs,
            discovery_timeout: core.discovery_timeout_secs,
            tts_cache_dir: core.cache_dir,
            event_queue_capacity: core.event_queue_capacity,
            retry_max: core.retry_max,
            retry_delay_ms: core.retry_delay_ms,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `SONOS_*` overrides looked up through `var`.
    ///
    /// Values that do not parse are ignored with a warning.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        override_with(&var, "SONOS_API_PORT", &mut self.bind_port);
        override_with(&var, "SONOS_DISCOVERY_INTERVAL", &mut self.discovery_interval);

        if let Some(val) = var("SONOS_ADVERTISE_IP") {
            match val.parse() {
                Ok(ip) => self.advertise_ip = Some(ip),
                Err(_) => log::warn!("Ignoring SONOS_ADVERTISE_IP={:?}: not an IP address", val),
            }
        }

        if let Some(val) = var("SONOS_TTS_CACHE_DIR") {
            if !val.trim().is_empty() {
                self.tts_cache_dir = PathBuf::from(val);
            }
        }

        // Note: SONOS_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to the core's Config type.
    pub fn to_core_config(&self) -> sonos_control_core::Config {
        sonos_control_core::Config {
            bind_port: self.bind_port,
            discovery_interval_secs: self.discovery_interval,
            discovery_timeout_secs: self.discovery_timeout,
            cache_dir: self.tts_cache_dir.clone(),
            event_queue_capacity: self.event_queue_capacity,
            retry_max: self.retry_max,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

fn override_with<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(val) = var(key) {
        match val.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => log::warn!("Ignoring {}={:?}: not a number", key, val),
        }
    }
}
