//! Core configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::DEFAULT_EVENT_QUEUE_CAPACITY;
use crate::retry::RetryPolicy;

/// Configuration for the control core.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Server
    /// Port for the HTTP server; also used in announcement URLs.
    pub bind_port: u16,

    // Discovery
    /// Interval between background discovery passes (seconds).
    pub discovery_interval_secs: u64,

    /// How long a discovery probe waits for answers (seconds).
    pub discovery_timeout_secs: u64,

    // Speech
    /// Directory holding rendered announcements, served under `/static`.
    pub cache_dir: PathBuf,

    // Events
    /// Capacity of each event subscriber queue.
    pub event_queue_capacity: usize,

    // Retry
    /// Retries after the first attempt of a device operation.
    pub retry_max: u32,

    /// Pause before each retry (milliseconds).
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_port: 5005,
            discovery_interval_secs: 30,
            discovery_timeout_secs: 5,
            cache_dir: PathBuf::from("static"),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            retry_max: 1,
            retry_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.discovery_interval_secs == 0 {
            return Err("discovery_interval_secs must be >= 1".to_string());
        }
        if self.discovery_timeout_secs == 0 {
            return Err("discovery_timeout_secs must be >= 1".to_string());
        }
        if self.event_queue_capacity == 0 {
            return Err("event_queue_capacity must be >= 1 (mpsc::channel panics on 0)".to_string());
        }
        Ok(())
    }

    /// Returns the background discovery interval.
    #[must_use]
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    /// Returns the discovery probe timeout.
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    /// Builds the retry policy for device operations.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max, Duration::from_millis(self.retry_delay_ms))
    }
}
