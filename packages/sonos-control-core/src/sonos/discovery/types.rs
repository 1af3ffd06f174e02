//! Shared types for Sonos speaker discovery.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while probing the network.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to bind UDP socket for discovery.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// No usable network interfaces found.
    #[error("no usable network interfaces found")]
    NoInterfaces,

    /// The blocking interface scan could not complete.
    #[error("interface scan failed: {0}")]
    InterfaceScan(String),
}

/// Convenient Result alias for speaker discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// A speaker held by the registry: one physical device at its current address.
///
/// Handles are replaced wholesale on rediscovery; callers should not keep
/// them beyond a single operation.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Speaker {
    /// IP address of the speaker.
    pub ip: String,
    /// User-configured room name, as reported by the device.
    pub name: String,
    /// Canonical UUID (normalized RINCON_xxx).
    pub uuid: String,
}

/// A probe response before its name has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSpeaker {
    /// IP address the response came from.
    pub ip: String,
    /// Canonical UUID.
    pub uuid: String,
    /// SSDP LOCATION URL if the response carried one.
    pub location: Option<String>,
}

impl DiscoveredSpeaker {
    /// Creates a discovered speaker, normalizing the raw UUID.
    pub fn new(ip: impl Into<String>, raw_uuid: &str) -> Self {
        Self {
            ip: ip.into(),
            uuid: normalize_uuid(raw_uuid),
            location: None,
        }
    }

    /// Attaches the LOCATION URL from the probe response.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Resolves this response into a registry handle with the given name.
    #[must_use]
    pub fn into_speaker(self, name: String) -> Speaker {
        Speaker {
            ip: self.ip,
            name,
            uuid: self.uuid,
        }
    }
}

/// Normalizes a Sonos UUID to canonical form for deduplication.
///
/// Handles the shapes seen in the wild:
/// - `uuid:` prefix (from UPnP UDN)
/// - `::urn:schemas-upnp-org:device:ZonePlayer:1` suffix (from USN)
/// - `:<digits>` suffixes (topology IDs like `RINCON_...01400:58`)
/// - `_MS`, `_MR`, `_LR` subdevice suffixes
pub fn normalize_uuid(raw: &str) -> String {
    let mut uuid = raw.trim();

    if let Some(stripped) = uuid.strip_prefix("uuid:") {
        uuid = stripped;
    }
    if let Some(idx) = uuid.find("::") {
        uuid = &uuid[..idx];
    }

    // Only RINCON ids carry numeric topology suffixes
    if uuid.contains("RINCON_") {
        if let Some((head, tail)) = uuid.rsplit_once(':') {
            if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
                uuid = head;
            }
        }
    }

    const SUFFIXES: &[&str] = &["_MS", "_MR", "_LR"];
    while let Some(stripped) = SUFFIXES.iter().find_map(|s| uuid.strip_suffix(s)) {
        uuid = stripped;
    }

    uuid.to_string()
}

/// Virtual interface prefixes to skip during discovery.
pub const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vbox", "tun", "tap",
];

/// Checks if an interface name belongs to a virtual/container interface.
pub fn is_virtual_interface(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name_lower.starts_with(prefix))
}
