//! Sonos speaker control and discovery.
//!
//! # Module Structure
//!
//! - `traits` - capability traits the core depends on
//! - `error` - `DeviceError` and its retry/rediscovery classification
//! - `types` - transport, track and zone group types
//! - `services` - UPnP service definitions (URNs, paths)
//! - `client` - `SonosClientImpl`, the SOAP implementation of the traits
//! - `playback` - transport commands and state
//! - `volume` - per-speaker volume/mute and group volume
//! - `grouping` - group join/leave
//! - `library` - queue and favorites
//! - `zone_groups` - topology parsing and room name lookup
//! - `didl` - DIDL-Lite metadata for loaded URIs
//! - `discovery` - SSDP probing
//! - `soap` - low-level SOAP transport
//! - `utils` - XML and URL helpers

pub mod client;
pub(crate) mod didl;
pub mod discovery;
pub mod error;
pub(crate) mod grouping;
pub(crate) mod library;
pub(crate) mod playback;
pub mod services;
pub mod soap;
pub mod traits;
pub mod types;
pub mod utils;
pub(crate) mod volume;
pub mod zone_groups;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use client::SonosClientImpl;
pub use error::{DeviceError, DeviceErrorKind, DeviceResult};
pub use services::SonosService;
pub use traits::{
    SpeakerControl, SpeakerDiscovery, SpeakerLibrary, SpeakerTopology, SpeakerTransport,
    SpeakerVolume,
};
