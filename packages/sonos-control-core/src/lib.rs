//! Sonos Control Core - device-session core for a stable HTTP control surface
//! over Sonos speakers.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`rooms`]: Room name normalization
//! - [`retry`]: Bounded retry of transient device failures
//! - [`services`]: Device registry, player commands and announcements
//! - [`events`]: Fan-out of change notifications to subscribers
//! - [`speech`]: Text-to-speech rendering and the announcement cache
//! - [`context`]: Network configuration and URL building
//! - [`sonos`]: Speaker control and discovery (UPnP/SOAP, SSDP)
//! - [`api`]: Health, event stream and static audio endpoints
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The services talk to the outside world only through traits:
//!
//! - [`SpeakerControl`](sonos::SpeakerControl): Device control
//! - [`SpeakerLibrary`](sonos::SpeakerLibrary): Queue and favorites
//! - [`SpeakerDiscovery`](sonos::SpeakerDiscovery): Network probing
//! - [`SpeechRenderer`](speech::SpeechRenderer): Text-to-speech rendering
//! - [`IpDetector`](context::IpDetector): Local IP detection
//!
//! Each trait has a default implementation suitable for the standalone server.

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod context;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod retry;
pub mod rooms;
pub mod services;
pub mod sonos;
pub mod speech;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError, UrlBuilder};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use events::{Delivery, EventBroadcaster, EventMessage, Subscription};
pub use retry::RetryPolicy;
pub use rooms::{normalize_room_name, RoomKey};
pub use state::Config;
pub use utils::now_millis;

// Re-export Sonos types
pub use sonos::discovery::Speaker;
pub use sonos::types::{
    Favorite, PlayMode, PlayerState, QueueItem, Repeat, TrackInfo, TransportState, ZoneGroup,
    ZoneSummary,
};
pub use sonos::{DeviceError, DeviceErrorKind, SonosClientImpl};

// Re-export service types
pub use services::{
    AnnouncementOutcome, Announcer, DeviceRegistry, Equalizer, PlayerCommands, SeekTarget,
    VolumeChange,
};

// Re-export speech types
pub use speech::{SpeechCache, SpeechError, SpeechRenderer};

// Re-export bootstrap types
pub use bootstrap::{
    bootstrap_services, bootstrap_with, BootstrapError, BootstrappedServices, Capabilities,
};

// Re-export API types
pub use api::{start_server, AppState, ServerError};
