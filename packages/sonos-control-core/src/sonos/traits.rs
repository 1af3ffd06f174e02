//! Trait abstractions for speaker capabilities.
//!
//! The registry, announcer and player commands depend only on these traits.
//! [`SonosClientImpl`](super::SonosClientImpl) and
//! [`SsdpDiscovery`](super::discovery::SsdpDiscovery) are the production
//! implementations; tests substitute in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;

use crate::sonos::discovery::{DiscoveredSpeaker, DiscoveryResult};
use crate::sonos::error::DeviceResult;
use crate::sonos::types::{Favorite, PlayMode, QueueItem, TrackInfo, TransportState, ZoneGroup};

/// Transport control operations addressed to one speaker.
#[async_trait]
pub trait SpeakerTransport: Send + Sync {
    /// Reads the current transport state.
    async fn transport_state(&self, ip: &str) -> DeviceResult<TransportState>;

    /// Reads the currently loaded track and playback position.
    async fn track_info(&self, ip: &str) -> DeviceResult<TrackInfo>;

    /// Resumes playback of whatever is loaded.
    async fn play(&self, ip: &str) -> DeviceResult<()>;

    /// Pauses playback.
    async fn pause(&self, ip: &str) -> DeviceResult<()>;

    /// Skips to the next track.
    async fn next(&self, ip: &str) -> DeviceResult<()>;

    /// Skips to the previous track.
    async fn previous(&self, ip: &str) -> DeviceResult<()>;

    /// Loads `uri` with a display `title` and starts playing it.
    async fn play_uri(&self, ip: &str, uri: &str, title: &str) -> DeviceResult<()>;

    /// Seeks within the current track to `seconds` from its start.
    async fn seek(&self, ip: &str, seconds: u64) -> DeviceResult<()>;

    /// Plays entry `track` (1-based) of the queue of the speaker `uuid`.
    async fn play_from_queue(&self, ip: &str, uuid: &str, track: u32) -> DeviceResult<()>;

    /// Reads shuffle and repeat.
    async fn play_mode(&self, ip: &str) -> DeviceResult<PlayMode>;

    /// Sets shuffle and repeat.
    async fn set_play_mode(&self, ip: &str, mode: PlayMode) -> DeviceResult<()>;

    /// Starts a sleep timer of `seconds`, or cancels it with `None`.
    async fn set_sleep_timer(&self, ip: &str, seconds: Option<u64>) -> DeviceResult<()>;
}

/// Per-speaker volume, mute and tone.
#[async_trait]
pub trait SpeakerVolume: Send + Sync {
    /// Gets the speaker volume (0-100).
    async fn volume(&self, ip: &str) -> DeviceResult<u8>;

    /// Sets the speaker volume (values > 100 are clamped).
    async fn set_volume(&self, ip: &str, volume: u8) -> DeviceResult<()>;

    /// Gets the speaker mute state.
    async fn mute(&self, ip: &str) -> DeviceResult<bool>;

    /// Sets the speaker mute state.
    async fn set_mute(&self, ip: &str, mute: bool) -> DeviceResult<()>;

    /// Sets the bass level (clamped to -10..=10).
    async fn set_bass(&self, ip: &str, level: i8) -> DeviceResult<()>;

    /// Sets the treble level (clamped to -10..=10).
    async fn set_treble(&self, ip: &str, level: i8) -> DeviceResult<()>;
}

/// Identity, topology and grouping.
#[async_trait]
pub trait SpeakerTopology: Send + Sync {
    /// Reads the user-configured room name of the speaker.
    async fn player_name(&self, ip: &str) -> DeviceResult<String>;

    /// Fetches the household's zone groups as seen by this speaker.
    async fn zone_groups(&self, ip: &str) -> DeviceResult<Vec<ZoneGroup>>;

    /// Joins the speaker at `ip` to the group coordinated by `coordinator_uuid`.
    async fn join(&self, ip: &str, coordinator_uuid: &str) -> DeviceResult<()>;

    /// Makes the speaker leave its group and become standalone.
    async fn leave(&self, ip: &str) -> DeviceResult<()>;

    /// Gets the group volume from a coordinator (0-100).
    async fn group_volume(&self, coordinator_ip: &str) -> DeviceResult<u8>;

    /// Sets the group volume on a coordinator (values > 100 are clamped).
    async fn set_group_volume(&self, coordinator_ip: &str, volume: u8) -> DeviceResult<()>;
}

/// Queue and favorites.
#[async_trait]
pub trait SpeakerLibrary: Send + Sync {
    /// Reads the speaker's queue.
    async fn queue(&self, ip: &str) -> DeviceResult<Vec<QueueItem>>;

    /// Empties the speaker's queue.
    async fn clear_queue(&self, ip: &str) -> DeviceResult<()>;

    /// Reads the household favorites.
    async fn favorites(&self, ip: &str) -> DeviceResult<Vec<Favorite>>;

    /// Loads `favorite` with its own metadata and starts playing it.
    async fn play_favorite(&self, ip: &str, favorite: &Favorite) -> DeviceResult<()>;
}

/// Network probing for speakers.
#[async_trait]
pub trait SpeakerDiscovery: Send + Sync {
    /// Probes the network, waiting at most `timeout` for answers.
    async fn probe(&self, timeout: Duration) -> DiscoveryResult<Vec<DiscoveredSpeaker>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Traits (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the core needs to drive a speaker.
pub trait SpeakerControl: SpeakerTransport + SpeakerVolume + SpeakerTopology + SpeakerLibrary {}

/// Blanket implementation for any type implementing all capability traits.
impl<T: SpeakerTransport + SpeakerVolume + SpeakerTopology + SpeakerLibrary> SpeakerControl for T {}
