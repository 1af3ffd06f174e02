//! UPnP/SOAP implementation of the speaker capability traits.

use async_trait::async_trait;
use reqwest::Client;

use crate::sonos::error::DeviceResult;
use crate::sonos::traits::{SpeakerLibrary, SpeakerTopology, SpeakerTransport, SpeakerVolume};
use crate::sonos::types::{Favorite, PlayMode, QueueItem, TrackInfo, TransportState, ZoneGroup};
use crate::sonos::{grouping, library, playback, volume, zone_groups};

/// Concrete implementation of the speaker capability traits.
///
/// Wraps the free functions of the command modules so the core can hold it
/// as an `Arc<dyn SpeakerControl>`.
#[derive(Clone)]
pub struct SonosClientImpl {
    /// HTTP client for Sonos communication.
    client: Client,
}

impl std::fmt::Debug for SonosClientImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonosClientImpl")
            .field("client", &"Client")
            .finish()
    }
}

impl SonosClientImpl {
    /// Creates a client that issues all requests through `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpeakerTransport for SonosClientImpl {
    async fn transport_state(&self, ip: &str) -> DeviceResult<TransportState> {
        playback::get_transport_state(&self.client, ip).await
    }

    async fn track_info(&self, ip: &str) -> DeviceResult<TrackInfo> {
        playback::get_track_info(&self.client, ip).await
    }

    async fn play(&self, ip: &str) -> DeviceResult<()> {
        playback::play(&self.client, ip).await
    }

    async fn pause(&self, ip: &str) -> DeviceResult<()> {
        playback::pause(&self.client, ip).await
    }

    async fn next(&self, ip: &str) -> DeviceResult<()> {
        playback::next(&self.client, ip).await
    }

    async fn previous(&self, ip: &str) -> DeviceResult<()> {
        playback::previous(&self.client, ip).await
    }

    async fn play_uri(&self, ip: &str, uri: &str, title: &str) -> DeviceResult<()> {
        playback::play_uri(&self.client, ip, uri, title).await
    }

    async fn seek(&self, ip: &str, seconds: u64) -> DeviceResult<()> {
        playback::seek(&self.client, ip, seconds).await
    }

    async fn play_from_queue(&self, ip: &str, uuid: &str, track: u32) -> DeviceResult<()> {
        playback::play_from_queue(&self.client, ip, uuid, track).await
    }

    async fn play_mode(&self, ip: &str) -> DeviceResult<PlayMode> {
        playback::get_play_mode(&self.client, ip).await
    }

    async fn set_play_mode(&self, ip: &str, mode: PlayMode) -> DeviceResult<()> {
        playback::set_play_mode(&self.client, ip, mode).await
    }

    async fn set_sleep_timer(&self, ip: &str, seconds: Option<u64>) -> DeviceResult<()> {
        playback::set_sleep_timer(&self.client, ip, seconds).await
    }
}

#[async_trait]
impl SpeakerVolume for SonosClientImpl {
    async fn volume(&self, ip: &str) -> DeviceResult<u8> {
        volume::get_speaker_volume(&self.client, ip).await
    }

    async fn set_volume(&self, ip: &str, level: u8) -> DeviceResult<()> {
        volume::set_speaker_volume(&self.client, ip, level).await
    }

    async fn mute(&self, ip: &str) -> DeviceResult<bool> {
        volume::get_speaker_mute(&self.client, ip).await
    }

    async fn set_mute(&self, ip: &str, mute: bool) -> DeviceResult<()> {
        volume::set_speaker_mute(&self.client, ip, mute).await
    }

    async fn set_bass(&self, ip: &str, level: i8) -> DeviceResult<()> {
        volume::set_bass(&self.client, ip, level).await
    }

    async fn set_treble(&self, ip: &str, level: i8) -> DeviceResult<()> {
        volume::set_treble(&self.client, ip, level).await
    }
}

#[async_trait]
impl SpeakerTopology for SonosClientImpl {
    async fn player_name(&self, ip: &str) -> DeviceResult<String> {
        zone_groups::get_player_name(&self.client, ip).await
    }

    async fn zone_groups(&self, ip: &str) -> DeviceResult<Vec<ZoneGroup>> {
        zone_groups::get_zone_groups(&self.client, ip).await
    }

    async fn join(&self, ip: &str, coordinator_uuid: &str) -> DeviceResult<()> {
        grouping::join_group(&self.client, ip, coordinator_uuid).await
    }

    async fn leave(&self, ip: &str) -> DeviceResult<()> {
        grouping::leave_group(&self.client, ip).await
    }

    async fn group_volume(&self, coordinator_ip: &str) -> DeviceResult<u8> {
        volume::get_group_volume(&self.client, coordinator_ip).await
    }

    async fn set_group_volume(&self, coordinator_ip: &str, level: u8) -> DeviceResult<()> {
        volume::set_group_volume(&self.client, coordinator_ip, level).await
    }
}

#[async_trait]
impl SpeakerLibrary for SonosClientImpl {
    async fn queue(&self, ip: &str) -> DeviceResult<Vec<QueueItem>> {
        library::get_queue(&self.client, ip).await
    }

    async fn clear_queue(&self, ip: &str) -> DeviceResult<()> {
        library::clear_queue(&self.client, ip).await
    }

    async fn favorites(&self, ip: &str) -> DeviceResult<Vec<Favorite>> {
        library::get_favorites(&self.client, ip).await
    }

    async fn play_favorite(&self, ip: &str, favorite: &Favorite) -> DeviceResult<()> {
        playback::play_uri_with_metadata(&self.client, ip, &favorite.uri, &favorite.metadata).await
    }
}
