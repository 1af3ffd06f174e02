//! Spoken announcements that interrupt a room and put it back afterwards.
//!
//! An announcement holds the room's lock for its whole run:
//!
//! 1. remember volume, mute and whether the room was playing
//! 2. set the announcement volume and unmute
//! 3. render the text (cached) and play it from the static mount
//! 4. wait for the speaker to go idle, bounded by a poll budget
//! 5. put volume and mute back, and resume playback if it was playing
//!
//! Step 5 runs whenever step 1 succeeded, whatever happened in between.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::context::NetworkContext;
use crate::error::{ApiError, ApiResult};
use crate::events::{kind, EventBroadcaster};
use crate::protocol_constants::{
    ANNOUNCEMENT_MAX_POLLS, ANNOUNCEMENT_POLL_INTERVAL_MS, ANNOUNCEMENT_START_DELAY_MS,
    ANNOUNCEMENT_TITLE,
};
use crate::retry::RetryPolicy;
use crate::rooms::RoomKey;
use crate::services::device_call;
use crate::services::registry::DeviceRegistry;
use crate::sonos::discovery::Speaker;
use crate::sonos::traits::SpeakerControl;
use crate::sonos::types::TransportState;
use crate::speech::SpeechCache;

/// How long an announcement waits for the speaker to finish.
#[derive(Debug, Clone, Copy)]
pub struct AnnouncementTiming {
    /// Pause after starting playback before the first poll.
    pub start_delay: Duration,
    /// Pause between transport state polls.
    pub poll_interval: Duration,
    /// Polls before giving up on the speaker going idle.
    pub max_polls: u32,
}

impl Default for AnnouncementTiming {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_millis(ANNOUNCEMENT_START_DELAY_MS),
            poll_interval: Duration::from_millis(ANNOUNCEMENT_POLL_INTERVAL_MS),
            max_polls: ANNOUNCEMENT_MAX_POLLS,
        }
    }
}

/// Result of a completed announcement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementOutcome {
    pub room: RoomKey,
    pub text: String,
    /// Cache file that was played.
    pub file: String,
    /// URL the speaker fetched the audio from.
    pub url: String,
    /// `false` if the poll budget ran out before the speaker went idle.
    pub finished: bool,
}

/// Room state captured before the announcement.
#[derive(Debug, Clone, Copy)]
struct Saved {
    volume: u8,
    mute: bool,
    was_playing: bool,
}

/// Plays announcements and restores the room afterwards.
pub struct Announcer {
    registry: Arc<DeviceRegistry>,
    speakers: Arc<dyn SpeakerControl>,
    speech: Arc<SpeechCache>,
    network: NetworkContext,
    events: Arc<EventBroadcaster>,
    retry: RetryPolicy,
    timing: AnnouncementTiming,
}

impl Announcer {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        speakers: Arc<dyn SpeakerControl>,
        speech: Arc<SpeechCache>,
        network: NetworkContext,
        events: Arc<EventBroadcaster>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            speakers,
            speech,
            network,
            events,
            retry,
            timing: AnnouncementTiming::default(),
        }
    }

    /// Overrides the wait timing.
    #[must_use]
    pub fn with_timing(mut self, timing: AnnouncementTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Speaks `text` in `room`, optionally at `volume` (clamped to 100).
    ///
    /// # Errors
    ///
    /// - [`ApiError::RoomNotFound`] if the room is unknown
    /// - the first failure of the prepare, play or wait steps, returned after
    ///   the room was restored
    /// - a volume or mute restore failure, if nothing else failed
    pub async fn announce(
        &self,
        room: &str,
        text: &str,
        language: &str,
        volume: Option<u8>,
    ) -> ApiResult<AnnouncementOutcome> {
        let (speaker, _guard) = self
            .registry
            .acquire(room)
            .await
            .ok_or_else(|| ApiError::RoomNotFound(room.to_string()))?;
        let key = RoomKey::new(room);

        let saved = self.save(&speaker).await?;
        log::info!(
            "[Announce] {} ({}): saved volume={} mute={} playing={}",
            key,
            speaker.ip,
            saved.volume,
            saved.mute,
            saved.was_playing
        );

        let played = self.run(&speaker, &saved, text, language, volume).await;
        let restored = self.restore(&speaker, &saved).await;

        let (file, url, finished) = played?;
        restored?;

        let outcome = AnnouncementOutcome {
            room: key,
            text: text.to_string(),
            file,
            url,
            finished,
        };
        self.events.broadcast(
            kind::ANNOUNCEMENT,
            json!({
                "room": outcome.room,
                "text": outcome.text,
                "finished": outcome.finished,
            }),
        );
        Ok(outcome)
    }

    async fn save(&self, speaker: &Speaker) -> ApiResult<Saved> {
        let ip = speaker.ip.as_str();
        let volume = self.call("GetVolume", || self.speakers.volume(ip)).await?;
        let mute = self.call("GetMute", || self.speakers.mute(ip)).await?;
        let state = self
            .call("GetTransportInfo", || self.speakers.transport_state(ip))
            .await?;
        Ok(Saved {
            volume,
            mute,
            was_playing: state == TransportState::Playing,
        })
    }

    /// Prepare, play and wait. Returns the file, its URL, and whether the
    /// speaker went idle within the poll budget.
    async fn run(
        &self,
        speaker: &Speaker,
        saved: &Saved,
        text: &str,
        language: &str,
        volume: Option<u8>,
    ) -> ApiResult<(String, String, bool)> {
        let ip = speaker.ip.as_str();

        if let Some(volume) = volume {
            let volume = volume.min(100);
            self.call("SetVolume", || self.speakers.set_volume(ip, volume))
                .await?;
        }
        if saved.mute {
            self.call("SetMute", || self.speakers.set_mute(ip, false))
                .await?;
        }

        let file = self.speech.render_or_fetch(text, language).await?;
        // The host may have moved to another address since startup
        self.network.refresh_local_ip();
        let url = self.network.static_url(&file);
        log::info!("[Announce] Playing {} on {}", url, ip);
        self.call("PlayUri", || {
            self.speakers.play_uri(ip, &url, ANNOUNCEMENT_TITLE)
        })
        .await?;

        let finished = self.wait_until_idle(ip).await?;
        Ok((file, url, finished))
    }

    async fn wait_until_idle(&self, ip: &str) -> ApiResult<bool> {
        tokio::time::sleep(self.timing.start_delay).await;
        for poll in 1..=self.timing.max_polls {
            let state = self
                .call("GetTransportInfo", || self.speakers.transport_state(ip))
                .await?;
            if state.is_idle() {
                log::debug!("[Announce] {} idle ({}) after {} poll(s)", ip, state, poll);
                return Ok(true);
            }
            if poll < self.timing.max_polls {
                tokio::time::sleep(self.timing.poll_interval).await;
            }
        }
        log::warn!(
            "[Announce] {} still busy after {} polls, restoring anyway",
            ip,
            self.timing.max_polls
        );
        Ok(false)
    }

    /// Puts volume and mute back, then resumes playback if it was playing.
    ///
    /// Both restores are attempted even if the first fails; the first
    /// failure is returned. A failed resume is only logged.
    async fn restore(&self, speaker: &Speaker, saved: &Saved) -> ApiResult<()> {
        let ip = speaker.ip.as_str();

        let volume = self
            .call("SetVolume", || self.speakers.set_volume(ip, saved.volume))
            .await;
        let mute = self
            .call("SetMute", || self.speakers.set_mute(ip, saved.mute))
            .await;

        if saved.was_playing {
            if let Err(e) = self.call("Play", || self.speakers.play(ip)).await {
                log::warn!("[Announce] Could not resume playback on {}: {}", ip, e);
            }
        }

        if let Err(e) = &volume {
            log::error!("[Announce] Failed to restore volume on {}: {}", ip, e);
        }
        if let Err(e) = &mute {
            log::error!("[Announce] Failed to restore mute on {}: {}", ip, e);
        }
        volume.and(mute)
    }

    async fn call<T, F, Fut>(&self, action: &str, operation: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = crate::sonos::error::DeviceResult<T>>,
    {
        device_call(&self.registry, &self.retry, action, operation).await
    }
}
