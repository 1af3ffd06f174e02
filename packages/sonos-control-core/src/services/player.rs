//! Per-room and household-wide player commands.
//!
//! Every command follows the same shape: resolve the room, hold its lock,
//! run the device calls under the retry policy, release, and broadcast what
//! changed. Unknown rooms fail with [`ApiError::RoomNotFound`] before any
//! device is touched.

use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::sync::OwnedMutexGuard;

use crate::error::{ApiError, ApiResult};
use crate::events::{kind, EventBroadcaster};
use crate::retry::RetryPolicy;
use crate::rooms::RoomKey;
use crate::services::device_call;
use crate::services::registry::DeviceRegistry;
use crate::sonos::discovery::Speaker;
use crate::sonos::error::DeviceResult;
use crate::sonos::traits::SpeakerControl;
use crate::sonos::types::{
    Favorite, PlayMode, PlayerState, QueueItem, Repeat, TransportState, ZoneGroup,
    ZoneMemberSummary, ZoneSummary,
};
use crate::sonos::volume::TONE_RANGE;

// ─────────────────────────────────────────────────────────────────────────────
// Volume Changes
// ─────────────────────────────────────────────────────────────────────────────

/// Requested volume: a target level, or a step from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChange {
    /// Set this level (clamped to 0-100).
    Absolute(i32),
    /// Add this to the current level (result clamped to 0-100).
    Relative(i32),
}

impl VolumeChange {
    /// Resolves the change against the `current` level.
    #[must_use]
    pub fn apply(self, current: u8) -> u8 {
        let target = match self {
            Self::Absolute(level) => level,
            Self::Relative(step) => i32::from(current).saturating_add(step),
        };
        target.clamp(0, 100) as u8
    }

    fn needs_current(self) -> bool {
        matches!(self, Self::Relative(_))
    }
}

impl From<u8> for VolumeChange {
    fn from(level: u8) -> Self {
        Self::Absolute(i32::from(level))
    }
}

impl FromStr for VolumeChange {
    type Err = ApiError;

    /// Parses `"30"` as absolute and `"+5"` / `"-5"` as relative.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ApiError::InvalidRequest(format!("invalid volume: {:?}", s));
        match s.chars().next() {
            Some('+') | Some('-') => s.parse::<i32>().map(Self::Relative).map_err(|_| invalid()),
            Some(_) => s.parse::<i32>().map(Self::Absolute).map_err(|_| invalid()),
            None => Err(invalid()),
        }
    }
}

/// Where to seek: a time in the current track, or a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    /// Seconds from the start of the current track.
    Position(u64),
    /// Queue entry, first entry is 1.
    Track(u32),
}

/// Bass and treble levels that were applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Equalizer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bass: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treble: Option<i8>,
}

fn clamp_tone(level: i32) -> i8 {
    level.clamp(i32::from(TONE_RANGE.0), i32::from(TONE_RANGE.1)) as i8
}

/// Picks the favorite for `name`, case-insensitively: an exact title first,
/// then the first title starting with it, then the first containing it.
pub fn find_favorite<'a>(favorites: &'a [Favorite], name: &str) -> Option<&'a Favorite> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    let mut prefix = None;
    let mut contains = None;
    for favorite in favorites {
        let title = favorite.title.to_lowercase();
        if title == wanted {
            return Some(favorite);
        }
        if prefix.is_none() && title.starts_with(&wanted) {
            prefix = Some(favorite);
        } else if contains.is_none() && title.contains(&wanted) {
            contains = Some(favorite);
        }
    }
    prefix.or(contains)
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Player commands addressed by room name.
pub struct PlayerCommands {
    registry: Arc<DeviceRegistry>,
    speakers: Arc<dyn SpeakerControl>,
    events: Arc<EventBroadcaster>,
    retry: RetryPolicy,
}

impl PlayerCommands {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        speakers: Arc<dyn SpeakerControl>,
        events: Arc<EventBroadcaster>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            speakers,
            events,
            retry,
        }
    }

    async fn call<T, F, Fut>(&self, action: &str, operation: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = DeviceResult<T>>,
    {
        device_call(&self.registry, &self.retry, action, operation).await
    }

    fn transport_changed(&self, room: &RoomKey, action: &str) {
        self.events
            .broadcast(kind::TRANSPORT, json!({ "room": room, "action": action }));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// Resumes playback.
    pub async fn play(&self, room: &str) -> ApiResult<()> {
        let (key, speaker, _guard) = self.lock(room).await?;
        self.call("Play", || self.speakers.play(&speaker.ip)).await?;
        self.transport_changed(&key, "play");
        Ok(())
    }

    /// Pauses playback.
    pub async fn pause(&self, room: &str) -> ApiResult<()> {
        let (key, speaker, _guard) = self.lock(room).await?;
        self.call("Pause", || self.speakers.pause(&speaker.ip)).await?;
        self.transport_changed(&key, "pause");
        Ok(())
    }

    /// Pauses if playing, otherwise plays. Returns the state asked for.
    pub async fn play_pause(&self, room: &str) -> ApiResult<TransportState> {
        let (key, speaker, _guard) = self.lock(room).await?;
        let ip = speaker.ip.as_str();

        let state = self
            .call("GetTransportInfo", || self.speakers.transport_state(ip))
            .await?;
        let target = if state == TransportState::Playing {
            self.call("Pause", || self.speakers.pause(ip)).await?;
            self.transport_changed(&key, "pause");
            TransportState::Paused
        } else {
            self.call("Play", || self.speakers.play(ip)).await?;
            self.transport_changed(&key, "play");
            TransportState::Playing
        };
        Ok(target)
    }

    /// Skips to the next track.
    ///
    /// Retried like every other command, so a lost response can skip twice.
    pub async fn next(&self, room: &str) -> ApiResult<()> {
        let (key, speaker, _guard) = self.lock(room).await?;
        self.call("Next", || self.speakers.next(&speaker.ip)).await?;
        self.transport_changed(&key, "next");
        Ok(())
    }

    /// Goes back to the previous track.
    pub async fn previous(&self, room: &str) -> ApiResult<()> {
        let (key, speaker, _guard) = self.lock(room).await?;
        self.call("Previous", || self.speakers.previous(&speaker.ip))
            .await?;
        self.transport_changed(&key, "previous");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Volume & Mute
    // ─────────────────────────────────────────────────────────────────────────

    /// Sets the room volume. Returns the level that was set.
    pub async fn set_volume(&self, room: &str, change: VolumeChange) -> ApiResult<u8> {
        let (key, speaker, _guard) = self.lock(room).await?;
        let ip = speaker.ip.as_str();

        let current = if change.needs_current() {
            self.call("GetVolume", || self.speakers.volume(ip)).await?
        } else {
            0
        };
        let target = change.apply(current);
        self.call("SetVolume", || self.speakers.set_volume(ip, target))
            .await?;

        self.events
            .broadcast(kind::VOLUME, json!({ "room": key, "volume": target }));
        Ok(target)
    }

    /// Mutes the room.
    pub async fn mute(&self, room: &str) -> ApiResult<bool> {
        self.write_mute(room, Some(true)).await
    }

    /// Unmutes the room.
    pub async fn unmute(&self, room: &str) -> ApiResult<bool> {
        self.write_mute(room, Some(false)).await
    }

    /// Flips the room's mute state. Returns the new state.
    pub async fn toggle_mute(&self, room: &str) -> ApiResult<bool> {
        self.write_mute(room, None).await
    }

    async fn write_mute(&self, room: &str, mute: Option<bool>) -> ApiResult<bool> {
        let (key, speaker, _guard) = self.lock(room).await?;
        let ip = speaker.ip.as_str();

        let target = match mute {
            Some(mute) => mute,
            None => !self.call("GetMute", || self.speakers.mute(ip)).await?,
        };
        self.call("SetMute", || self.speakers.set_mute(ip, target))
            .await?;

        self.events
            .broadcast(kind::VOLUME, json!({ "room": key, "mute": target }));
        Ok(target)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grouping
    // ─────────────────────────────────────────────────────────────────────────

    /// Joins `room` to the group of `other`, which becomes or stays the
    /// coordinator.
    pub async fn join(&self, room: &str, other: &str) -> ApiResult<()> {
        let target = self
            .registry
            .get(other)
            .ok_or_else(|| ApiError::RoomNotFound(other.to_string()))?;
        let (key, speaker, _guard) = self.lock(room).await?;

        self.call("Join", || self.speakers.join(&speaker.ip, &target.uuid))
            .await?;

        log::info!("[Player] {} joined {}", key, RoomKey::new(other));
        self.events.broadcast(
            kind::GROUP,
            json!({ "room": key, "joined": RoomKey::new(other) }),
        );
        Ok(())
    }

    /// Makes `room` leave its group.
    pub async fn leave(&self, room: &str) -> ApiResult<()> {
        let (key, speaker, _guard) = self.lock(room).await?;
        self.call("Leave", || self.speakers.leave(&speaker.ip)).await?;

        log::info!("[Player] {} left its group", key);
        self.events
            .broadcast(kind::GROUP, json!({ "room": key, "left": true }));
        Ok(())
    }

    /// Sets the volume of the whole group `room` belongs to.
    ///
    /// The group volume lives on the coordinator, so the coordinator's room
    /// is locked too. Both locks are taken in room key order.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotGrouped`] if the topology does not list the room.
    pub async fn set_group_volume(&self, room: &str, change: VolumeChange) -> ApiResult<u8> {
        let (key, speaker, guard) = self.lock(room).await?;

        let groups = self
            .call("GetZoneGroupState", || self.speakers.zone_groups(&speaker.ip))
            .await?;
        let group = find_group(&groups, &speaker.uuid)
            .ok_or_else(|| ApiError::NotGrouped(room.to_string()))?;
        let coordinator = group.coordinator_ip.clone();
        let coordinator_room = group
            .coordinator()
            .map(|m| RoomKey::new(&m.zone_name))
            .filter(|other| *other != key);

        let _guards = match coordinator_room {
            None => vec![guard],
            Some(other) => {
                drop(guard);
                self.lock_pair(&key, &other).await
            }
        };

        let current = if change.needs_current() {
            self.call("GetGroupVolume", || self.speakers.group_volume(&coordinator))
                .await?
        } else {
            0
        };
        let target = change.apply(current);
        self.call("SetGroupVolume", || {
            self.speakers.set_group_volume(&coordinator, target)
        })
        .await?;

        self.events.broadcast(
            kind::VOLUME,
            json!({ "room": key, "groupVolume": target }),
        );
        Ok(target)
    }

    /// Locks two different rooms, lower key first.
    async fn lock_pair(&self, a: &RoomKey, b: &RoomKey) -> Vec<OwnedMutexGuard<()>> {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let first = self.registry.get_lock(first.as_str()).lock_owned().await;
        let second = self.registry.get_lock(second.as_str()).lock_owned().await;
        vec![first, second]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Playback Settings
    // ─────────────────────────────────────────────────────────────────────────

    /// Seeks within the current track or jumps to a queue entry.
    pub async fn seek(&self, room: &str, target: SeekTarget) -> ApiResult<()> {
        if target == SeekTarget::Track(0) {
            return Err(ApiError::InvalidRequest("track numbers start at 1".into()));
        }
        let (key, speaker, _guard) = self.lock(room).await?;
        let ip = speaker.ip.as_str();

        match target {
            SeekTarget::Position(seconds) => {
                self.call("Seek", || self.speakers.seek(ip, seconds)).await?;
            }
            SeekTarget::Track(track) => {
                self.call("PlayFromQueue", || {
                    self.speakers.play_from_queue(ip, &speaker.uuid, track)
                })
                .await?;
            }
        }
        self.transport_changed(&key, "seek");
        Ok(())
    }

    /// Changes shuffle and/or repeat; what is not given keeps its current
    /// value. Returns the mode that was set.
    pub async fn set_play_mode(
        &self,
        room: &str,
        shuffle: Option<bool>,
        repeat: Option<Repeat>,
    ) -> ApiResult<PlayMode> {
        let (key, speaker, _guard) = self.lock(room).await?;
        let ip = speaker.ip.as_str();

        let current = match (shuffle, repeat) {
            (Some(shuffle), Some(repeat)) => PlayMode { shuffle, repeat },
            _ => self.call("GetTransportSettings", || self.speakers.play_mode(ip)).await?,
        };
        let mode = PlayMode {
            shuffle: shuffle.unwrap_or(current.shuffle),
            repeat: repeat.unwrap_or(current.repeat),
        };
        self.call("SetPlayMode", || self.speakers.set_play_mode(ip, mode))
            .await?;

        self.events.broadcast(
            kind::SETTINGS,
            json!({ "room": key, "shuffle": mode.shuffle, "repeat": mode.repeat }),
        );
        Ok(mode)
    }

    /// Starts a sleep timer; 0 seconds cancels it.
    pub async fn set_sleep_timer(&self, room: &str, seconds: u64) -> ApiResult<u64> {
        let (key, speaker, _guard) = self.lock(room).await?;
        let duration = (seconds > 0).then_some(seconds);

        self.call("ConfigureSleepTimer", || {
            self.speakers.set_sleep_timer(&speaker.ip, duration)
        })
        .await?;

        self.events
            .broadcast(kind::SETTINGS, json!({ "room": key, "sleepTimer": seconds }));
        Ok(seconds)
    }

    /// Sets bass and/or treble, each clamped to -10..=10. Returns the levels
    /// that were applied.
    pub async fn set_equalizer(
        &self,
        room: &str,
        bass: Option<i32>,
        treble: Option<i32>,
    ) -> ApiResult<Equalizer> {
        let (key, speaker, _guard) = self.lock(room).await?;
        let ip = speaker.ip.as_str();
        let applied = Equalizer {
            bass: bass.map(clamp_tone),
            treble: treble.map(clamp_tone),
        };

        if let Some(level) = applied.bass {
            self.call("SetBass", || self.speakers.set_bass(ip, level))
                .await?;
        }
        if let Some(level) = applied.treble {
            self.call("SetTreble", || self.speakers.set_treble(ip, level))
                .await?;
        }

        if applied != Equalizer::default() {
            self.events.broadcast(
                kind::SETTINGS,
                json!({ "room": key, "bass": applied.bass, "treble": applied.treble }),
            );
        }
        Ok(applied)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue & Favorites
    // ─────────────────────────────────────────────────────────────────────────

    /// Reads the room's queue.
    pub async fn queue(&self, room: &str) -> ApiResult<Vec<QueueItem>> {
        let (_key, speaker, _guard) = self.lock(room).await?;
        self.call("Browse", || self.speakers.queue(&speaker.ip)).await
    }

    /// Empties the room's queue.
    pub async fn clear_queue(&self, room: &str) -> ApiResult<()> {
        let (key, speaker, _guard) = self.lock(room).await?;
        self.call("RemoveAllTracksFromQueue", || {
            self.speakers.clear_queue(&speaker.ip)
        })
        .await?;

        self.events
            .broadcast(kind::QUEUE, json!({ "room": key, "cleared": true }));
        Ok(())
    }

    /// Lists the household favorites, read through any known speaker.
    ///
    /// # Errors
    ///
    /// [`ApiError::NoSpeakers`] when no speaker is known.
    pub async fn favorites(&self) -> ApiResult<Vec<Favorite>> {
        let any_room = self
            .registry
            .snapshot()
            .keys()
            .min()
            .cloned()
            .ok_or(ApiError::NoSpeakers)?;
        let (speaker, _guard) = self
            .registry
            .acquire(any_room.as_str())
            .await
            .ok_or(ApiError::NoSpeakers)?;

        self.call("Browse", || self.speakers.favorites(&speaker.ip))
            .await
    }

    /// Plays the favorite best matching `name` in `room`. Returns it.
    ///
    /// # Errors
    ///
    /// [`ApiError::FavoriteNotFound`] with the available titles when nothing
    /// matches.
    pub async fn play_favorite(&self, room: &str, name: &str) -> ApiResult<Favorite> {
        let (key, speaker, _guard) = self.lock(room).await?;
        let ip = speaker.ip.as_str();

        let favorites = self
            .call("Browse", || self.speakers.favorites(ip))
            .await?;
        let favorite = find_favorite(&favorites, name)
            .cloned()
            .ok_or_else(|| ApiError::FavoriteNotFound {
                name: name.to_string(),
                available: favorites.iter().map(|f| f.title.clone()).collect(),
            })?;
        if favorite.uri.is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "favorite {:?} cannot be played directly",
                favorite.title
            )));
        }

        self.call("SetAVTransportURI", || {
            self.speakers.play_favorite(ip, &favorite)
        })
        .await?;

        log::info!("[Player] {} playing favorite {:?}", key, favorite.title);
        self.events.broadcast(
            kind::TRANSPORT,
            json!({ "room": key, "action": "favorite", "favorite": favorite.title }),
        );
        Ok(favorite)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────

    /// Reads transport, track, volume and mute of `room`.
    pub async fn state(&self, room: &str) -> ApiResult<PlayerState> {
        let (key, speaker, _guard) = self.lock(room).await?;
        let ip = speaker.ip.as_str();

        let state = self
            .call("GetTransportInfo", || self.speakers.transport_state(ip))
            .await?;
        let track = self
            .call("GetPositionInfo", || self.speakers.track_info(ip))
            .await?;
        let volume = self.call("GetVolume", || self.speakers.volume(ip)).await?;
        let mute = self.call("GetMute", || self.speakers.mute(ip)).await?;

        Ok(PlayerState {
            room: key,
            name: speaker.name,
            state,
            volume,
            mute,
            track,
        })
    }

    /// Lists the household's zones with each coordinator's playback details.
    ///
    /// Returns an empty list when no speaker is known or the topology cannot
    /// be read. Details of a coordinator that cannot be read are left empty.
    pub async fn zones(&self) -> ApiResult<Vec<ZoneSummary>> {
        let snapshot = self.registry.snapshot();
        let Some(any_room) = snapshot.keys().min().cloned() else {
            return Ok(Vec::new());
        };

        let groups = {
            let Some((speaker, _guard)) = self.registry.acquire(any_room.as_str()).await else {
                return Ok(Vec::new());
            };
            match self
                .call("GetZoneGroupState", || self.speakers.zone_groups(&speaker.ip))
                .await
            {
                Ok(groups) => groups,
                Err(e) => {
                    log::warn!("[Player] Could not read zone groups via {}: {}", any_room, e);
                    return Ok(Vec::new());
                }
            }
        };

        let mut zones = Vec::with_capacity(groups.len());
        for group in groups {
            zones.push(self.summarize(group).await);
        }
        Ok(zones)
    }

    async fn summarize(&self, group: ZoneGroup) -> ZoneSummary {
        let coordinator = group
            .coordinator()
            .map(|m| m.zone_name.clone())
            .unwrap_or_default();
        let members = group
            .members
            .iter()
            .map(|m| ZoneMemberSummary {
                room: RoomKey::new(&m.zone_name),
                name: m.zone_name.clone(),
                uuid: m.uuid.clone(),
            })
            .collect();

        let mut summary = ZoneSummary {
            coordinator,
            coordinator_uuid: group.coordinator_uuid.clone(),
            members,
            state: None,
            volume: None,
            track: None,
        };

        let Some((speaker, _guard)) = self.registry.acquire(&summary.coordinator).await else {
            return summary;
        };
        let ip = speaker.ip.as_str();
        let details = async {
            let state = self
                .call("GetTransportInfo", || self.speakers.transport_state(ip))
                .await?;
            let volume = self.call("GetVolume", || self.speakers.volume(ip)).await?;
            let track = self
                .call("GetPositionInfo", || self.speakers.track_info(ip))
                .await?;
            Ok::<_, ApiError>((state, volume, track))
        };
        match details.await {
            Ok((state, volume, track)) => {
                summary.state = Some(state);
                summary.volume = Some(volume);
                summary.track = Some(track);
            }
            Err(e) => log::warn!("[Player] Zone {} details unavailable: {}", summary.coordinator, e),
        }
        summary
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Household
    // ─────────────────────────────────────────────────────────────────────────

    /// Pauses every playing room. Returns the rooms that were paused.
    ///
    /// Rooms that fail are logged and skipped.
    pub async fn pause_all(&self) -> Vec<RoomKey> {
        self.for_each_room(Bulk::Pause).await
    }

    /// Resumes every paused room. Returns the rooms that were resumed.
    ///
    /// Rooms that fail are logged and skipped.
    pub async fn resume_all(&self) -> Vec<RoomKey> {
        self.for_each_room(Bulk::Resume).await
    }

    /// Applies `bulk` to every room in the matching state, one lock per
    /// room, rooms concurrently.
    async fn for_each_room(&self, bulk: Bulk) -> Vec<RoomKey> {
        let mut rooms: Vec<RoomKey> = self.registry.snapshot().keys().cloned().collect();
        rooms.sort();

        let results = join_all(rooms.into_iter().map(|room| async move {
            let (speaker, _guard) = self.registry.acquire(room.as_str()).await?;
            match self.apply_bulk(&speaker.ip, bulk).await {
                Ok(true) => Some(room),
                Ok(false) => None,
                Err(e) => {
                    log::warn!("[Player] {} skipped {}: {}", bulk.label(), room, e);
                    None
                }
            }
        }))
        .await;

        let changed: Vec<RoomKey> = results.into_iter().flatten().collect();
        log::info!("[Player] {}: {:?}", bulk.label(), changed);
        for room in &changed {
            self.transport_changed(room, bulk.action());
        }
        changed
    }

    async fn apply_bulk(&self, ip: &str, bulk: Bulk) -> ApiResult<bool> {
        let state = self
            .call("GetTransportInfo", || self.speakers.transport_state(ip))
            .await?;
        match bulk {
            Bulk::Pause if state == TransportState::Playing => {
                self.call("Pause", || self.speakers.pause(ip)).await?;
            }
            Bulk::Resume if state == TransportState::Paused => {
                self.call("Play", || self.speakers.play(ip)).await?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    async fn lock(
        &self,
        room: &str,
    ) -> ApiResult<(RoomKey, Speaker, OwnedMutexGuard<()>)> {
        let (speaker, guard) = self
            .registry
            .acquire(room)
            .await
            .ok_or_else(|| ApiError::RoomNotFound(room.to_string()))?;
        Ok((RoomKey::new(room), speaker, guard))
    }
}

#[derive(Debug, Clone, Copy)]
enum Bulk {
    Pause,
    Resume,
}

impl Bulk {
    fn label(self) -> &'static str {
        match self {
            Self::Pause => "pause_all",
            Self::Resume => "resume_all",
        }
    }

    fn action(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "play",
        }
    }
}

fn find_group<'a>(groups: &'a [ZoneGroup], uuid: &str) -> Option<&'a ZoneGroup> {
    groups.iter().find(|g| g.contains(uuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::events::Delivery;
    use crate::services::registry::RegistryConfig;
    use crate::sonos::test_fixtures::{FakeDiscovery, FakeSpeakers, Failure};
    use crate::sonos::types::ZoneGroupMember;

    const LIVING: (&str, &str, &str) = ("10.0.0.1", "RINCON_A01400", "Living Room");
    const KITCHEN: (&str, &str, &str) = ("10.0.0.2", "RINCON_B01400", "Kitchen");

    struct Harness {
        speakers: Arc<FakeSpeakers>,
        discovery: Arc<FakeDiscovery>,
        events: Arc<EventBroadcaster>,
        player: PlayerCommands,
    }

    async fn harness() -> Harness {
        let speakers = Arc::new(FakeSpeakers::with_rooms(&[LIVING, KITCHEN]));
        let discovery = Arc::new(FakeDiscovery::finding(&[
            (LIVING.0, LIVING.1),
            (KITCHEN.0, KITCHEN.1),
        ]));
        let events = Arc::new(EventBroadcaster::default());
        let registry = Arc::new(DeviceRegistry::new(
            speakers.clone(),
            discovery.clone(),
            events.clone(),
            RegistryConfig::default(),
        ));
        registry.refresh_now().await;
        let player = PlayerCommands::new(
            registry,
            speakers.clone(),
            events.clone(),
            RetryPolicy::default(),
        );
        Harness {
            speakers,
            discovery,
            events,
            player,
        }
    }

    #[test]
    fn parses_absolute_and_relative_volume() {
        assert_eq!("30".parse::<VolumeChange>().unwrap(), VolumeChange::Absolute(30));
        assert_eq!("+5".parse::<VolumeChange>().unwrap(), VolumeChange::Relative(5));
        assert_eq!(" -5 ".parse::<VolumeChange>().unwrap(), VolumeChange::Relative(-5));
    }

    #[test]
    fn rejects_malformed_volume() {
        for raw in ["", "+", "-", "loud", "5.5", "+x"] {
            assert!(
                matches!(raw.parse::<VolumeChange>(), Err(ApiError::InvalidRequest(_))),
                "input: {:?}",
                raw
            );
        }
    }

    #[test]
    fn volume_change_clamps() {
        assert_eq!(VolumeChange::Relative(5).apply(20), 25);
        assert_eq!(VolumeChange::Relative(-30).apply(20), 0);
        assert_eq!(VolumeChange::Relative(90).apply(20), 100);
        assert_eq!(VolumeChange::Absolute(150).apply(20), 100);
        assert_eq!(VolumeChange::Absolute(-3).apply(20), 0);
        assert_eq!(VolumeChange::from(42).apply(0), 42);
    }

    #[tokio::test]
    async fn unknown_room_touches_no_device() {
        let h = harness().await;
        let before = h.speakers.calls().len();

        assert!(matches!(h.player.play("Attic").await, Err(ApiError::RoomNotFound(_))));
        assert!(matches!(
            h.player.set_volume("Attic", VolumeChange::Relative(5)).await,
            Err(ApiError::RoomNotFound(_))
        ));
        assert_eq!(h.speakers.calls().len(), before);
    }

    #[tokio::test]
    async fn play_and_pause_address_the_room() {
        let h = harness().await;

        h.player.play("living room").await.unwrap();
        assert_eq!(h.speakers.device(LIVING.0).state, TransportState::Playing);

        h.player.pause("Living Room").await.unwrap();
        assert_eq!(h.speakers.device(LIVING.0).state, TransportState::Paused);
        assert_eq!(h.speakers.device(KITCHEN.0).state, TransportState::Stopped);
    }

    #[tokio::test]
    async fn play_pause_toggles() {
        let h = harness().await;
        h.speakers.update(LIVING.0, |d| d.state = TransportState::Playing);

        assert_eq!(h.player.play_pause("Living Room").await.unwrap(), TransportState::Paused);
        assert_eq!(h.player.play_pause("Living Room").await.unwrap(), TransportState::Playing);
        assert_eq!(h.speakers.device(LIVING.0).state, TransportState::Playing);
    }

    #[tokio::test]
    async fn next_and_previous_are_forwarded() {
        let h = harness().await;

        h.player.next("Kitchen").await.unwrap();
        h.player.previous("Kitchen").await.unwrap();

        let calls = h.speakers.calls();
        assert!(calls.contains(&"next 10.0.0.2".to_string()));
        assert!(calls.contains(&"previous 10.0.0.2".to_string()));
    }

    #[tokio::test]
    async fn relative_volume_reads_current_level() {
        let h = harness().await;

        assert_eq!(
            h.player
                .set_volume("Kitchen", VolumeChange::Relative(5))
                .await
                .unwrap(),
            25
        );
        assert_eq!(h.speakers.count("volume"), 1);
        assert_eq!(h.speakers.device(KITCHEN.0).volume, 25);
    }

    #[tokio::test]
    async fn absolute_volume_skips_read() {
        let h = harness().await;

        assert_eq!(
            h.player
                .set_volume("Kitchen", VolumeChange::Absolute(35))
                .await
                .unwrap(),
            35
        );
        assert_eq!(h.speakers.count("volume"), 0);
    }

    #[tokio::test]
    async fn mute_commands() {
        let h = harness().await;

        assert!(h.player.mute("Kitchen").await.unwrap());
        assert!(h.speakers.device(KITCHEN.0).mute);
        assert!(!h.player.toggle_mute("Kitchen").await.unwrap());
        assert!(!h.speakers.device(KITCHEN.0).mute);
        assert!(h.player.toggle_mute("Kitchen").await.unwrap());
        assert!(!h.player.unmute("Kitchen").await.unwrap());
        assert!(!h.speakers.device(KITCHEN.0).mute);
    }

    #[tokio::test]
    async fn volume_change_is_broadcast() {
        let h = harness().await;
        let mut sub = h.events.subscribe();

        h.player
            .set_volume("Kitchen", VolumeChange::Absolute(40))
            .await
            .unwrap();

        let Some(Delivery::Message(msg)) = sub.next(Duration::from_secs(1)).await else {
            panic!("expected volume event");
        };
        assert_eq!(msg.event, kind::VOLUME);
        assert_eq!(msg.data, json!({ "room": "kitchen", "volume": 40 }));
    }

    #[tokio::test]
    async fn join_uses_target_uuid() {
        let h = harness().await;

        h.player.join("Kitchen", "living room").await.unwrap();
        assert!(h
            .speakers
            .calls()
            .contains(&"join 10.0.0.2 RINCON_A01400".to_string()));

        assert!(matches!(
            h.player.join("Kitchen", "Attic").await,
            Err(ApiError::RoomNotFound(r)) if r == "Attic"
        ));
        assert_eq!(h.speakers.count("join"), 1);
    }

    #[tokio::test]
    async fn leave_is_forwarded() {
        let h = harness().await;
        h.player.leave("Kitchen").await.unwrap();
        assert_eq!(h.speakers.count("leave"), 1);
    }

    fn group_kitchen_under_living(h: &Harness) {
        h.speakers.set_groups(vec![ZoneGroup {
            id: "RINCON_A01400:1".into(),
            coordinator_uuid: LIVING.1.into(),
            coordinator_ip: LIVING.0.into(),
            members: vec![
                ZoneGroupMember {
                    uuid: LIVING.1.into(),
                    ip: LIVING.0.into(),
                    zone_name: LIVING.2.into(),
                },
                ZoneGroupMember {
                    uuid: KITCHEN.1.into(),
                    ip: KITCHEN.0.into(),
                    zone_name: KITCHEN.2.into(),
                },
            ],
        }]);
    }

    #[tokio::test]
    async fn group_volume_targets_coordinator() {
        let h = harness().await;
        group_kitchen_under_living(&h);

        let level = h
            .player
            .set_group_volume("Kitchen", VolumeChange::Relative(-5))
            .await
            .unwrap();

        assert_eq!(level, 15);
        assert_eq!(h.speakers.device(LIVING.0).group_volume, 15);
        assert!(h
            .speakers
            .calls()
            .contains(&"set_group_volume 10.0.0.1 15".to_string()));
    }

    #[tokio::test]
    async fn group_volume_requires_a_group() {
        let h = harness().await;
        h.speakers.set_groups(Vec::new());

        assert!(matches!(
            h.player
                .set_group_volume("Kitchen", VolumeChange::Absolute(10))
                .await,
            Err(ApiError::NotGrouped(_))
        ));
        assert_eq!(h.speakers.count("set_group_volume"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn group_volume_holds_the_coordinator_room() {
        let h = Arc::new(harness().await);
        group_kitchen_under_living(&h);
        h.speakers.set_delay(Duration::from_millis(100));

        let group = {
            let h = h.clone();
            tokio::spawn(async move {
                h.player
                    .set_group_volume("Kitchen", VolumeChange::Relative(5))
                    .await
            })
        };
        let room = {
            let h = h.clone();
            tokio::spawn(async move {
                h.player
                    .set_volume("Living Room", VolumeChange::Relative(5))
                    .await
            })
        };
        assert_eq!(group.await.unwrap().unwrap(), 25);
        assert_eq!(room.await.unwrap().unwrap(), 25);

        assert_eq!(h.speakers.max_in_flight_per_device(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn crossed_group_volume_commands_do_not_deadlock() {
        let h = Arc::new(harness().await);
        group_kitchen_under_living(&h);
        h.speakers.set_delay(Duration::from_millis(50));

        let tasks: Vec<_> = ["Kitchen", "Living Room", "Kitchen", "Living Room"]
            .into_iter()
            .map(|room| {
                let h = h.clone();
                tokio::spawn(async move {
                    h.player
                        .set_group_volume(room, VolumeChange::Relative(1))
                        .await
                })
            })
            .collect();

        let finished = tokio::time::timeout(Duration::from_secs(30), async {
            for task in tasks {
                task.await.unwrap().unwrap();
            }
        })
        .await;

        assert!(finished.is_ok());
        assert_eq!(h.speakers.device(LIVING.0).group_volume, 24);
        assert_eq!(h.speakers.max_in_flight_per_device(), 1);
    }

    #[tokio::test]
    async fn seek_by_position_and_track() {
        let h = harness().await;

        h.player
            .seek("Kitchen", SeekTarget::Position(95))
            .await
            .unwrap();
        h.player.seek("Kitchen", SeekTarget::Track(3)).await.unwrap();

        let calls = h.speakers.calls();
        assert!(calls.contains(&"seek 10.0.0.2 95".to_string()));
        assert!(calls.contains(&"play_from_queue 10.0.0.2 RINCON_B01400 3".to_string()));
    }

    #[tokio::test]
    async fn seek_to_track_zero_is_rejected() {
        let h = harness().await;
        let before = h.speakers.calls().len();

        assert!(matches!(
            h.player.seek("Kitchen", SeekTarget::Track(0)).await,
            Err(ApiError::InvalidRequest(_))
        ));
        assert_eq!(h.speakers.calls().len(), before);
    }

    #[tokio::test]
    async fn play_mode_keeps_unspecified_half() {
        let h = harness().await;
        h.speakers.update(KITCHEN.0, |d| {
            d.play_mode = PlayMode {
                shuffle: false,
                repeat: Repeat::All,
            }
        });

        let mode = h
            .player
            .set_play_mode("Kitchen", Some(true), None)
            .await
            .unwrap();

        assert_eq!(
            mode,
            PlayMode {
                shuffle: true,
                repeat: Repeat::All
            }
        );
        assert!(h
            .speakers
            .calls()
            .contains(&"set_play_mode 10.0.0.2 SHUFFLE".to_string()));
    }

    #[tokio::test]
    async fn full_play_mode_skips_read() {
        let h = harness().await;

        h.player
            .set_play_mode("Kitchen", Some(false), Some(Repeat::One))
            .await
            .unwrap();

        assert_eq!(h.speakers.count("play_mode"), 0);
        assert_eq!(h.speakers.device(KITCHEN.0).play_mode.as_wire(), "REPEAT_ONE");
    }

    #[tokio::test]
    async fn sleep_timer_zero_cancels() {
        let h = harness().await;

        h.player.set_sleep_timer("Kitchen", 900).await.unwrap();
        assert_eq!(h.speakers.device(KITCHEN.0).sleep_timer, Some(900));

        h.player.set_sleep_timer("Kitchen", 0).await.unwrap();
        assert_eq!(h.speakers.device(KITCHEN.0).sleep_timer, None);
        assert!(h
            .speakers
            .calls()
            .contains(&"set_sleep_timer 10.0.0.2 off".to_string()));
    }

    #[tokio::test]
    async fn equalizer_clamps_and_sets_only_given_levels() {
        let h = harness().await;

        let applied = h
            .player
            .set_equalizer("Kitchen", Some(14), None)
            .await
            .unwrap();

        assert_eq!(
            applied,
            Equalizer {
                bass: Some(10),
                treble: None
            }
        );
        assert_eq!(h.speakers.device(KITCHEN.0).bass, 10);
        assert_eq!(h.speakers.count("set_treble"), 0);

        let applied = h
            .player
            .set_equalizer("Kitchen", Some(-3), Some(-40))
            .await
            .unwrap();
        assert_eq!(applied.treble, Some(-10));
        assert_eq!(h.speakers.device(KITCHEN.0).treble, -10);
    }

    #[tokio::test]
    async fn queue_is_read_and_cleared() {
        let h = harness().await;
        h.speakers.update(KITCHEN.0, |d| {
            d.queue = vec![
                QueueItem {
                    position: 1,
                    title: "So What".into(),
                    ..QueueItem::default()
                },
                QueueItem {
                    position: 2,
                    title: "Freddie Freeloader".into(),
                    ..QueueItem::default()
                },
            ]
        });
        let mut sub = h.events.subscribe();

        let queue = h.player.queue("kitchen").await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[1].title, "Freddie Freeloader");

        h.player.clear_queue("Kitchen").await.unwrap();
        assert!(h.player.queue("Kitchen").await.unwrap().is_empty());

        let Some(Delivery::Message(msg)) = sub.next(Duration::from_secs(1)).await else {
            panic!("expected queue event");
        };
        assert_eq!(msg.event, kind::QUEUE);
        assert_eq!(msg.data["room"], "kitchen");
    }

    #[test]
    fn favorite_match_prefers_exact_then_prefix_then_contains() {
        let favorites: Vec<Favorite> = ["Jazz Classics", "Morning Jazz", "Jazz", "Jazzy Beats"]
            .iter()
            .map(|title| Favorite {
                title: (*title).to_string(),
                uri: format!("x-sonosapi:{}", title),
                metadata: String::new(),
            })
            .collect();

        let title = |name: &str| find_favorite(&favorites, name).map(|f| f.title.as_str());
        assert_eq!(title("JAZZ"), Some("Jazz"));
        assert_eq!(title("jazz c"), Some("Jazz Classics"));
        assert_eq!(title("jazzy"), Some("Jazzy Beats"));
        assert_eq!(title("morning"), Some("Morning Jazz"));
        assert_eq!(title("classics"), Some("Jazz Classics"));
        assert_eq!(title("blues"), None);
        assert_eq!(title("  "), None);
    }

    #[tokio::test]
    async fn play_favorite_loads_best_match() {
        let h = harness().await;
        h.speakers.set_favorites(&[
            ("Radio Paradise Mellow", "x-rincon-mp3radio://mellow"),
            ("Radio Paradise", "x-rincon-mp3radio://main"),
        ]);

        let favorite = h
            .player
            .play_favorite("Living Room", "radio paradise")
            .await
            .unwrap();

        assert_eq!(favorite.title, "Radio Paradise");
        assert!(h
            .speakers
            .calls()
            .contains(&"play_favorite 10.0.0.1 x-rincon-mp3radio://main".to_string()));
        assert_eq!(h.speakers.device(LIVING.0).state, TransportState::Playing);
    }

    #[tokio::test]
    async fn missing_favorite_lists_available() {
        let h = harness().await;
        h.speakers.set_favorites(&[("Radio Paradise", "x-rincon-mp3radio://main")]);

        let err = h
            .player
            .play_favorite("Living Room", "podcast")
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            ApiError::FavoriteNotFound { available, .. } if available == &["Radio Paradise".to_string()]
        ));
        assert_eq!(h.speakers.count("play_favorite"), 0);
    }

    #[tokio::test]
    async fn favorites_are_listed_through_any_room() {
        let h = harness().await;
        h.speakers.set_favorites(&[("Radio Paradise", "x-rincon-mp3radio://main")]);

        let favorites = h.player.favorites().await.unwrap();

        assert_eq!(favorites.len(), 1);
        assert_eq!(h.speakers.count("favorites"), 1);
    }

    #[tokio::test]
    async fn favorites_need_a_speaker() {
        let speakers = Arc::new(FakeSpeakers::default());
        let registry = Arc::new(DeviceRegistry::new(
            speakers.clone(),
            Arc::new(FakeDiscovery::default()),
            Arc::new(EventBroadcaster::default()),
            RegistryConfig::default(),
        ));
        let player = PlayerCommands::new(
            registry,
            speakers,
            Arc::new(EventBroadcaster::default()),
            RetryPolicy::default(),
        );

        assert!(matches!(player.favorites().await, Err(ApiError::NoSpeakers)));
    }

    #[tokio::test]
    async fn state_collects_room_details() {
        let h = harness().await;
        h.speakers.update(LIVING.0, |d| {
            d.state = TransportState::Playing;
            d.volume = 33;
            d.track.title = "Blue in Green".into();
        });

        let state = h.player.state("living room").await.unwrap();

        assert_eq!(state.room.as_str(), "living_room");
        assert_eq!(state.name, "Living Room");
        assert_eq!(state.state, TransportState::Playing);
        assert_eq!(state.volume, 33);
        assert!(!state.mute);
        assert_eq!(state.track.title, "Blue in Green");
    }

    #[tokio::test]
    async fn zones_summarize_each_group() {
        let h = harness().await;
        h.speakers.update(KITCHEN.0, |d| d.volume = 12);

        let zones = h.player.zones().await.unwrap();

        assert_eq!(zones.len(), 2);
        let kitchen = zones.iter().find(|z| z.coordinator == "Kitchen").unwrap();
        assert_eq!(kitchen.coordinator_uuid, KITCHEN.1);
        assert_eq!(kitchen.members.len(), 1);
        assert_eq!(kitchen.members[0].room.as_str(), "kitchen");
        assert_eq!(kitchen.state, Some(TransportState::Stopped));
        assert_eq!(kitchen.volume, Some(12));
    }

    #[tokio::test]
    async fn zones_tolerate_unreadable_topology() {
        let h = harness().await;
        h.speakers.fail_always("zone_groups", Failure::Parse);

        assert!(h.player.zones().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pause_all_pauses_only_playing_rooms() {
        let h = harness().await;
        h.speakers.update(LIVING.0, |d| d.state = TransportState::Playing);

        let paused = h.player.pause_all().await;

        assert_eq!(paused, vec![RoomKey::new("Living Room")]);
        assert_eq!(h.speakers.device(LIVING.0).state, TransportState::Paused);
        assert_eq!(h.speakers.count("pause"), 1);
    }

    #[tokio::test]
    async fn resume_all_resumes_only_paused_rooms() {
        let h = harness().await;
        h.speakers.update(LIVING.0, |d| d.state = TransportState::Paused);
        h.speakers.update(KITCHEN.0, |d| d.state = TransportState::Paused);

        let resumed = h.player.resume_all().await;

        assert_eq!(resumed, vec![RoomKey::new("Kitchen"), RoomKey::new("Living Room")]);
        assert_eq!(h.speakers.count("play"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_commands_skip_failing_rooms() {
        let h = harness().await;
        h.speakers.update(LIVING.0, |d| d.state = TransportState::Playing);
        h.speakers.update(KITCHEN.0, |d| d.state = TransportState::Playing);
        h.speakers.fail_always("pause 10.0.0.2", Failure::Timeout);

        let paused = h.player.pause_all().await;

        assert_eq!(paused, vec![RoomKey::new("Living Room")]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let h = harness().await;
        h.speakers.fail_once("play", Failure::Timeout);

        h.player.play("Kitchen").await.unwrap();

        assert_eq!(h.speakers.count("play"), 2);
        assert_eq!(h.speakers.device(KITCHEN.0).state, TransportState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_room_triggers_rediscovery() {
        let h = harness().await;
        let probes = h.discovery.probes();
        h.speakers.fail_always("pause 10.0.0.1", Failure::Connection);

        let err = h.player.pause("Living Room").await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(h.speakers.count("pause"), 2);
        assert_eq!(h.discovery.probes(), probes + 1);
    }
}
