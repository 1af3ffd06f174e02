//! In-memory speaker capabilities shared by the service tests.
//!
//! [`FakeSpeakers`] keeps a small state machine per speaker address, records
//! every call, and can be scripted to fail specific operations.
//! [`FakeDiscovery`] returns scripted probe results.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::sonos::discovery::{DiscoveredSpeaker, DiscoveryError, DiscoveryResult};
use crate::sonos::error::{DeviceError, DeviceResult};
use crate::sonos::traits::{
    SpeakerDiscovery, SpeakerLibrary, SpeakerTopology, SpeakerTransport, SpeakerVolume,
};
use crate::sonos::types::{
    Favorite, PlayMode, QueueItem, TrackInfo, TransportState, ZoneGroup, ZoneGroupMember,
};

/// Failure kinds a test can script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Connection,
    Timeout,
    Fault,
    Parse,
}

impl Failure {
    fn to_error(self) -> DeviceError {
        match self {
            Self::Connection => DeviceError::Connection("connection refused".into()),
            Self::Timeout => DeviceError::Timeout(Duration::from_secs(10)),
            Self::Fault => DeviceError::Fault("UPnPError (701)".into()),
            Self::Parse => DeviceError::Parse("garbled".into()),
        }
    }
}

/// State of one fake speaker.
#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub name: String,
    pub uuid: String,
    pub state: TransportState,
    pub volume: u8,
    pub mute: bool,
    pub track: TrackInfo,
    pub group_volume: u8,
    /// Polls of `transport_state` that still report PLAYING after `play_uri`.
    pub playing_polls: u32,
    pub play_mode: PlayMode,
    pub bass: i8,
    pub treble: i8,
    pub sleep_timer: Option<u64>,
    pub queue: Vec<QueueItem>,
}

impl FakeDevice {
    fn standalone(uuid: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            uuid: uuid.to_string(),
            state: TransportState::Stopped,
            volume: 20,
            mute: false,
            track: TrackInfo::default(),
            group_volume: 20,
            playing_polls: 0,
            play_mode: PlayMode::NORMAL,
            bass: 0,
            treble: 0,
            sleep_timer: None,
            queue: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Scripted {
    once: VecDeque<Failure>,
    always: Option<Failure>,
}

/// Fake implementation of the speaker control traits.
#[derive(Default)]
pub struct FakeSpeakers {
    devices: Mutex<HashMap<String, FakeDevice>>,
    groups: Mutex<Vec<ZoneGroup>>,
    favorites: Mutex<Vec<Favorite>>,
    failures: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight_per_device: AtomicUsize,
    total_in_flight: AtomicUsize,
    max_in_flight_total: AtomicUsize,
    /// Polls of `transport_state` reported as PLAYING after each `play_uri`.
    pub announcement_polls: AtomicUsize,
}

impl FakeSpeakers {
    /// Creates a fake with one standalone speaker per `(ip, uuid, name)`.
    pub fn with_rooms(rooms: &[(&str, &str, &str)]) -> Self {
        let fake = Self::default();
        fake.announcement_polls.store(2, Ordering::SeqCst);
        {
            let mut devices = fake.devices.lock();
            let mut groups = fake.groups.lock();
            for (ip, uuid, name) in rooms {
                devices.insert((*ip).to_string(), FakeDevice::standalone(uuid, name));
                groups.push(ZoneGroup {
                    id: format!("{}:1", uuid),
                    coordinator_uuid: (*uuid).to_string(),
                    coordinator_ip: (*ip).to_string(),
                    members: vec![ZoneGroupMember {
                        uuid: (*uuid).to_string(),
                        ip: (*ip).to_string(),
                        zone_name: (*name).to_string(),
                    }],
                });
            }
        }
        fake
    }

    /// Adds a speaker that answers probes but is absent from the topology,
    /// like the second speaker of a stereo pair.
    pub fn add_hidden(&self, ip: &str, uuid: &str, name: &str) {
        self.devices
            .lock()
            .insert(ip.to_string(), FakeDevice::standalone(uuid, name));
    }

    /// Mutates the fake speaker at `ip`.
    pub fn update(&self, ip: &str, f: impl FnOnce(&mut FakeDevice)) {
        if let Some(device) = self.devices.lock().get_mut(ip) {
            f(device);
        }
    }

    /// Returns a copy of the fake speaker at `ip`.
    pub fn device(&self, ip: &str) -> FakeDevice {
        self.devices.lock().get(ip).cloned().expect("unknown fake device")
    }

    /// Replaces the zone group topology.
    pub fn set_groups(&self, groups: Vec<ZoneGroup>) {
        *self.groups.lock() = groups;
    }

    /// Replaces the household favorites.
    pub fn set_favorites(&self, favorites: &[(&str, &str)]) {
        *self.favorites.lock() = favorites
            .iter()
            .map(|(title, uri)| Favorite {
                title: (*title).to_string(),
                uri: (*uri).to_string(),
                metadata: String::new(),
            })
            .collect();
    }

    /// Fails the next call of `op` (optionally `"op ip"`) once.
    pub fn fail_once(&self, op: &str, failure: Failure) {
        self.failures
            .lock()
            .entry(op.to_string())
            .or_default()
            .once
            .push_back(failure);
    }

    /// Fails every call of `op` (optionally `"op ip"`).
    pub fn fail_always(&self, op: &str, failure: Failure) {
        self.failures.lock().entry(op.to_string()).or_default().always = Some(failure);
    }

    /// Makes every call take `delay` before completing.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Returns the recorded calls, formatted as `"op ip args..."`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Counts recorded calls whose op name equals `op`.
    pub fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    /// Highest number of overlapping calls seen against a single device.
    pub fn max_in_flight_per_device(&self) -> usize {
        self.max_in_flight_per_device.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping calls seen across all devices.
    pub fn max_in_flight_total(&self) -> usize {
        self.max_in_flight_total.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, op: &str, ip: &str) -> Option<Failure> {
        let mut failures = self.failures.lock();
        for key in [format!("{} {}", op, ip), op.to_string()] {
            if let Some(scripted) = failures.get_mut(&key) {
                if let Some(failure) = scripted.once.pop_front() {
                    return Some(failure);
                }
                if let Some(failure) = scripted.always {
                    return Some(failure);
                }
            }
        }
        None
    }

    /// Records the call, simulates latency, and applies scripted failures.
    async fn enter(&self, op: &str, ip: &str, args: String) -> DeviceResult<()> {
        let line = if args.is_empty() {
            format!("{} {}", op, ip)
        } else {
            format!("{} {} {}", op, ip, args)
        };
        self.calls.lock().push(line);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            let per_device = {
                let mut in_flight = self.in_flight.lock();
                let n = in_flight.entry(ip.to_string()).or_insert(0);
                *n += 1;
                *n
            };
            self.max_in_flight_per_device
                .fetch_max(per_device, Ordering::SeqCst);
            let total = self.total_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight_total.fetch_max(total, Ordering::SeqCst);

            tokio::time::sleep(delay).await;

            self.total_in_flight.fetch_sub(1, Ordering::SeqCst);
            if let Some(n) = self.in_flight.lock().get_mut(ip) {
                *n -= 1;
            }
        }

        match self.scripted_failure(op, ip) {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn with_device<T>(&self, ip: &str, f: impl FnOnce(&mut FakeDevice) -> T) -> DeviceResult<T> {
        self.devices
            .lock()
            .get_mut(ip)
            .map(f)
            .ok_or_else(|| DeviceError::Connection(format!("no route to {}", ip)))
    }
}

#[async_trait]
impl SpeakerTransport for FakeSpeakers {
    async fn transport_state(&self, ip: &str) -> DeviceResult<TransportState> {
        self.enter("transport_state", ip, String::new()).await?;
        self.with_device(ip, |d| {
            if d.playing_polls > 0 {
                d.playing_polls -= 1;
                if d.playing_polls == 0 {
                    d.state = TransportState::Stopped;
                }
                return TransportState::Playing;
            }
            d.state
        })
    }

    async fn track_info(&self, ip: &str) -> DeviceResult<TrackInfo> {
        self.enter("track_info", ip, String::new()).await?;
        self.with_device(ip, |d| d.track.clone())
    }

    async fn play(&self, ip: &str) -> DeviceResult<()> {
        self.enter("play", ip, String::new()).await?;
        self.with_device(ip, |d| d.state = TransportState::Playing)
    }

    async fn pause(&self, ip: &str) -> DeviceResult<()> {
        self.enter("pause", ip, String::new()).await?;
        self.with_device(ip, |d| d.state = TransportState::Paused)
    }

    async fn next(&self, ip: &str) -> DeviceResult<()> {
        self.enter("next", ip, String::new()).await
    }

    async fn previous(&self, ip: &str) -> DeviceResult<()> {
        self.enter("previous", ip, String::new()).await
    }

    async fn play_uri(&self, ip: &str, uri: &str, title: &str) -> DeviceResult<()> {
        self.enter("play_uri", ip, format!("{} {}", uri, title)).await?;
        let polls = self.announcement_polls.load(Ordering::SeqCst) as u32;
        self.with_device(ip, |d| {
            d.track.uri = uri.to_string();
            d.track.title = title.to_string();
            d.playing_polls = polls;
            d.state = if polls == 0 {
                TransportState::Stopped
            } else {
                TransportState::Playing
            };
        })
    }

    async fn seek(&self, ip: &str, seconds: u64) -> DeviceResult<()> {
        self.enter("seek", ip, seconds.to_string()).await?;
        self.with_device(ip, |d| d.track.position = Some(seconds))
    }

    async fn play_from_queue(&self, ip: &str, uuid: &str, track: u32) -> DeviceResult<()> {
        self.enter("play_from_queue", ip, format!("{} {}", uuid, track))
            .await?;
        self.with_device(ip, |d| {
            if let Some(item) = d.queue.iter().find(|i| i.position == track) {
                d.track.title = item.title.clone();
                d.track.uri = item.uri.clone();
            }
            d.state = TransportState::Playing;
        })
    }

    async fn play_mode(&self, ip: &str) -> DeviceResult<PlayMode> {
        self.enter("play_mode", ip, String::new()).await?;
        self.with_device(ip, |d| d.play_mode)
    }

    async fn set_play_mode(&self, ip: &str, mode: PlayMode) -> DeviceResult<()> {
        self.enter("set_play_mode", ip, mode.as_wire().to_string())
            .await?;
        self.with_device(ip, |d| d.play_mode = mode)
    }

    async fn set_sleep_timer(&self, ip: &str, seconds: Option<u64>) -> DeviceResult<()> {
        let arg = seconds.map(|s| s.to_string()).unwrap_or_else(|| "off".into());
        self.enter("set_sleep_timer", ip, arg).await?;
        self.with_device(ip, |d| d.sleep_timer = seconds)
    }
}

#[async_trait]
impl SpeakerVolume for FakeSpeakers {
    async fn volume(&self, ip: &str) -> DeviceResult<u8> {
        self.enter("volume", ip, String::new()).await?;
        self.with_device(ip, |d| d.volume)
    }

    async fn set_volume(&self, ip: &str, volume: u8) -> DeviceResult<()> {
        self.enter("set_volume", ip, volume.to_string()).await?;
        self.with_device(ip, |d| d.volume = volume.min(100))
    }

    async fn mute(&self, ip: &str) -> DeviceResult<bool> {
        self.enter("mute", ip, String::new()).await?;
        self.with_device(ip, |d| d.mute)
    }

    async fn set_mute(&self, ip: &str, mute: bool) -> DeviceResult<()> {
        self.enter("set_mute", ip, mute.to_string()).await?;
        self.with_device(ip, |d| d.mute = mute)
    }

    async fn set_bass(&self, ip: &str, level: i8) -> DeviceResult<()> {
        self.enter("set_bass", ip, level.to_string()).await?;
        self.with_device(ip, |d| d.bass = level.clamp(-10, 10))
    }

    async fn set_treble(&self, ip: &str, level: i8) -> DeviceResult<()> {
        self.enter("set_treble", ip, level.to_string()).await?;
        self.with_device(ip, |d| d.treble = level.clamp(-10, 10))
    }
}

#[async_trait]
impl SpeakerLibrary for FakeSpeakers {
    async fn queue(&self, ip: &str) -> DeviceResult<Vec<QueueItem>> {
        self.enter("queue", ip, String::new()).await?;
        self.with_device(ip, |d| d.queue.clone())
    }

    async fn clear_queue(&self, ip: &str) -> DeviceResult<()> {
        self.enter("clear_queue", ip, String::new()).await?;
        self.with_device(ip, |d| d.queue.clear())
    }

    async fn favorites(&self, ip: &str) -> DeviceResult<Vec<Favorite>> {
        self.enter("favorites", ip, String::new()).await?;
        Ok(self.favorites.lock().clone())
    }

    async fn play_favorite(&self, ip: &str, favorite: &Favorite) -> DeviceResult<()> {
        self.enter("play_favorite", ip, favorite.uri.clone()).await?;
        self.with_device(ip, |d| {
            d.track.uri = favorite.uri.clone();
            d.track.title = favorite.title.clone();
            d.state = TransportState::Playing;
        })
    }
}

#[async_trait]
impl SpeakerTopology for FakeSpeakers {
    async fn player_name(&self, ip: &str) -> DeviceResult<String> {
        self.enter("player_name", ip, String::new()).await?;
        self.with_device(ip, |d| d.name.clone())
    }

    async fn zone_groups(&self, ip: &str) -> DeviceResult<Vec<ZoneGroup>> {
        self.enter("zone_groups", ip, String::new()).await?;
        Ok(self.groups.lock().clone())
    }

    async fn join(&self, ip: &str, coordinator_uuid: &str) -> DeviceResult<()> {
        self.enter("join", ip, coordinator_uuid.to_string()).await
    }

    async fn leave(&self, ip: &str) -> DeviceResult<()> {
        self.enter("leave", ip, String::new()).await
    }

    async fn group_volume(&self, coordinator_ip: &str) -> DeviceResult<u8> {
        self.enter("group_volume", coordinator_ip, String::new()).await?;
        self.with_device(coordinator_ip, |d| d.group_volume)
    }

    async fn set_group_volume(&self, coordinator_ip: &str, volume: u8) -> DeviceResult<()> {
        self.enter("set_group_volume", coordinator_ip, volume.to_string())
            .await?;
        self.with_device(coordinator_ip, |d| d.group_volume = volume.min(100))
    }
}

/// Fake discovery returning scripted results, then a default set.
#[derive(Default)]
pub struct FakeDiscovery {
    scripted: Mutex<VecDeque<DiscoveryResult<Vec<DiscoveredSpeaker>>>>,
    default: Mutex<Vec<DiscoveredSpeaker>>,
    probes: AtomicUsize,
}

impl FakeDiscovery {
    /// Creates a prober that always finds the given `(ip, uuid)` pairs.
    pub fn finding(found: &[(&str, &str)]) -> Self {
        let fake = Self::default();
        fake.set_default(found);
        fake
    }

    /// Replaces the default probe result.
    pub fn set_default(&self, found: &[(&str, &str)]) {
        *self.default.lock() = found
            .iter()
            .map(|(ip, uuid)| DiscoveredSpeaker::new(*ip, uuid))
            .collect();
    }

    /// Queues one probe result ahead of the default.
    pub fn push_result(&self, result: DiscoveryResult<Vec<DiscoveredSpeaker>>) {
        self.scripted.lock().push_back(result);
    }

    /// Queues one failing probe.
    pub fn push_failure(&self) {
        self.push_result(Err(DiscoveryError::NoInterfaces));
    }

    /// Number of probes performed so far.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeakerDiscovery for FakeDiscovery {
    async fn probe(&self, _timeout: Duration) -> DiscoveryResult<Vec<DiscoveredSpeaker>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.scripted.lock().pop_front() {
            return result;
        }
        Ok(self.default.lock().clone())
    }
}
