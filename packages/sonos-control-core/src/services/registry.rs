//! Device registry: the current room → speaker map and per-device locks.
//!
//! The registry owns three things:
//! - the discovery snapshot, an immutable map swapped wholesale on each pass
//! - one async mutex per room, serializing every operation on that device
//! - the background refresh loop that keeps the snapshot fresh
//!
//! Readers never block discovery: [`DeviceRegistry::snapshot`] hands out the
//! current `Arc`, and a concurrent pass replaces it rather than mutating it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::{kind, EventBroadcaster};
use crate::rooms::RoomKey;
use crate::sonos::discovery::{normalize_uuid, DiscoveredSpeaker, Speaker};
use crate::sonos::error::DeviceError;
use crate::sonos::traits::{SpeakerDiscovery, SpeakerTopology};

/// Immutable room → speaker map produced by one discovery pass.
pub type Snapshot = Arc<HashMap<RoomKey, Speaker>>;

/// Timing settings for the registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Pause between background discovery passes.
    pub refresh_interval: Duration,
    /// How long each probe waits for answers.
    pub discovery_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            discovery_timeout: Duration::from_secs(5),
        }
    }
}

struct RefreshTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Known speakers, their locks, and the refresh loop.
pub struct DeviceRegistry {
    speakers: Arc<dyn SpeakerTopology>,
    discovery: Arc<dyn SpeakerDiscovery>,
    events: Arc<EventBroadcaster>,
    config: RegistryConfig,
    snapshot: RwLock<Snapshot>,
    locks: DashMap<RoomKey, Arc<Mutex<()>>>,
    /// One discovery pass at a time so snapshots are installed in order.
    pass: Mutex<()>,
    refresh: parking_lot::Mutex<Option<RefreshTask>>,
    /// Background pass started by [`trigger_rediscovery`](Self::trigger_rediscovery).
    rediscovery: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DeviceRegistry {
    /// Creates an empty registry. Nothing is probed until [`start`](Self::start).
    pub fn new(
        speakers: Arc<dyn SpeakerTopology>,
        discovery: Arc<dyn SpeakerDiscovery>,
        events: Arc<EventBroadcaster>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            speakers,
            discovery,
            events,
            config,
            snapshot: RwLock::new(Arc::new(HashMap::new())),
            locks: DashMap::new(),
            pass: Mutex::new(()),
            refresh: parking_lot::Mutex::new(None),
            rediscovery: parking_lot::Mutex::new(None),
        }
    }

    /// Runs one discovery pass, then starts the background refresh loop.
    ///
    /// Finding no speakers is logged, not treated as an error. Calling this
    /// while the loop is already running does nothing.
    pub async fn start(self: &Arc<Self>) {
        if self.refresh.lock().is_some() {
            log::warn!("[Registry] Already started");
            return;
        }

        let count = self.discover().await;
        if count == 0 {
            log::warn!("[Registry] No speakers found at startup; will keep looking");
        }

        let cancel = CancellationToken::new();
        let registry = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { registry.refresh_loop(token).await });

        let mut refresh = self.refresh.lock();
        if refresh.is_some() {
            // Lost a race with a concurrent start
            cancel.cancel();
            handle.abort();
            return;
        }
        *refresh = Some(RefreshTask { cancel, handle });
        log::info!(
            "[Registry] Refresh loop started (every {:?})",
            self.config.refresh_interval
        );
    }

    /// Stops the refresh loop and waits for it to finish.
    ///
    /// A pending rediscovery is aborted.
    pub async fn stop(&self) {
        if let Some(pending) = self.rediscovery.lock().take() {
            pending.abort();
        }
        let task = self.refresh.lock().take();
        if let Some(RefreshTask { cancel, handle }) = task {
            cancel.cancel();
            if let Err(e) = handle.await {
                log::warn!("[Registry] Refresh loop ended abnormally: {}", e);
            }
            log::info!("[Registry] Refresh loop stopped");
        }
    }

    async fn refresh_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.refresh_interval) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.discover() => {}
            }
        }
    }

    /// Probes the network and installs a fresh snapshot.
    ///
    /// Only speakers the household topology lists as visible rooms are kept,
    /// so bonded partners, surrounds and subs never shadow their room. When
    /// no speaker can report the topology every answer is kept. Names are
    /// resolved concurrently; a speaker whose name cannot be read is skipped. A failed probe, or one that yields no usable speaker,
    /// keeps the previous snapshot. Returns the number of known speakers
    /// after the pass.
    pub async fn discover(&self) -> usize {
        let _pass = self.pass.lock().await;

        let mut found = match self.discovery.probe(self.config.discovery_timeout).await {
            Ok(found) => found,
            Err(e) => {
                let kept = self.snapshot.read().len();
                log::warn!("[Registry] Discovery failed, keeping {} speaker(s): {}", kept, e);
                return kept;
            }
        };

        if found.is_empty() {
            let kept = self.snapshot.read().len();
            log::warn!("[Registry] No speakers answered, keeping {} speaker(s)", kept);
            return kept;
        }

        match self.visible_members(&found).await {
            Some(visible) => {
                let answered = found.len();
                found.retain(|device| visible.contains(&device.uuid));
                if found.len() < answered {
                    log::debug!(
                        "[Registry] Ignoring {} hidden speaker(s)",
                        answered - found.len()
                    );
                }
            }
            None => log::warn!("[Registry] Topology unavailable, keeping every speaker that answered"),
        }

        let named = join_all(found.into_iter().map(|device| async move {
            let name = self.speakers.player_name(&device.ip).await;
            (device, name)
        }))
        .await;

        let mut next = HashMap::with_capacity(named.len());
        for (device, name) in named {
            let name = match name {
                Ok(name) => name,
                Err(e) => {
                    log::warn!("[Registry] Failed to get player name for {}: {}", device.ip, e);
                    continue;
                }
            };

            let key = RoomKey::new(&name);
            if key.as_str().is_empty() {
                log::warn!("[Registry] Skipping {} with blank room name", device.ip);
                continue;
            }

            self.locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));

            let speaker = device.into_speaker(name);
            if let Some(replaced) = next.insert(key.clone(), speaker) {
                log::warn!(
                    "[Registry] Duplicate room {}: {} replaced by later {}",
                    key,
                    replaced.ip,
                    next[&key].ip
                );
            }
        }

        if next.is_empty() {
            let kept = self.snapshot.read().len();
            log::warn!("[Registry] No speaker names resolved, keeping {} speaker(s)", kept);
            return kept;
        }

        let rooms: BTreeSet<RoomKey> = next.keys().cloned().collect();
        let previous = std::mem::replace(&mut *self.snapshot.write(), Arc::new(next));
        let count = rooms.len();
        log::info!("[Registry] Discovered {} speaker(s): {:?}", count, rooms);

        let previous_rooms: BTreeSet<&RoomKey> = previous.keys().collect();
        let current_rooms: BTreeSet<&RoomKey> = rooms.iter().collect();
        if previous_rooms != current_rooms {
            self.events.broadcast(
                kind::SPEAKERS_CHANGED,
                json!({ "rooms": rooms, "count": count }),
            );
        }

        count
    }

    /// Reads the topology from the first speaker that can report it and
    /// returns the uuids of its visible room members.
    async fn visible_members(&self, found: &[DiscoveredSpeaker]) -> Option<HashSet<String>> {
        for device in found {
            match self.speakers.zone_groups(&device.ip).await {
                Ok(groups) if !groups.is_empty() => {
                    return Some(
                        groups
                            .iter()
                            .flat_map(|group| group.members.iter())
                            .map(|member| normalize_uuid(&member.uuid))
                            .collect(),
                    );
                }
                Ok(_) => log::debug!("[Registry] {} reported an empty topology", device.ip),
                Err(e) => log::debug!("[Registry] No topology from {}: {}", device.ip, e),
            }
        }
        None
    }

    /// Looks up the speaker for `room` (any spelling that normalizes the same).
    #[must_use]
    pub fn get(&self, room: &str) -> Option<Speaker> {
        let key = RoomKey::new(room);
        self.snapshot.read().get(key.as_str()).cloned()
    }

    /// Returns the lock for `room`, creating it on first use.
    ///
    /// Concurrent callers for the same room always get the same lock.
    pub fn get_lock(&self, room: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(RoomKey::new(room))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `f` while holding the lock for `room`.
    pub async fn with_lock<F, Fut, T>(&self, room: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.get_lock(room);
        let _guard = lock.lock().await;
        f().await
    }

    /// Locks a known room and returns its speaker with the held guard.
    ///
    /// Returns `None` for unknown rooms without creating a lock. The speaker
    /// is looked up again once the lock is held, so a handle replaced by
    /// rediscovery while waiting is picked up.
    pub async fn acquire(&self, room: &str) -> Option<(Speaker, OwnedMutexGuard<()>)> {
        self.get(room)?;
        let guard = self.get_lock(room).lock_owned().await;
        let speaker = self.get(room)?;
        Some((speaker, guard))
    }

    /// Starts rediscovery if `err` means the device could not be reached.
    pub fn observe_failure(self: &Arc<Self>, err: &DeviceError) {
        if err.is_connection() {
            log::warn!("[Registry] Device unreachable ({}), rediscovering", err);
            self.trigger_rediscovery();
        }
    }

    /// Returns a copy of the current room → speaker map.
    #[must_use]
    pub fn list_speakers(&self) -> HashMap<RoomKey, Speaker> {
        self.snapshot.read().as_ref().clone()
    }

    /// Returns the current snapshot without copying it.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.snapshot.read())
    }

    /// Starts a discovery pass in the background and returns immediately.
    ///
    /// Requests made while a triggered pass is still pending are merged
    /// into it.
    pub fn trigger_rediscovery(self: &Arc<Self>) {
        let mut pending = self.rediscovery.lock();
        if pending.as_ref().is_some_and(|task| !task.is_finished()) {
            log::debug!("[Registry] Rediscovery already pending");
            return;
        }

        log::info!("[Registry] Rediscovery triggered");
        let registry = Arc::clone(self);
        *pending = Some(tokio::spawn(async move {
            registry.discover().await;
        }));
    }

    /// Runs a discovery pass now and waits for it.
    pub async fn refresh_now(&self) -> usize {
        self.discover().await
    }
}
