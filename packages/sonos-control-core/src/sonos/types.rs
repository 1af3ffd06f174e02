//! Sonos domain types for playback, tracks and zone groups.
//!
//! These types are what the speaker capabilities return and what the player
//! commands serialize back to callers.

use serde::{Deserialize, Serialize};

use crate::rooms::RoomKey;

// ─────────────────────────────────────────────────────────────────────────────
// Transport State
// ─────────────────────────────────────────────────────────────────────────────

/// Playback transport state as reported by the AVTransport service.
///
/// Serializes to the UPnP wire names ("PLAYING", "PAUSED_PLAYBACK", ...).
/// States the firmware reports that we do not recognize become `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportState {
    Playing,
    #[serde(rename = "PAUSED_PLAYBACK")]
    Paused,
    Stopped,
    Transitioning,
    Unknown,
}

impl TransportState {
    /// Returns true once playback has come to rest (stopped or paused).
    #[must_use]
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Stopped | Self::Paused)
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Playing => write!(f, "PLAYING"),
            Self::Paused => write!(f, "PAUSED_PLAYBACK"),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Transitioning => write!(f, "TRANSITIONING"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl From<&str> for TransportState {
    fn from(s: &str) -> Self {
        match s.trim() {
            "PLAYING" => Self::Playing,
            "PAUSED_PLAYBACK" | "PAUSED" => Self::Paused,
            // An empty queue reports no media; treat it as stopped
            "STOPPED" | "NO_MEDIA_PRESENT" => Self::Stopped,
            "TRANSITIONING" => Self::Transitioning,
            other => {
                log::debug!("[Sonos] Unrecognized transport state {:?}", other);
                Self::Unknown
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Play Mode
// ─────────────────────────────────────────────────────────────────────────────

/// Repeat setting of a play mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    Off,
    One,
    All,
}

/// Shuffle and repeat, as combined by the AVTransport `PlayMode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayMode {
    pub shuffle: bool,
    pub repeat: Repeat,
}

impl PlayMode {
    /// Plain sequential playback.
    pub const NORMAL: Self = Self {
        shuffle: false,
        repeat: Repeat::Off,
    };

    /// Parses a `PlayMode` wire value. Unrecognized values read as normal.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        let value = value.trim();
        let repeat = if value.contains("REPEAT_ONE") {
            Repeat::One
        } else if value.contains("REPEAT") || value == "SHUFFLE" {
            Repeat::All
        } else {
            Repeat::Off
        };
        Self {
            shuffle: value.contains("SHUFFLE"),
            repeat,
        }
    }

    /// Returns the `NewPlayMode` value for this combination.
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match (self.shuffle, self.repeat) {
            (false, Repeat::Off) => "NORMAL",
            (true, Repeat::Off) => "SHUFFLE_NOREPEAT",
            (false, Repeat::All) => "REPEAT_ALL",
            (true, Repeat::All) => "SHUFFLE",
            (false, Repeat::One) => "REPEAT_ONE",
            (true, Repeat::One) => "SHUFFLE_REPEAT_ONE",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queue & Favorites
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of a speaker's queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// 1-based position in the queue.
    pub position: u32,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_art: Option<String>,
    pub uri: String,
}

/// A household favorite ("My Sonos").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub title: String,
    pub uri: String,
    /// DIDL-Lite metadata to load alongside `uri`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Track & Player State
// ─────────────────────────────────────────────────────────────────────────────

/// Currently loaded track, as reported by GetPositionInfo.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_art: Option<String>,
    pub uri: String,
    /// Track length in seconds, if known.
    pub duration: Option<u64>,
    /// Elapsed time in seconds, if known.
    pub position: Option<u64>,
}

/// Full state of one room as returned by the state command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub room: RoomKey,
    pub name: String,
    pub state: TransportState,
    pub volume: u8,
    pub mute: bool,
    pub track: TrackInfo,
}

// ─────────────────────────────────────────────────────────────────────────────
// Zone Groups
// ─────────────────────────────────────────────────────────────────────────────

/// A speaker within a Sonos zone group.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneGroupMember {
    /// Unique identifier in RINCON_xxxxx format.
    pub uuid: String,
    /// Local IP address of the speaker.
    pub ip: String,
    /// User-configured room name.
    pub zone_name: String,
}

/// A Sonos zone group (speakers playing in sync).
///
/// Each group has a coordinator that controls playback for the group.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneGroup {
    /// Zone group identifier.
    pub id: String,
    /// UUID of the group coordinator.
    pub coordinator_uuid: String,
    /// IP address of the group coordinator.
    pub coordinator_ip: String,
    /// All speakers in this group (including the coordinator).
    ///
    /// Zone Bridges (BOOST devices) are filtered out as they cannot play audio.
    pub members: Vec<ZoneGroupMember>,
}

impl ZoneGroup {
    /// Returns true if the speaker with `uuid` is a member of this group.
    #[must_use]
    pub fn contains(&self, uuid: &str) -> bool {
        self.members.iter().any(|m| m.uuid == uuid)
    }

    /// Returns the coordinator's member entry, if present.
    #[must_use]
    pub fn coordinator(&self) -> Option<&ZoneGroupMember> {
        self.members.iter().find(|m| m.uuid == self.coordinator_uuid)
    }
}

/// Summary of one zone as returned by the zones command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    pub coordinator: String,
    pub coordinator_uuid: String,
    pub members: Vec<ZoneMemberSummary>,
    /// Coordinator playback details; absent if the coordinator is not
    /// reachable or not a known room.
    pub state: Option<TransportState>,
    pub volume: Option<u8>,
    pub track: Option<TrackInfo>,
}

/// One member room of a [`ZoneSummary`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneMemberSummary {
    pub room: RoomKey,
    pub name: String,
    pub uuid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_states() {
        assert_eq!(TransportState::from("PLAYING"), TransportState::Playing);
        assert_eq!(TransportState::from("PAUSED_PLAYBACK"), TransportState::Paused);
        assert_eq!(TransportState::from("NO_MEDIA_PRESENT"), TransportState::Stopped);
    }

    #[test]
    fn unrecognized_state_is_unknown() {
        assert_eq!(TransportState::from("BOGUS"), TransportState::Unknown);
        assert_eq!(TransportState::from(""), TransportState::Unknown);
        assert!(!TransportState::Unknown.is_idle());
        assert_eq!(
            serde_json::to_string(&TransportState::Unknown).unwrap(),
            "\"UNKNOWN\""
        );
    }

    #[test]
    fn idle_states() {
        assert!(TransportState::Stopped.is_idle());
        assert!(TransportState::Paused.is_idle());
        assert!(!TransportState::Playing.is_idle());
        assert!(!TransportState::Transitioning.is_idle());
    }

    #[test]
    fn serializes_to_wire_names() {
        assert_eq!(
            serde_json::to_string(&TransportState::Paused).unwrap(),
            "\"PAUSED_PLAYBACK\""
        );
        assert_eq!(
            serde_json::to_string(&TransportState::Playing).unwrap(),
            "\"PLAYING\""
        );
    }

    #[test]
    fn play_modes_follow_wire_table() {
        for wire in [
            "NORMAL",
            "SHUFFLE_NOREPEAT",
            "REPEAT_ALL",
            "SHUFFLE",
            "REPEAT_ONE",
            "SHUFFLE_REPEAT_ONE",
        ] {
            assert_eq!(PlayMode::from_wire(wire).as_wire(), wire);
        }
        assert_eq!(
            PlayMode::from_wire("SHUFFLE"),
            PlayMode {
                shuffle: true,
                repeat: Repeat::All
            }
        );
        assert_eq!(PlayMode::from_wire("PARTY"), PlayMode::NORMAL);
    }

    #[test]
    fn group_membership_lookup() {
        let group = ZoneGroup {
            id: "RINCON_A:1".into(),
            coordinator_uuid: "RINCON_A".into(),
            coordinator_ip: "10.0.0.1".into(),
            members: vec![
                ZoneGroupMember {
                    uuid: "RINCON_A".into(),
                    ip: "10.0.0.1".into(),
                    zone_name: "Kitchen".into(),
                },
                ZoneGroupMember {
                    uuid: "RINCON_B".into(),
                    ip: "10.0.0.2".into(),
                    zone_name: "Den".into(),
                },
            ],
        };
        assert!(group.contains("RINCON_B"));
        assert!(!group.contains("RINCON_C"));
        assert_eq!(group.coordinator().map(|m| m.zone_name.as_str()), Some("Kitchen"));
    }
}
