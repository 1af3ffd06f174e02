//! Event system for real-time client notifications.
//!
//! - [`EventBroadcaster`] fans messages out to every live subscriber over
//!   its own bounded queue
//! - [`Subscription`] is one subscriber's end, deregistered on drop
//! - [`EventMessage`] is the envelope every subscriber receives

mod broadcaster;

pub use broadcaster::{Delivery, EventBroadcaster, Subscription};

use serde::Serialize;

use crate::utils::now_millis;

/// Event names broadcast by the core.
pub mod kind {
    /// The set of known rooms changed after a discovery pass.
    pub const SPEAKERS_CHANGED: &str = "speakers_changed";
    /// An announcement finished playing and the room was restored.
    pub const ANNOUNCEMENT: &str = "announcement";
    /// Playback state of a room changed through a command.
    pub const TRANSPORT: &str = "transport";
    /// Volume or mute of a room changed through a command.
    pub const VOLUME: &str = "volume";
    /// Group membership changed through a command.
    pub const GROUP: &str = "group";
    /// Play mode, sleep timer or tone of a room changed through a command.
    pub const SETTINGS: &str = "settings";
    /// The queue of a room changed through a command.
    pub const QUEUE: &str = "queue";
}

/// Envelope delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMessage {
    /// Event name, one of [`kind`] for core events.
    pub event: String,
    /// Event payload.
    pub data: serde_json::Value,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

impl EventMessage {
    /// Creates a message stamped with the current time.
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp: now_millis(),
        }
    }
}
