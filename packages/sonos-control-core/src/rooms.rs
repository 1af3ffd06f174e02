//! Room name normalization.
//!
//! Speakers are addressed by their user-configured room name. Names typed
//! into URLs rarely match the display name exactly, so every lookup goes
//! through [`RoomKey`], which canonicalizes the name the same way at
//! discovery time and at request time.

use std::borrow::Borrow;
use std::fmt;

use serde::Serialize;

/// Canonicalizes a free-text room name into a lookup key.
///
/// Trims surrounding whitespace, lowercases, and collapses every run of
/// internal whitespace into a single underscore.
///
/// ```ignore
/// assert_eq!(normalize_room_name("  Living   Room "), "living_room");
/// ```
#[must_use]
pub fn normalize_room_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Normalized room name, the only valid key into the speaker registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    /// Creates a key from a raw room or display name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(normalize_room_name(name.as_ref()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RoomKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomKey {
    fn from(s: &str) -> Self {
        RoomKey::new(s)
    }
}

impl From<String> for RoomKey {
    fn from(s: String) -> Self {
        RoomKey::new(s)
    }
}
