//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external protocols (UPnP, SSDP, the speech
//! endpoint) or by the observable behaviour of the announcement sequence.

// ─────────────────────────────────────────────────────────────────────────────
// HTTP/SOAP
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for SOAP HTTP requests (seconds).
///
/// 10 seconds is reasonable for LAN operations.
pub const SOAP_TIMEOUT_SECS: u64 = 10;

/// Timeout for a single speech rendering request (seconds).
pub const SPEECH_TIMEOUT_SECS: u64 = 15;

/// Maximum characters per speech rendering request.
///
/// Longer texts are split on word boundaries and the MP3 parts concatenated.
pub const SPEECH_MAX_CHARS: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Announcements
// ─────────────────────────────────────────────────────────────────────────────

/// Track title shown on the speaker while an announcement plays.
pub const ANNOUNCEMENT_TITLE: &str = "Announcement";

/// Delay after starting the announcement before polling begins (ms).
pub const ANNOUNCEMENT_START_DELAY_MS: u64 = 1000;

/// Interval between transport state polls while waiting (ms).
pub const ANNOUNCEMENT_POLL_INTERVAL_MS: u64 = 1000;

/// Maximum number of polls before the wait gives up.
pub const ANNOUNCEMENT_MAX_POLLS: u32 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Default capacity of each subscriber queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;

/// Default wait before a subscriber receives a keepalive (seconds).
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// URL prefix under which the speech cache directory is served.
pub const STATIC_MOUNT: &str = "/static";

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "sonos-control";
