//! Text-to-speech rendering and the on-disk announcement cache.
//!
//! - [`SpeechRenderer`] turns text into MP3 bytes
//! - [`HttpSpeechRenderer`] renders through the public translate endpoint
//! - [`SpeechCache`] stores rendered audio under a content-addressed name so
//!   speakers can fetch it from the static mount

mod cache;
mod renderer;

pub use cache::{cache_file_name, SpeechCache};
pub use renderer::{split_text, HttpSpeechRenderer, DEFAULT_SPEECH_ENDPOINT};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while rendering or caching speech.
#[derive(Debug, Error)]
pub enum SpeechError {
    /// The rendering request failed at the HTTP level.
    #[error("speech request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The rendering endpoint answered with a non-success status.
    #[error("speech endpoint returned HTTP {0}")]
    HttpStatus(u16),

    /// There is nothing to say.
    #[error("announcement text is empty")]
    EmptyText,

    /// Reading or writing the cache directory failed.
    #[error("speech cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for speech operations.
pub type SpeechResult<T> = Result<T, SpeechError>;

/// Renders text into MP3 audio.
#[async_trait]
pub trait SpeechRenderer: Send + Sync {
    /// Renders `text` spoken in `language` (e.g. `"en"`).
    async fn render(&self, text: &str, language: &str) -> SpeechResult<Bytes>;
}
