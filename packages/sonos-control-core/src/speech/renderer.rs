//! HTTP speech renderer.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Url};

use super::{SpeechError, SpeechRenderer, SpeechResult};
use crate::protocol_constants::{SPEECH_MAX_CHARS, SPEECH_TIMEOUT_SECS};

/// Public translate endpoint that answers with MP3 audio.
pub const DEFAULT_SPEECH_ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Chunks break on whitespace; a single word longer than `max_chars` is cut
/// at the character limit.
#[must_use]
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }

        let sep = usize::from(!current.is_empty());
        if current_len + sep + word.len() > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        } else if sep == 1 {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// [`SpeechRenderer`] backed by the translate TTS endpoint.
///
/// Each chunk is requested separately and the MP3 frames are concatenated,
/// which players accept as one stream.
#[derive(Clone)]
pub struct HttpSpeechRenderer {
    client: Client,
    endpoint: String,
}

impl std::fmt::Debug for HttpSpeechRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSpeechRenderer")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpSpeechRenderer {
    /// Creates a renderer using the default endpoint.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_endpoint(client, DEFAULT_SPEECH_ENDPOINT)
    }

    /// Creates a renderer using a custom endpoint.
    #[must_use]
    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn chunk_url(&self, chunk: &str, language: &str, idx: usize, total: usize) -> SpeechResult<Url> {
        let idx = idx.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();
        Url::parse_with_params(
            &self.endpoint,
            [
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("q", chunk),
                ("tl", language),
                ("idx", idx.as_str()),
                ("total", total.as_str()),
                ("textlen", textlen.as_str()),
            ],
        )
        .map_err(|e| SpeechError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))
    }
}

#[async_trait]
impl SpeechRenderer for HttpSpeechRenderer {
    async fn render(&self, text: &str, language: &str) -> SpeechResult<Bytes> {
        let chunks = split_text(text, SPEECH_MAX_CHARS);
        if chunks.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let mut audio = BytesMut::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let url = self.chunk_url(chunk, language, idx, chunks.len())?;
            log::debug!("[Speech] Rendering chunk {}/{} ({} chars)", idx + 1, chunks.len(), chunk.len());

            let res = self
                .client
                .get(url)
                .timeout(Duration::from_secs(SPEECH_TIMEOUT_SECS))
                .send()
                .await?;

            let status = res.status();
            if !status.is_success() {
                return Err(SpeechError::HttpStatus(status.as_u16()));
            }
            audio.extend_from_slice(&res.bytes().await?);
        }

        Ok(audio.freeze())
    }
}
