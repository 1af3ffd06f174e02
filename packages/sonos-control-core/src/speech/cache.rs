//! Content-addressed cache of rendered announcements.
//!
//! A (language, text) pair maps to `<sha256 hex of "language:text">.mp3`
//! inside the cache directory. Once the file exists it is served as is; the
//! renderer is never asked for the same pair twice.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::{SpeechError, SpeechRenderer, SpeechResult};

/// Returns the cache file name for `text` spoken in `language`.
#[must_use]
pub fn cache_file_name(text: &str, language: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", language, text).as_bytes());
    format!("{:x}.mp3", digest)
}

/// Cache directory plus the renderer that fills it.
pub struct SpeechCache {
    dir: PathBuf,
    renderer: Arc<dyn SpeechRenderer>,
    /// Serializes concurrent requests for a file not yet on disk.
    pending: DashMap<String, Arc<Mutex<()>>>,
}

impl SpeechCache {
    /// Creates a cache rooted at `dir`. The directory is created on first use.
    pub fn new(dir: impl Into<PathBuf>, renderer: Arc<dyn SpeechRenderer>) -> Self {
        Self {
            dir: dir.into(),
            renderer,
            pending: DashMap::new(),
        }
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file name holding `text` in `language`, rendering it first
    /// if it is not cached yet.
    pub async fn render_or_fetch(&self, text: &str, language: &str) -> SpeechResult<String> {
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let file_name = cache_file_name(text, language);
        let path = self.dir.join(&file_name);

        let lock = self
            .pending
            .entry(file_name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if tokio::fs::try_exists(&path).await? {
            log::debug!("[Speech] Cache hit: {}", file_name);
            self.settle(&file_name, &lock);
            return Ok(file_name);
        }

        let audio = self.renderer.render(text, language).await?;

        tokio::fs::create_dir_all(&self.dir).await?;
        // Write beside the target and rename so the static mount never serves a partial file
        let partial = self.dir.join(format!("{}.part", file_name));
        tokio::fs::write(&partial, &audio).await?;
        tokio::fs::rename(&partial, &path).await?;
        self.settle(&file_name, &lock);

        log::info!(
            "[Speech] Rendered {:?} ({}) -> {} ({} bytes)",
            preview(text),
            language,
            file_name,
            audio.len()
        );
        Ok(file_name)
    }

    /// Drops the lock entry once the file is on disk. Later requests see the
    /// file before they would ever need the lock.
    fn settle(&self, file_name: &str, lock: &Arc<Mutex<()>>) {
        self.pending
            .remove_if(file_name, |_, current| Arc::ptr_eq(current, lock));
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}
