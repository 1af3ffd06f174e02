//! Bounded retry of device operations on transient failures.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::sonos::error::{DeviceErrorKind, DeviceResult};

/// Retry settings for a single device operation.
///
/// Only wrap operations that are safe to repeat: a retried skip-track may
/// skip twice.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed pause before each retry.
    pub delay: Duration,
    /// Failure kinds that are retried; anything else propagates immediately.
    pub retry_on: HashSet<DeviceErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_secs(1),
            retry_on: HashSet::from([
                DeviceErrorKind::Protocol,
                DeviceErrorKind::Connection,
                DeviceErrorKind::Timeout,
                DeviceErrorKind::Io,
            ]),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy retrying the default transient kinds.
    #[must_use]
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            ..Self::default()
        }
    }

    /// Runs `operation`, retrying it while it fails with a retryable kind.
    ///
    /// Makes at most `max_retries + 1` attempts. The last failure is returned
    /// unchanged once retries are exhausted.
    ///
    /// # Arguments
    /// * `action` - Action name for logging
    /// * `operation` - Closure producing a fresh attempt each call
    pub async fn run<T, F, Fut>(&self, action: &str, mut operation: F) -> DeviceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DeviceResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && self.retry_on.contains(&e.kind()) => {
                    attempt += 1;
                    log::warn!(
                        "[Retry] {} failed ({}), retry {}/{} in {:?}",
                        action,
                        e,
                        attempt,
                        self.max_retries,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
