//! Application services layer.
//!
//! This module contains the business logic services that orchestrate
//! between the API layer and the speaker capabilities (sonos/).

pub mod announcement;
pub mod player;
pub mod registry;

pub use announcement::{AnnouncementOutcome, AnnouncementTiming, Announcer};
pub use player::{find_favorite, Equalizer, PlayerCommands, SeekTarget, VolumeChange};
pub use registry::{DeviceRegistry, RegistryConfig, Snapshot};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::retry::RetryPolicy;
use crate::sonos::error::DeviceResult;

/// Runs one device operation under `retry`.
///
/// The first connection failure seen on any attempt makes the registry
/// rediscover, even when a later attempt succeeds.
pub(crate) async fn device_call<T, F, Fut>(
    registry: &Arc<DeviceRegistry>,
    retry: &RetryPolicy,
    action: &str,
    mut operation: F,
) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DeviceResult<T>>,
{
    let reported = AtomicBool::new(false);
    let result = retry
        .run(action, || {
            let attempt = operation();
            let reported = &reported;
            async move {
                let result = attempt.await;
                if let Err(e) = &result {
                    if e.is_connection() && !reported.swap(true, Ordering::Relaxed) {
                        registry.observe_failure(e);
                    }
                }
                result
            }
        })
        .await;
    result.map_err(Into::into)
}
