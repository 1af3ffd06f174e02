//! Group coordination commands for Sonos speakers.

use reqwest::Client;

use crate::sonos::error::DeviceResult;
use crate::sonos::services::SonosService;
use crate::sonos::soap::SoapCall;

/// Joins a speaker to the group coordinated by `coordinator_uuid`.
///
/// Points the speaker's transport at the coordinator with the x-rincon
/// scheme; the speaker then follows the coordinator's playback.
///
/// # Arguments
/// * `ip` - IP address of the speaker to join
/// * `coordinator_uuid` - UUID of the coordinator speaker (RINCON_xxx format)
pub async fn join_group(client: &Client, ip: &str, coordinator_uuid: &str) -> DeviceResult<()> {
    let group_uri = format!("x-rincon:{}", coordinator_uuid);

    log::info!("[Sonos] Joining {} to {}", ip, coordinator_uuid);

    SoapCall::new(SonosService::AVTransport, "SetAVTransportURI")
        .instance_id()
        .arg("CurrentURI", group_uri)
        .arg("CurrentURIMetaData", "")
        .send(client, ip)
        .await?;

    Ok(())
}

/// Makes a speaker leave its current group and become standalone.
///
/// Idempotent: a standalone speaker stays standalone.
pub async fn leave_group(client: &Client, ip: &str) -> DeviceResult<()> {
    log::info!("[Sonos] {} leaving its group", ip);

    SoapCall::new(SonosService::AVTransport, "BecomeCoordinatorOfStandaloneGroup")
        .instance_id()
        .send(client, ip)
        .await?;

    Ok(())
}
