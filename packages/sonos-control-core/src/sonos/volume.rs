//! Volume, mute and tone control for Sonos speakers.
//!
//! Per-speaker volume, mute, bass and treble go through RenderingControl;
//! group volume goes through GroupRenderingControl on the coordinator.

use reqwest::Client;

use crate::sonos::error::{DeviceError, DeviceResult};
use crate::sonos::services::SonosService;
use crate::sonos::soap::SoapCall;
use crate::sonos::utils::extract_xml_text;

fn parse_volume(response: &str) -> DeviceResult<u8> {
    extract_xml_text(response, "CurrentVolume")
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| DeviceError::Parse("invalid CurrentVolume".into()))
}

fn mute_flag(mute: bool) -> &'static str {
    if mute {
        "1"
    } else {
        "0"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-Speaker Volume Control
// ─────────────────────────────────────────────────────────────────────────────

fn set_speaker_volume_call(volume: u8) -> SoapCall<'static> {
    SoapCall::new(SonosService::RenderingControl, "SetVolume")
        .instance_id()
        .arg("Channel", "Master")
        .arg("DesiredVolume", volume.min(100).to_string())
}

fn set_speaker_mute_call(mute: bool) -> SoapCall<'static> {
    SoapCall::new(SonosService::RenderingControl, "SetMute")
        .instance_id()
        .arg("Channel", "Master")
        .arg("DesiredMute", mute_flag(mute))
}

/// Gets volume from an individual speaker (0-100).
pub async fn get_speaker_volume(client: &Client, speaker_ip: &str) -> DeviceResult<u8> {
    let response = SoapCall::new(SonosService::RenderingControl, "GetVolume")
        .instance_id()
        .arg("Channel", "Master")
        .send(client, speaker_ip)
        .await?;

    parse_volume(&response)
}

/// Sets volume on an individual speaker (values > 100 are clamped).
pub async fn set_speaker_volume(client: &Client, speaker_ip: &str, volume: u8) -> DeviceResult<()> {
    set_speaker_volume_call(volume)
        .send(client, speaker_ip)
        .await?;
    Ok(())
}

/// Gets mute state from an individual speaker.
pub async fn get_speaker_mute(client: &Client, speaker_ip: &str) -> DeviceResult<bool> {
    let response = SoapCall::new(SonosService::RenderingControl, "GetMute")
        .instance_id()
        .arg("Channel", "Master")
        .send(client, speaker_ip)
        .await?;

    extract_xml_text(&response, "CurrentMute")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .ok_or_else(|| DeviceError::Parse("missing CurrentMute".into()))
}

/// Sets mute state on an individual speaker.
pub async fn set_speaker_mute(client: &Client, speaker_ip: &str, mute: bool) -> DeviceResult<()> {
    set_speaker_mute_call(mute).send(client, speaker_ip).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tone
// ─────────────────────────────────────────────────────────────────────────────

/// Lowest and highest bass/treble level a speaker accepts.
pub const TONE_RANGE: (i8, i8) = (-10, 10);

fn tone_call(action: &'static str, arg: &'static str, level: i8) -> SoapCall<'static> {
    SoapCall::new(SonosService::RenderingControl, action)
        .instance_id()
        .arg(arg, level.clamp(TONE_RANGE.0, TONE_RANGE.1).to_string())
}

/// Sets the bass level (clamped to -10..=10).
pub async fn set_bass(client: &Client, speaker_ip: &str, level: i8) -> DeviceResult<()> {
    tone_call("SetBass", "DesiredBass", level)
        .send(client, speaker_ip)
        .await?;
    Ok(())
}

/// Sets the treble level (clamped to -10..=10).
pub async fn set_treble(client: &Client, speaker_ip: &str, level: i8) -> DeviceResult<()> {
    tone_call("SetTreble", "DesiredTreble", level)
        .send(client, speaker_ip)
        .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Group Volume Control
// ─────────────────────────────────────────────────────────────────────────────

/// Gets the current group volume from the coordinator (0-100).
pub async fn get_group_volume(client: &Client, coordinator_ip: &str) -> DeviceResult<u8> {
    let response = SoapCall::new(SonosService::GroupRenderingControl, "GetGroupVolume")
        .instance_id()
        .send(client, coordinator_ip)
        .await?;

    parse_volume(&response)
}

/// Sets the group volume on the coordinator.
///
/// The coordinator scales each member proportionally.
pub async fn set_group_volume(
    client: &Client,
    coordinator_ip: &str,
    volume: u8,
) -> DeviceResult<()> {
    // Group volume is only accepted after a snapshot of member volumes
    SoapCall::new(SonosService::GroupRenderingControl, "SnapshotGroupVolume")
        .instance_id()
        .send(client, coordinator_ip)
        .await?;

    SoapCall::new(SonosService::GroupRenderingControl, "SetGroupVolume")
        .instance_id()
        .arg("DesiredVolume", volume.min(100).to_string())
        .send(client, coordinator_ip)
        .await?;

    Ok(())
}
