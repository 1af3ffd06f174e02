//! Transport commands: play, pause, skip, seek, load a URI, play mode and
//! sleep timer, and read state.
//!
//! Every function issues exactly one or two SOAP calls and never retries;
//! retry decisions belong to the caller.

use reqwest::Client;

use crate::sonos::didl::format_didl_lite;
use crate::sonos::error::{DeviceError, DeviceResult};
use crate::sonos::services::SonosService;
use crate::sonos::soap::SoapCall;
use crate::sonos::types::{PlayMode, TrackInfo, TransportState};
use crate::sonos::utils::{build_sonos_url, extract_xml_text, format_hms, parse_hms};

/// Reads the current transport state of a speaker.
pub async fn get_transport_state(client: &Client, ip: &str) -> DeviceResult<TransportState> {
    let response = SoapCall::new(SonosService::AVTransport, "GetTransportInfo")
        .instance_id()
        .send(client, ip)
        .await?;

    let raw = extract_xml_text(&response, "CurrentTransportState")
        .ok_or_else(|| DeviceError::Parse("missing CurrentTransportState".into()))?;
    Ok(TransportState::from(raw.as_str()))
}

/// Sends a Play command to resume whatever is loaded.
///
/// # Arguments
/// * `ip` - IP address of the speaker (coordinator for grouped speakers)
pub async fn play(client: &Client, ip: &str) -> DeviceResult<()> {
    log::debug!("[Sonos] Play -> {}", ip);
    SoapCall::new(SonosService::AVTransport, "Play")
        .instance_id()
        .arg("Speed", "1")
        .send(client, ip)
        .await?;
    Ok(())
}

/// Pauses playback.
pub async fn pause(client: &Client, ip: &str) -> DeviceResult<()> {
    log::debug!("[Sonos] Pause -> {}", ip);
    SoapCall::new(SonosService::AVTransport, "Pause")
        .instance_id()
        .send(client, ip)
        .await?;
    Ok(())
}

/// Skips to the next track.
pub async fn next(client: &Client, ip: &str) -> DeviceResult<()> {
    SoapCall::new(SonosService::AVTransport, "Next")
        .instance_id()
        .send(client, ip)
        .await?;
    Ok(())
}

/// Skips to the previous track.
pub async fn previous(client: &Client, ip: &str) -> DeviceResult<()> {
    SoapCall::new(SonosService::AVTransport, "Previous")
        .instance_id()
        .send(client, ip)
        .await?;
    Ok(())
}

/// Loads `uri` on the speaker with a display title, then starts playback.
pub async fn play_uri(client: &Client, ip: &str, uri: &str, title: &str) -> DeviceResult<()> {
    log::info!("[Sonos] Loading {} on {} ({:?})", uri, ip, title);
    load_and_play(client, ip, uri, format_didl_lite(uri, title)).await
}

/// Loads `uri` with ready-made DIDL-Lite `metadata`, then starts playback.
pub async fn play_uri_with_metadata(
    client: &Client,
    ip: &str,
    uri: &str,
    metadata: &str,
) -> DeviceResult<()> {
    log::info!("[Sonos] Loading {} on {}", uri, ip);
    load_and_play(client, ip, uri, metadata.to_string()).await
}

async fn load_and_play(client: &Client, ip: &str, uri: &str, metadata: String) -> DeviceResult<()> {
    SoapCall::new(SonosService::AVTransport, "SetAVTransportURI")
        .instance_id()
        .arg("CurrentURI", uri)
        .arg("CurrentURIMetaData", metadata)
        .send(client, ip)
        .await?;

    play(client, ip).await
}

fn seek_call(unit: &'static str, target: String) -> SoapCall<'static> {
    SoapCall::new(SonosService::AVTransport, "Seek")
        .instance_id()
        .arg("Unit", unit)
        .arg("Target", target)
}

/// Seeks within the current track to `seconds` from its start.
pub async fn seek(client: &Client, ip: &str, seconds: u64) -> DeviceResult<()> {
    seek_call("REL_TIME", format_hms(seconds))
        .send(client, ip)
        .await?;
    Ok(())
}

/// Switches the speaker to its own queue and plays entry `track` (1-based).
pub async fn play_from_queue(client: &Client, ip: &str, uuid: &str, track: u32) -> DeviceResult<()> {
    SoapCall::new(SonosService::AVTransport, "SetAVTransportURI")
        .instance_id()
        .arg("CurrentURI", format!("x-rincon-queue:{}#0", uuid))
        .arg("CurrentURIMetaData", "")
        .send(client, ip)
        .await?;

    seek_call("TRACK_NR", track.to_string())
        .send(client, ip)
        .await?;

    play(client, ip).await
}

/// Reads the current shuffle/repeat combination.
pub async fn get_play_mode(client: &Client, ip: &str) -> DeviceResult<PlayMode> {
    let response = SoapCall::new(SonosService::AVTransport, "GetTransportSettings")
        .instance_id()
        .send(client, ip)
        .await?;

    extract_xml_text(&response, "PlayMode")
        .map(|mode| PlayMode::from_wire(&mode))
        .ok_or_else(|| DeviceError::Parse("missing PlayMode".into()))
}

/// Sets the shuffle/repeat combination.
pub async fn set_play_mode(client: &Client, ip: &str, mode: PlayMode) -> DeviceResult<()> {
    SoapCall::new(SonosService::AVTransport, "SetPlayMode")
        .instance_id()
        .arg("NewPlayMode", mode.as_wire())
        .send(client, ip)
        .await?;
    Ok(())
}

fn sleep_timer_call(duration: Option<u64>) -> SoapCall<'static> {
    // An empty duration cancels a running timer
    SoapCall::new(SonosService::AVTransport, "ConfigureSleepTimer")
        .instance_id()
        .arg("NewSleepTimerDuration", duration.map(format_hms).unwrap_or_default())
}

/// Starts a sleep timer of `seconds`, or cancels it with `None`.
pub async fn set_sleep_timer(client: &Client, ip: &str, seconds: Option<u64>) -> DeviceResult<()> {
    sleep_timer_call(seconds).send(client, ip).await?;
    Ok(())
}

/// Reads the loaded track and playback position.
pub async fn get_track_info(client: &Client, ip: &str) -> DeviceResult<TrackInfo> {
    let response = SoapCall::new(SonosService::AVTransport, "GetPositionInfo")
        .instance_id()
        .send(client, ip)
        .await?;

    Ok(parse_position_info(&response, ip))
}

/// Parses a GetPositionInfo response, including the embedded DIDL-Lite.
fn parse_position_info(response: &str, ip: &str) -> TrackInfo {
    let mut track = TrackInfo {
        uri: extract_xml_text(response, "TrackURI").unwrap_or_default(),
        duration: extract_xml_text(response, "TrackDuration").and_then(|d| parse_hms(&d)),
        position: extract_xml_text(response, "RelTime").and_then(|t| parse_hms(&t)),
        ..TrackInfo::default()
    };

    // TrackMetaData is "NOT_IMPLEMENTED" or empty for some sources
    let Some(didl) = extract_xml_text(response, "TrackMetaData").filter(|m| m.starts_with('<'))
    else {
        return track;
    };

    track.title = extract_xml_text(&didl, "title").unwrap_or_default();
    track.artist = extract_xml_text(&didl, "creator").unwrap_or_default();
    track.album = extract_xml_text(&didl, "album").unwrap_or_default();
    track.album_art = extract_xml_text(&didl, "albumArtURI")
        .filter(|art| !art.is_empty())
        .map(|art| {
            if art.starts_with("http") {
                art
            } else {
                build_sonos_url(ip, &art)
            }
        });

    track
}
