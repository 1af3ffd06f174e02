//! Zone group topology and device identity.
//!
//! Parses ZoneGroupState XML into [`ZoneGroup`]s and reads a speaker's
//! configured room name from DeviceProperties.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;

use crate::sonos::error::{DeviceError, DeviceResult};
use crate::sonos::services::SonosService;
use crate::sonos::soap::SoapCall;
use crate::sonos::types::{ZoneGroup, ZoneGroupMember};
use crate::sonos::utils::{extract_ip_from_location, extract_xml_text, get_xml_attr};

/// Parses ZoneGroupState XML into zone groups.
///
/// Only visible room members are kept: Zone Bridges, invisible members
/// (bonded stereo/surround partners) and home theater satellites are
/// dropped. Groups left without a coordinator address are skipped.
pub fn parse_zone_group_xml(xml: &str) -> Vec<ZoneGroup> {
    let mut groups = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut current: Option<ZoneGroup> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"ZoneGroup" => {
                    current = Some(ZoneGroup {
                        id: get_xml_attr(e, b"ID").unwrap_or_default(),
                        coordinator_uuid: get_xml_attr(e, b"Coordinator").unwrap_or_default(),
                        ..ZoneGroup::default()
                    });
                }
                b"ZoneGroupMember" => {
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    let hidden = get_xml_attr(e, b"IsZoneBridge").as_deref() == Some("1")
                        || get_xml_attr(e, b"Invisible").as_deref() == Some("1");
                    if hidden {
                        continue;
                    }
                    let (Some(uuid), Some(ip), Some(zone_name)) = (
                        get_xml_attr(e, b"UUID"),
                        get_xml_attr(e, b"Location").and_then(|l| extract_ip_from_location(&l)),
                        get_xml_attr(e, b"ZoneName"),
                    ) else {
                        continue;
                    };
                    if uuid == group.coordinator_uuid {
                        group.coordinator_ip = ip.clone();
                    }
                    group.members.push(ZoneGroupMember {
                        uuid,
                        ip,
                        zone_name,
                    });
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"ZoneGroup" => {
                if let Some(group) = current.take() {
                    if !group.coordinator_ip.is_empty() && !group.members.is_empty() {
                        groups.push(group);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[Sonos] XML parse error in zone groups: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    groups
}

/// Fetches the household's zone groups as seen by the speaker at `ip`.
pub async fn get_zone_groups(client: &Client, ip: &str) -> DeviceResult<Vec<ZoneGroup>> {
    let response = SoapCall::new(SonosService::ZoneGroupTopology, "GetZoneGroupState")
        .send(client, ip)
        .await?;

    let Some(decoded_xml) = extract_xml_text(&response, "ZoneGroupState") else {
        return Ok(vec![]);
    };

    Ok(parse_zone_group_xml(&decoded_xml))
}

/// Reads the speaker's user-configured room name.
pub async fn get_player_name(client: &Client, ip: &str) -> DeviceResult<String> {
    let response = SoapCall::new(SonosService::DeviceProperties, "GetZoneAttributes")
        .send(client, ip)
        .await?;

    extract_xml_text(&response, "CurrentZoneName")
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| DeviceError::Parse("missing CurrentZoneName".into()))
}
