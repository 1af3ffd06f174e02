//! Queue and favorites, read through ContentDirectory.
//!
//! Browse results arrive as escaped DIDL-Lite inside `<Result>`; each
//! `<item>` is parsed on its own with the XML helpers.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;

use crate::sonos::error::{DeviceError, DeviceResult};
use crate::sonos::services::SonosService;
use crate::sonos::soap::SoapCall;
use crate::sonos::types::{Favorite, QueueItem};
use crate::sonos::utils::{build_sonos_url, extract_xml_text};

/// Object id of the speaker's own queue.
const QUEUE_ID: &str = "Q:0";

/// Object id of the household's favorites.
const FAVORITES_ID: &str = "FV:2";

/// Largest page requested in one Browse.
const BROWSE_LIMIT: u32 = 1000;

fn browse_call(object_id: &str) -> SoapCall<'_> {
    SoapCall::new(SonosService::ContentDirectory, "Browse")
        .arg("ObjectID", object_id)
        .arg("BrowseFlag", "BrowseDirectChildren")
        .arg("Filter", "dc:title,res,dc:creator,upnp:artist,upnp:album,upnp:albumArtURI")
        .arg("StartingIndex", "0")
        .arg("RequestedCount", BROWSE_LIMIT.to_string())
        .arg("SortCriteria", "")
}

/// Browses `object_id` and returns the raw inner XML of each `<item>`.
async fn browse_items(client: &Client, ip: &str, object_id: &str) -> DeviceResult<Vec<String>> {
    let response = browse_call(object_id).send(client, ip).await?;
    let didl = extract_xml_text(&response, "Result")
        .ok_or_else(|| DeviceError::Parse("missing Browse Result".into()))?;
    Ok(split_items(&didl))
}

fn split_items(didl: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut reader = Reader::from_str(didl);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"item" => {
                if let Ok(inner) = reader.read_text(e.name()) {
                    items.push(inner.to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[Sonos] XML parse error in browse result: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    items
}

fn parse_queue(items: &[String], ip: &str) -> Vec<QueueItem> {
    items
        .iter()
        .zip(1u32..)
        .map(|(item, position)| QueueItem {
            position,
            title: extract_xml_text(item, "title").unwrap_or_default(),
            artist: extract_xml_text(item, "creator").unwrap_or_default(),
            album: extract_xml_text(item, "album").unwrap_or_default(),
            album_art: extract_xml_text(item, "albumArtURI")
                .filter(|art| !art.is_empty())
                .map(|art| {
                    if art.starts_with("http") {
                        art
                    } else {
                        build_sonos_url(ip, &art)
                    }
                }),
            uri: extract_xml_text(item, "res").unwrap_or_default(),
        })
        .collect()
}

fn parse_favorites(items: &[String]) -> Vec<Favorite> {
    items
        .iter()
        .map(|item| Favorite {
            title: extract_xml_text(item, "title").unwrap_or_default(),
            uri: extract_xml_text(item, "res").unwrap_or_default(),
            metadata: extract_xml_text(item, "resMD").unwrap_or_default(),
        })
        .filter(|fav| !fav.title.is_empty())
        .collect()
}

/// Reads the speaker's queue, first entry at position 1.
pub async fn get_queue(client: &Client, ip: &str) -> DeviceResult<Vec<QueueItem>> {
    let items = browse_items(client, ip, QUEUE_ID).await?;
    Ok(parse_queue(&items, ip))
}

/// Removes every entry from the speaker's queue.
pub async fn clear_queue(client: &Client, ip: &str) -> DeviceResult<()> {
    SoapCall::new(SonosService::AVTransport, "RemoveAllTracksFromQueue")
        .instance_id()
        .send(client, ip)
        .await?;
    Ok(())
}

/// Reads the household favorites as seen by the speaker at `ip`.
pub async fn get_favorites(client: &Client, ip: &str) -> DeviceResult<Vec<Favorite>> {
    let items = browse_items(client, ip, FAVORITES_ID).await?;
    Ok(parse_favorites(&items))
}
