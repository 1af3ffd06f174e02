//! DIDL-Lite metadata formatting for Sonos display.
//!
//! Sonos shows the `dc:title` of whatever was loaded with SetAVTransportURI.
//! Without metadata an ad-hoc URI shows as its file name.

use crate::sonos::utils::escape_xml;

/// Formats DIDL-Lite metadata for a single audio item.
pub(crate) fn format_didl_lite(uri: &str, title: &str) -> String {
    let mime_type = mime_type_for(uri);

    let mut didl = String::from(
        r#"<DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/" xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/">"#,
    );
    didl.push_str(r#"<item id="R:0/0/0" parentID="R:0/0" restricted="true">"#);
    didl.push_str(&format!("<dc:title>{}</dc:title>", escape_xml(title)));
    didl.push_str("<upnp:class>object.item.audioItem.musicTrack</upnp:class>");
    didl.push_str(&format!(
        r#"<res protocolInfo="http-get:*:{}:*">{}</res>"#,
        mime_type,
        escape_xml(uri)
    ));
    didl.push_str("</item></DIDL-Lite>");

    didl
}

/// Guesses the MIME type from the URI's file extension.
fn mime_type_for(uri: &str) -> &'static str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    match path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "mp3" => "audio/mpeg",
        Some(ext) if ext == "wav" => "audio/wav",
        Some(ext) if ext == "flac" => "audio/flac",
        Some(ext) if ext == "aac" || ext == "m4a" => "audio/aac",
        _ => "audio/mpeg",
    }
}
