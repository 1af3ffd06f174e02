//! Sonos UPnP service definitions.
//!
//! Single source of truth for the service URNs and control paths used by
//! SOAP commands.

use serde::Serialize;

/// Sonos UPnP services used for control.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SonosService {
    /// Audio/Video transport control (play, pause, seek, grouping).
    AVTransport,
    /// Queue and favorites browsing.
    ContentDirectory,
    /// Device identity (zone name, icon).
    DeviceProperties,
    /// Group volume control (for coordinator speakers).
    GroupRenderingControl,
    /// Individual speaker volume and mute control.
    RenderingControl,
    /// Zone group topology and membership information.
    ZoneGroupTopology,
}

impl SonosService {
    /// Returns the UPnP service URN for SOAP requests.
    #[must_use]
    pub fn urn(&self) -> &'static str {
        match self {
            Self::AVTransport => "urn:schemas-upnp-org:service:AVTransport:1",
            Self::ContentDirectory => "urn:schemas-upnp-org:service:ContentDirectory:1",
            Self::DeviceProperties => "urn:schemas-upnp-org:service:DeviceProperties:1",
            Self::GroupRenderingControl => "urn:schemas-upnp-org:service:GroupRenderingControl:1",
            Self::RenderingControl => "urn:schemas-upnp-org:service:RenderingControl:1",
            Self::ZoneGroupTopology => "urn:schemas-upnp-org:service:ZoneGroupTopology:1",
        }
    }

    /// Returns the UPnP control endpoint path for SOAP requests.
    #[must_use]
    pub fn control_path(&self) -> &'static str {
        match self {
            Self::AVTransport => "/MediaRenderer/AVTransport/Control",
            Self::ContentDirectory => "/MediaServer/ContentDirectory/Control",
            Self::DeviceProperties => "/DeviceProperties/Control",
            Self::GroupRenderingControl => "/MediaRenderer/GroupRenderingControl/Control",
            Self::RenderingControl => "/MediaRenderer/RenderingControl/Control",
            Self::ZoneGroupTopology => "/ZoneGroupTopology/Control",
        }
    }

    /// Returns a human-readable name for this service.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AVTransport => "AVTransport",
            Self::ContentDirectory => "ContentDirectory",
            Self::DeviceProperties => "DeviceProperties",
            Self::GroupRenderingControl => "GroupRenderingControl",
            Self::RenderingControl => "RenderingControl",
            Self::ZoneGroupTopology => "ZoneGroupTopology",
        }
    }
}
