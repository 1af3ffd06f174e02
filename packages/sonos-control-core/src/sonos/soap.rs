//! Low-level SOAP protocol implementation for UPnP/Sonos communication.
//!
//! Builds the SOAP envelope, sends it, and turns faults and bad statuses
//! into [`DeviceError`]s. For high-level commands, see `client.rs`.

use std::time::Duration;

use reqwest::Client;

use super::error::{DeviceError, DeviceResult};
use super::services::SonosService;
use super::utils::{build_sonos_url, escape_xml, extract_xml_text};
use crate::protocol_constants::SOAP_TIMEOUT_SECS;

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Request/Response
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the SOAP envelope for `action` on `service_urn`.
///
/// The envelope is a single line: Sonos rejects whitespace before the root
/// element.
fn build_envelope(service_urn: &str, action: &str, args: &[(&str, &str)]) -> String {
    let mut body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{} xmlns:u="{}">"#,
        action, service_urn
    );
    for (k, v) in args {
        body.push_str(&format!("<{k}>{}</{k}>", escape_xml(v)));
    }
    body.push_str(&format!(r#"</u:{}></s:Body></s:Envelope>"#, action));
    body
}

/// Sends a SOAP request to a Sonos speaker.
///
/// # Returns
/// The response body on success. Faults are reported as
/// [`DeviceError::Fault`] with the UPnP error code appended when present,
/// other non-success statuses as [`DeviceError::HttpStatus`].
async fn send_soap_request(
    client: &Client,
    ip: &str,
    service: SonosService,
    action: &str,
    args: &[(&str, &str)],
) -> DeviceResult<String> {
    let url = build_sonos_url(ip, service.control_path());
    let body = build_envelope(service.urn(), action, args);

    log::debug!("[SOAP] {} -> {} ({} bytes)", action, url, body.len());
    log::trace!("[SOAP] Request body: {}", body);

    let start = std::time::Instant::now();
    let res = client
        .post(&url)
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .header("SOAPAction", format!("\"{}#{}\"", service.urn(), action))
        .body(body)
        .timeout(Duration::from_secs(SOAP_TIMEOUT_SECS))
        .send()
        .await;

    log::debug!(
        "[SOAP] {} on {} completed in {:?}: {:?}",
        action,
        ip,
        start.elapsed(),
        res.as_ref().map(|r| r.status())
    );

    let res = res?;
    let status = res.status();
    let response_text = res.text().await?;

    // Faults usually arrive with a 500 status, so check them first
    if response_text.contains("Fault>") {
        return Err(DeviceError::Fault(describe_fault(&response_text)));
    }
    if !status.is_success() {
        return Err(DeviceError::HttpStatus(status.as_u16(), response_text));
    }

    Ok(response_text)
}

/// Summarizes a SOAP fault as "faultstring (errorCode)".
fn describe_fault(xml: &str) -> String {
    let fault = extract_xml_text(xml, "faultstring").unwrap_or_else(|| "Unknown SOAP fault".into());
    match extract_xml_text(xml, "errorCode") {
        Some(code) => format!("{} ({})", fault, code),
        None => fault,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Calls
// ─────────────────────────────────────────────────────────────────────────────

/// One SOAP action with its arguments, ready to send to any speaker.
///
/// ```ignore
/// let response = SoapCall::new(SonosService::AVTransport, "Play")
///     .instance_id()
///     .arg("Speed", "1")
///     .send(&client, "192.168.1.100")
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct SoapCall<'a> {
    service: SonosService,
    action: &'a str,
    args: Vec<(&'a str, String)>,
}

impl<'a> SoapCall<'a> {
    #[must_use]
    pub fn new(service: SonosService, action: &'a str) -> Self {
        Self {
            service,
            action,
            args: Vec::new(),
        }
    }

    /// Appends an argument; the body keeps insertion order.
    #[must_use]
    pub fn arg(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.args.push((key, value.into()));
        self
    }

    /// Appends `InstanceID=0`, which most actions expect first.
    #[must_use]
    pub fn instance_id(self) -> Self {
        self.arg("InstanceID", "0")
    }

    /// Sends the call to the speaker at `ip` and returns the response body.
    pub async fn send(&self, client: &Client, ip: &str) -> DeviceResult<String> {
        let args: Vec<(&str, &str)> = self.args.iter().map(|(k, v)| (*k, v.as_str())).collect();
        send_soap_request(client, ip, self.service, self.action, &args).await
    }

    #[cfg(test)]
    pub fn into_parts(self) -> (SonosService, &'a str, Vec<(&'a str, String)>) {
        (self.service, self.action, self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_keeps_args_in_order() {
        let (service, action, args) = SoapCall::new(SonosService::RenderingControl, "SetVolume")
            .instance_id()
            .arg("Channel", "Master")
            .arg("DesiredVolume", "75")
            .into_parts();

        assert_eq!(service, SonosService::RenderingControl);
        assert_eq!(action, "SetVolume");
        assert_eq!(
            args,
            vec![
                ("InstanceID", "0".to_string()),
                ("Channel", "Master".to_string()),
                ("DesiredVolume", "75".to_string()),
            ]
        );
    }

    #[test]
    fn call_without_args_is_empty() {
        let (_, action, args) = SoapCall::new(SonosService::AVTransport, "Pause").into_parts();
        assert_eq!(action, "Pause");
        assert!(args.is_empty());
    }

    #[test]
    fn envelope_is_single_line_and_escaped() {
        let body = build_envelope(
            SonosService::AVTransport.urn(),
            "SetAVTransportURI",
            &[("InstanceID", "0"), ("CurrentURI", "http://h/a.mp3?a=1&b=2")],
        );
        assert!(!body.contains('\n'));
        assert!(body.starts_with(r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope"#));
        assert!(body.contains(
            r#"<u:SetAVTransportURI xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">"#
        ));
        assert!(body.contains("<CurrentURI>http://h/a.mp3?a=1&amp;b=2</CurrentURI>"));
        assert!(body.ends_with("</u:SetAVTransportURI></s:Body></s:Envelope>"));
    }

    #[test]
    fn fault_description_includes_upnp_code() {
        let xml = r#"<s:Envelope><s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring><detail><UPnPError><errorCode>701</errorCode></UPnPError></detail></s:Fault></s:Body></s:Envelope>"#;
        assert_eq!(describe_fault(xml), "UPnPError (701)");
    }

    #[test]
    fn fault_without_code_uses_faultstring() {
        let xml = "<s:Fault><faultstring>Bad action</faultstring></s:Fault>";
        assert_eq!(describe_fault(xml), "Bad action");
    }
}
