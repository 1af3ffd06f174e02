//! SSDP-based Sonos speaker discovery.
//!
//! Sends M-SEARCH queries for ZonePlayer devices on every usable interface
//! and collects unicast replies until the probe window closes. Each
//! interface gets its own socket, used for both send and receive, since
//! devices reply to the sending port.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use local_ip_address::list_afinet_netifas;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use super::types::{is_virtual_interface, DiscoveredSpeaker, DiscoveryError, DiscoveryResult};

/// Standard SSDP multicast address and port.
const MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// SSDP search target for Sonos ZonePlayer devices.
const SONOS_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:ZonePlayer:1";

/// Builds the M-SEARCH message.
///
/// HOST always names the multicast group, even for broadcast sends.
fn build_msearch_message(mx: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        mx, SONOS_SEARCH_TARGET
    )
}

/// Returns the value of the first header named `name` (ASCII case-insensitive).
fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

/// Parses an SSDP response into a discovered speaker.
///
/// Returns `None` for anything that is not a Sonos ZonePlayer.
fn parse_ssdp_response(response: &str, src_ip: &str) -> Option<DiscoveredSpeaker> {
    let usn = header_value(response, "usn")?;
    let lower = usn.to_ascii_lowercase();
    let start = lower.find("uuid:")?;
    let raw_uuid = &usn[start + "uuid:".len()..];

    let speaker = DiscoveredSpeaker::new(src_ip, raw_uuid);
    // Sonos UUIDs are always uppercase RINCON_
    if !speaker.uuid.starts_with("RINCON_") {
        return None;
    }

    Some(match header_value(response, "location") {
        Some(location) => speaker.with_location(location),
        None => speaker,
    })
}

/// Configuration for SSDP discovery.
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// Number of M-SEARCH packets to send per interface.
    pub send_count: u32,
    /// Delay between M-SEARCH repeats.
    pub retry_delay: Duration,
    /// Total probe window.
    pub discovery_timeout: Duration,
    /// MX value (max response delay in seconds).
    pub mx_value: u64,
    /// Also send to each interface's directed broadcast address.
    pub broadcast: bool,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            send_count: 3,
            retry_delay: Duration::from_millis(800),
            discovery_timeout: Duration::from_secs(5),
            mx_value: 1,
            broadcast: true,
        }
    }
}

/// Network interface used for one probe socket.
#[derive(Debug, Clone)]
struct InterfaceInfo {
    name: String,
    ip: Ipv4Addr,
    /// Directed broadcast address, assuming a /24.
    broadcast: Ipv4Addr,
}

/// Lists non-virtual, non-loopback IPv4 interfaces.
///
/// Blocking: enumerates the host's interfaces through the OS.
fn list_interfaces() -> Vec<InterfaceInfo> {
    list_afinet_netifas()
        .unwrap_or_else(|e| {
            log::warn!("[SSDP] Failed to list network interfaces: {}", e);
            Vec::new()
        })
        .into_iter()
        .filter_map(|(name, addr)| match addr {
            IpAddr::V4(ip) if !ip.is_loopback() && !is_virtual_interface(&name) => {
                let [a, b, c, _] = ip.octets();
                Some(InterfaceInfo {
                    name,
                    ip,
                    broadcast: Ipv4Addr::new(a, b, c, 255),
                })
            }
            _ => None,
        })
        .collect()
}

/// Creates a non-blocking UDP socket bound to `iface_ip` on an ephemeral port.
fn create_socket(iface_ip: Ipv4Addr, enable_broadcast: bool) -> DiscoveryResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[SSDP] Failed to set SO_REUSEADDR on {}: {}", iface_ip, e);
    }
    // UPnP 1.0 recommends a TTL of 4 for SSDP multicast
    if let Err(e) = socket.set_multicast_ttl_v4(4) {
        log::warn!("[SSDP] Failed to set multicast TTL on {}: {}", iface_ip, e);
    }
    if enable_broadcast {
        if let Err(e) = socket.set_broadcast(true) {
            log::warn!("[SSDP] Failed to set SO_BROADCAST on {}: {}", iface_ip, e);
        }
    }

    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::SocketBind)?;
    socket
        .bind(&SocketAddr::new(IpAddr::V4(iface_ip), 0).into())
        .map_err(DiscoveryError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)
}

/// Probes the local network for Sonos speakers.
///
/// Returns every distinct speaker that answered within
/// `config.discovery_timeout`, sorted by UUID. An empty result is not an
/// error; failing to open any socket is.
pub async fn probe(config: &SsdpConfig) -> DiscoveryResult<Vec<DiscoveredSpeaker>> {
    let interfaces = tokio::task::spawn_blocking(list_interfaces)
        .await
        .map_err(|e| DiscoveryError::InterfaceScan(e.to_string()))?;

    if interfaces.is_empty() {
        return Err(DiscoveryError::NoInterfaces);
    }

    let mut sockets = Vec::with_capacity(interfaces.len());
    for iface in interfaces {
        match create_socket(iface.ip, config.broadcast) {
            Ok(socket) => sockets.push((iface, Arc::new(socket))),
            Err(e) => log::warn!(
                "[SSDP] Failed to create socket for {} ({}): {}",
                iface.name,
                iface.ip,
                e
            ),
        }
    }
    if sockets.is_empty() {
        return Err(DiscoveryError::NoInterfaces);
    }

    log::debug!(
        "[SSDP] Probing on {} interface(s) for {:?}",
        sockets.len(),
        config.discovery_timeout
    );

    let msg = build_msearch_message(config.mx_value);
    let deadline = Instant::now() + config.discovery_timeout;
    let discovered: Arc<Mutex<Vec<DiscoveredSpeaker>>> = Arc::new(Mutex::new(Vec::new()));

    let sends = sockets.iter().map(|(iface, socket)| {
        let socket = Arc::clone(socket);
        let msg = msg.as_bytes().to_vec();
        let mut targets = vec![MULTICAST_ADDR.to_string()];
        if config.broadcast {
            targets.push(format!("{}:1900", iface.broadcast));
        }
        let name = iface.name.clone();
        let (count, delay) = (config.send_count, config.retry_delay);

        async move {
            for attempt in 0..count {
                if attempt > 0 {
                    tokio::time::sleep(delay).await;
                }
                for target in &targets {
                    if let Err(e) = socket.send_to(&msg, target.as_str()).await {
                        log::warn!(
                            "[SSDP] M-SEARCH on {} to {} failed (attempt {}): {}",
                            name,
                            target,
                            attempt + 1,
                            e
                        );
                    }
                }
            }
        }
    });

    let receives = sockets.iter().map(|(iface, socket)| {
        let socket = Arc::clone(socket);
        let discovered = Arc::clone(&discovered);
        let name = iface.name.clone();

        async move {
            let mut buf = [0u8; 2048];
            loop {
                match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                    Ok(Ok((len, src))) => {
                        let response = String::from_utf8_lossy(&buf[..len]);
                        if let Some(speaker) =
                            parse_ssdp_response(&response, &src.ip().to_string())
                        {
                            log::trace!(
                                "[SSDP] Response from {} ({}) via {}",
                                speaker.ip,
                                speaker.uuid,
                                name
                            );
                            discovered.lock().push(speaker);
                        }
                    }
                    Ok(Err(e)) => {
                        log::warn!("[SSDP] recv error on {}: {}", name, e);
                    }
                    Err(_) => break,
                }
            }
        }
    });

    tokio::join!(
        futures::future::join_all(sends),
        futures::future::join_all(receives)
    );

    let mut discovered = std::mem::take(&mut *discovered.lock());
    let mut seen = HashSet::new();
    discovered.retain(|s| seen.insert(s.uuid.clone()));
    discovered.sort_by(|a, b| a.uuid.cmp(&b.uuid));

    log::debug!("[SSDP] Probe complete: {} speaker(s)", discovered.len());
    Ok(discovered)
}
