//! Public and outbound address detection
//!
//! The activation policy compares the address the internet sees with the
//! address this host sends from. These are the two probes.

use super::types::MappingError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Public IP echo services, tried in order
const IP_DETECTION_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
    "https://checkip.amazonaws.com",
];

/// Well-known public address used to pick the outbound route
const PROBE_ADDR: &str = "8.8.8.8:80";

/// Detect the public IP address using HTTP echo services
///
/// Returns the first address any service reports.
pub async fn detect_public_ip() -> Result<IpAddr, MappingError> {
    info!("Detecting public IP address...");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| MappingError::Internal(format!("Failed to create HTTP client: {}", e)))?;

    for service_url in IP_DETECTION_SERVICES {
        debug!("Trying IP detection service: {}", service_url);

        let response = match client.get(*service_url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Failed to query {}: {}", service_url, e);
                continue;
            }
        };

        match response.text().await {
            Ok(text) => match text.trim().parse::<IpAddr>() {
                Ok(ip) => {
                    info!("Public IP detected: {} (from {})", ip, service_url);
                    return Ok(ip);
                }
                Err(_) => debug!("Invalid IP response from {}: {}", service_url, text.trim()),
            },
            Err(e) => debug!("Failed to read response from {}: {}", service_url, e),
        }
    }

    warn!("All public IP detection services failed");
    Err(MappingError::Internal("public IP detection failed".to_string()))
}

/// Local address of the interface used for outbound internet traffic
///
/// No packet is sent; connecting a UDP socket only selects a route.
pub fn outbound_ip() -> Result<IpAddr, MappingError> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(PROBE_ADDR)?;
    Ok(socket.local_addr()?.ip())
}

/// Local IPv4 address used to reach `target`
pub fn outbound_ip_towards(target: SocketAddr) -> Result<Ipv4Addr, MappingError> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(target)?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(ipv4) => Ok(ipv4),
        IpAddr::V6(_) => Err(MappingError::Internal(
            "UPnP requires IPv4 address".to_string(),
        )),
    }
}
