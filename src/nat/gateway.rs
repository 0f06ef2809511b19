//! NAT gateway control
//!
//! [`Gateway`] is the capability the port mapper drives. [`IgdGateway`] backs it
//! with a UPnP Internet Gateway Device found through SSDP.

use super::addresses::outbound_ip_towards;
use super::types::{IpProtocol, MappingError};
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for UPnP discovery
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// A NAT device able to forward external ports to this host
///
/// Calls block on network I/O; async callers run them on the blocking pool.
pub trait Gateway: Send + Sync {
    /// Forward `external_port` to `internal_port` on this host.
    /// A zero `lease` requests a permanent mapping.
    fn add_mapping(
        &self,
        protocol: IpProtocol,
        external_port: u16,
        internal_port: u16,
        description: &str,
        lease: Duration,
    ) -> Result<(), MappingError>;

    /// Remove a mapping previously added
    fn delete_mapping(
        &self,
        protocol: IpProtocol,
        external_port: u16,
        internal_port: u16,
    ) -> Result<(), MappingError>;
}

/// UPnP IGD gateway, discovered on first use
///
/// A failed request drops the discovered device so the next call searches
/// again; routers that reboot or change address are picked up that way.
pub struct IgdGateway {
    timeout: Duration,
    device: Mutex<Option<igd_next::Gateway>>,
}

impl IgdGateway {
    /// Gateway searched with the default discovery timeout
    pub fn new() -> Self {
        Self::with_timeout(DISCOVERY_TIMEOUT)
    }

    /// Gateway searched with a custom discovery timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            device: Mutex::new(None),
        }
    }

    fn device(&self) -> Result<igd_next::Gateway, MappingError> {
        let mut cached = self
            .device
            .lock()
            .map_err(|_| MappingError::Internal("gateway lock poisoned".to_string()))?;

        if let Some(device) = cached.as_ref() {
            return Ok(device.clone());
        }

        debug!("Searching for UPnP IGD gateway...");
        let device = igd_next::search_gateway(igd_next::SearchOptions {
            timeout: Some(self.timeout),
            ..Default::default()
        })
        .map_err(|e| {
            debug!("UPnP gateway search failed: {}", e);
            MappingError::NoGateway
        })?;

        info!("Found UPnP gateway at {}", device.addr);
        *cached = Some(device.clone());
        Ok(device)
    }

    fn forget(&self) {
        if let Ok(mut cached) = self.device.lock() {
            *cached = None;
        }
    }

    fn with_device<T>(
        &self,
        op: impl FnOnce(&igd_next::Gateway) -> Result<T, MappingError>,
    ) -> Result<T, MappingError> {
        let device = self.device()?;
        let result = op(&device);
        if result.is_err() {
            self.forget();
        }
        result
    }
}

impl Default for IgdGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn igd_protocol(protocol: IpProtocol) -> igd_next::PortMappingProtocol {
    match protocol {
        IpProtocol::TCP => igd_next::PortMappingProtocol::TCP,
        IpProtocol::UDP => igd_next::PortMappingProtocol::UDP,
    }
}

impl Gateway for IgdGateway {
    fn add_mapping(
        &self,
        protocol: IpProtocol,
        external_port: u16,
        internal_port: u16,
        description: &str,
        lease: Duration,
    ) -> Result<(), MappingError> {
        self.with_device(|device| {
            let local_ip = outbound_ip_towards(device.addr)?;
            let local_addr = SocketAddr::new(IpAddr::V4(local_ip), internal_port);
            let lease_secs = u32::try_from(lease.as_secs()).unwrap_or(u32::MAX);

            debug!(
                "Adding port mapping: {} {} -> {} ({}s)",
                protocol, external_port, local_addr, lease_secs
            );

            device
                .add_port(
                    igd_protocol(protocol),
                    external_port,
                    local_addr,
                    lease_secs,
                    description,
                )
                .map_err(|e| MappingError::GatewayError(format!("AddPortMapping failed: {}", e)))
        })
    }

    fn delete_mapping(
        &self,
        protocol: IpProtocol,
        external_port: u16,
        _internal_port: u16,
    ) -> Result<(), MappingError> {
        self.with_device(|device| {
            device
                .remove_port(igd_protocol(protocol), external_port)
                .map_err(|e| MappingError::GatewayError(format!("DeletePortMapping failed: {}", e)))
        })
    }
}
