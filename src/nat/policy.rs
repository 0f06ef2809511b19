//! Mapping activation policy
//!
//! A port mapping is only worth maintaining when the node sits behind NAT,
//! which shows as a public address different from the outbound one.

use super::gateway::{Gateway, IgdGateway};
use super::mapper::{start_mapping, MapperConfig, MappingHandle};
use super::metrics::MetricsSink;
use super::types::{IpProtocol, PortMappingRequest};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Start maintaining `request` on `gateway` if the node is behind NAT
///
/// Returns a no-op handle and spawns nothing when `public_ip` equals
/// `outbound_ip`. The decision is taken once; callers re-run it when the
/// addresses change.
pub fn resolve_port_mapping(
    public_ip: IpAddr,
    outbound_ip: IpAddr,
    gateway: Arc<dyn Gateway>,
    request: PortMappingRequest,
    config: MapperConfig,
    metrics: Arc<dyn MetricsSink>,
) -> MappingHandle {
    if public_ip == outbound_ip {
        debug!(
            "Public IP {} matches outbound IP, port mapping not needed",
            public_ip
        );
        return MappingHandle::noop();
    }

    info!(
        "Node is behind NAT (public {}, outbound {}), mapping {} port {}",
        public_ip, outbound_ip, request.protocol, request.external_port
    );
    start_mapping(gateway, request, config, metrics)
}

/// Map `port` to the same local port on a freshly discovered UPnP gateway,
/// if the node is behind NAT
pub fn port_mapping_for(
    public_ip: IpAddr,
    outbound_ip: IpAddr,
    protocol: IpProtocol,
    port: u16,
    description: &str,
    config: MapperConfig,
    metrics: Arc<dyn MetricsSink>,
) -> MappingHandle {
    resolve_port_mapping(
        public_ip,
        outbound_ip,
        Arc::new(IgdGateway::new()),
        PortMappingRequest::same_port(protocol, port, description),
        config,
        metrics,
    )
}
