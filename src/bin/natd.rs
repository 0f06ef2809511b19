//! natd - keeps the node's port mapped on the upstream gateway
//!
//! Usage: `natd [settings.json]`

use nat_keeper::config::NatSettings;
use nat_keeper::nat::{
    detect_public_ip, outbound_ip, resolve_port_mapping, IgdGateway, LogMetrics, PortMappingRequest,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    nat_keeper::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "natd.json".to_string());
    let settings = NatSettings::load(&path)?;
    info!("Loaded settings from {}: {:?}", path, settings);

    let outbound = outbound_ip()?;
    let public = match detect_public_ip().await {
        Ok(ip) => ip,
        Err(e) => {
            warn!("Public IP unknown ({}), assuming NAT", e);
            std::net::IpAddr::from([0, 0, 0, 0])
        }
    };

    let handle = resolve_port_mapping(
        public,
        outbound,
        Arc::new(IgdGateway::with_timeout(settings.discovery_timeout())),
        PortMappingRequest::same_port(settings.protocol, settings.port, settings.description.clone()),
        settings.mapper_config(),
        Arc::new(LogMetrics),
    );

    if handle.is_noop() {
        info!("Node is directly reachable, no port mapping needed");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, removing port mapping");
    handle.stop().await;

    Ok(())
}
