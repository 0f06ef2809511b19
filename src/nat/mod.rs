//! NAT traversal maintenance
//!
//! This module keeps a node reachable from behind NAT in two ways:
//! - Gateway port mapping: a background loop keeps one port forwarded on a
//!   UPnP gateway, refreshing it and deleting it on cancellation.
//! - Connection sharing: the host itself acts as a gateway, sharing its
//!   public interface with local interfaces selected by subnet.

// Submodules
pub mod addresses;
pub mod executor;
pub mod gateway;
pub mod interfaces;
pub mod mapper;
pub mod metrics;
pub mod policy;
pub mod sharing;
pub mod types;

// Re-export commonly used types
pub use types::{ForwardingRule, IpProtocol, MappingError, PortMappingRequest, SharingError};

// Re-export main functions
pub use addresses::{detect_public_ip, outbound_ip};
pub use interfaces::{interface_by_subnet, public_interface, HostNetwork, SystemNetwork};
pub use mapper::{establish_mapping, start_mapping, MapperConfig, MappingHandle};
pub use policy::{port_mapping_for, resolve_port_mapping};

// Re-export capabilities
pub use executor::{CommandError, CommandExecutor, PowerShell};
pub use gateway::{Gateway, IgdGateway};
pub use metrics::{LogMetrics, MetricsSink, NoopMetrics};
pub use sharing::SharingService;
