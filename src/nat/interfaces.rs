//! Host interface resolution
//!
//! Maps a subnet, or the default route, to the name of a local network
//! interface. Host introspection sits behind [`HostNetwork`] so resolution
//! can be exercised without touching the real routing table.

use super::executor::{CommandExecutor, PowerShell};
use super::types::SharingError;
use ipnet::IpNet;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Address assigned to an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceAddr {
    /// Address together with its prefix
    Net(IpNet),
    /// Bare address
    Ip(IpAddr),
}

impl InterfaceAddr {
    /// The address itself, without prefix
    pub fn ip(&self) -> IpAddr {
        match self {
            Self::Net(net) => net.addr(),
            Self::Ip(ip) => *ip,
        }
    }
}

/// A host network interface with its addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    /// OS interface name
    pub name: String,
    /// OS interface index
    pub index: u32,
    /// Assigned addresses
    pub addrs: Vec<InterfaceAddr>,
}

/// Host network introspection
pub trait HostNetwork: Send + Sync {
    /// Enumerate host interfaces and their addresses
    fn interfaces(&self) -> io::Result<Vec<NetInterface>>;

    /// Index of the interface carrying the default route (0.0.0.0/0)
    fn default_route_index(&self) -> Result<u32, SharingError>;
}

/// Name of the first interface owning an address inside `subnet`
pub fn interface_by_subnet(net: &dyn HostNetwork, subnet: &str) -> Result<String, SharingError> {
    let subnet: IpNet = subnet.trim().parse()?;
    let subnet = subnet.trunc();

    let interfaces = net.interfaces().map_err(SharingError::InterfaceList)?;

    interfaces
        .into_iter()
        .find(|iface| contains(&subnet, &iface.addrs))
        .map(|iface| {
            debug!("Subnet {} belongs to interface {}", subnet, iface.name);
            iface.name
        })
        .ok_or(SharingError::InterfaceNotFound)
}

/// Name of the interface facing the internet
pub fn public_interface(net: &dyn HostNetwork) -> Result<String, SharingError> {
    let index = net.default_route_index()?;
    let interfaces = net.interfaces().map_err(SharingError::InterfaceList)?;

    interfaces
        .into_iter()
        .find(|iface| iface.index == index)
        .map(|iface| iface.name)
        .ok_or(SharingError::InterfaceNotFound)
}

fn contains(subnet: &IpNet, addrs: &[InterfaceAddr]) -> bool {
    addrs.iter().any(|addr| subnet.contains(&addr.ip()))
}

/// Interface index printed by the default route query
pub(crate) fn parse_interface_index(output: &[u8]) -> Result<u32, SharingError> {
    let text = String::from_utf8_lossy(output);
    let first = text.lines().map(str::trim).find(|l| !l.is_empty());

    match first {
        Some(line) => line
            .parse()
            .map_err(|e| SharingError::DefaultRoute(format!("failed to parse interface ID {:?}: {}", line, e))),
        None => Err(SharingError::DefaultRoute("no interface on the default route".to_string())),
    }
}

/// Interface name of the default route in a `/proc/net/route` table
pub(crate) fn parse_route_table(table: &str) -> Option<String> {
    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            continue;
        }

        // Destination and mask both zero
        if fields[1] == "00000000" && fields[7] == "00000000" {
            return Some(fields[0].to_string());
        }
    }
    None
}

/// Default route query for Windows hosts
const DEFAULT_ROUTE_QUERY: &str = "Get-WmiObject -Class Win32_IP4RouteTable | where { $_.destination -eq '0.0.0.0' -and $_.mask -eq '0.0.0.0'} | foreach { $_.InterfaceIndex }";

/// The real host
#[derive(Clone)]
pub struct SystemNetwork {
    executor: Arc<dyn CommandExecutor>,
}

impl SystemNetwork {
    /// Host introspection using PowerShell for route queries where needed
    pub fn new() -> Self {
        Self::with_executor(Arc::new(PowerShell))
    }

    /// Host introspection running route queries through `executor`
    pub fn with_executor(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

impl Default for SystemNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl HostNetwork for SystemNetwork {
    fn interfaces(&self) -> io::Result<Vec<NetInterface>> {
        let mut result: Vec<NetInterface> = Vec::new();

        for iface in if_addrs::get_if_addrs()? {
            let addr = match &iface.addr {
                if_addrs::IfAddr::V4(v4) => ipnet::Ipv4Net::with_netmask(v4.ip, v4.netmask)
                    .map(|net| InterfaceAddr::Net(IpNet::V4(net)))
                    .unwrap_or(InterfaceAddr::Ip(IpAddr::V4(v4.ip))),
                if_addrs::IfAddr::V6(v6) => ipnet::Ipv6Net::with_netmask(v6.ip, v6.netmask)
                    .map(|net| InterfaceAddr::Net(IpNet::V6(net)))
                    .unwrap_or(InterfaceAddr::Ip(IpAddr::V6(v6.ip))),
            };

            match result.iter_mut().find(|known| known.name == iface.name) {
                Some(known) => known.addrs.push(addr),
                None => result.push(NetInterface {
                    index: iface.index.unwrap_or(0),
                    name: iface.name,
                    addrs: vec![addr],
                }),
            }
        }

        Ok(result)
    }

    fn default_route_index(&self) -> Result<u32, SharingError> {
        if cfg!(target_os = "windows") {
            let out = self
                .executor
                .run(DEFAULT_ROUTE_QUERY)
                .map_err(|e| SharingError::DefaultRoute(e.to_string()))?;
            return parse_interface_index(&out);
        }

        if cfg!(target_os = "linux") {
            let table = std::fs::read_to_string("/proc/net/route")
                .map_err(|e| SharingError::DefaultRoute(format!("failed to read route table: {}", e)))?;
            let name = parse_route_table(&table)
                .ok_or_else(|| SharingError::DefaultRoute("no default route".to_string()))?;

            return self
                .interfaces()
                .map_err(SharingError::InterfaceList)?
                .into_iter()
                .find(|iface| iface.name == name)
                .map(|iface| iface.index)
                .ok_or(SharingError::InterfaceNotFound);
        }

        Err(SharingError::NotSupported)
    }
}
