//! Common types for the NAT module

use super::executor::CommandError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Transport protocol of a port mapping
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum IpProtocol {
    /// TCP protocol
    TCP,
    /// UDP protocol
    UDP,
}

impl IpProtocol {
    /// Protocol name as gateways expect it
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TCP => "TCP",
            Self::UDP => "UDP",
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpProtocol {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Self::TCP),
            "UDP" => Ok(Self::UDP),
            other => Err(MappingError::InvalidProtocol(other.to_string())),
        }
    }
}

/// One mapping on one gateway
///
/// Never changes once a maintenance loop has started for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMappingRequest {
    /// Transport protocol
    pub protocol: IpProtocol,
    /// Port opened on the gateway's external address
    pub external_port: u16,
    /// Local port the gateway forwards to
    pub internal_port: u16,
    /// Rule name shown on the gateway
    pub description: String,
}

impl PortMappingRequest {
    /// Request mapping the same port number on both sides
    pub fn same_port(protocol: IpProtocol, port: u16, description: impl Into<String>) -> Self {
        Self {
            protocol,
            external_port: port,
            internal_port: port,
            description: description.into(),
        }
    }
}

/// Rule asking for the traffic of a local subnet to be shared to the public interface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardingRule {
    /// Local subnet in CIDR notation, e.g. `10.8.0.1/24`
    pub source_address: String,
}

impl ForwardingRule {
    /// Create a rule for the given subnet
    pub fn new(source_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
        }
    }
}

/// Errors that can occur during port mapping
#[derive(Debug, Error)]
pub enum MappingError {
    /// Gateway rejected or failed a request
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// No gateway found on network
    #[error("No gateway found")]
    NoGateway,

    /// Both the timed and the permanent lease were refused
    #[error("couldn't add port mapping for port {port}: {source}")]
    AddMapping {
        /// External port of the mapping
        port: u16,
        /// Error of the permanent lease attempt
        #[source]
        source: Box<MappingError>,
    },

    /// Unknown protocol name
    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),

    /// IO error during communication
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors of the connection sharing service and interface resolution
#[derive(Debug, Error)]
pub enum SharingError {
    /// Subnet string is not valid CIDR
    #[error("failed to parse subnet from request: {0}")]
    InvalidSubnet(#[from] ipnet::AddrParseError),

    /// No host interface matched the query
    #[error("interface not found")]
    InterfaceNotFound,

    /// Host interfaces could not be listed
    #[error("failed to get a list of network interfaces: {0}")]
    InterfaceList(#[source] std::io::Error),

    /// Default route could not be read or parsed
    #[error("failed to get interface from the default route: {0}")]
    DefaultRoute(String),

    /// Default route lookup is not available on this platform
    #[error("default route lookup not supported on this platform")]
    NotSupported,

    /// Sharing action was empty
    #[error("empty action provided")]
    EmptyAction,

    /// Interface name was empty
    #[error("empty interface name provided")]
    EmptyInterfaceName,

    /// Privileged command failed
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Error wrapped with the step it happened in
    #[error("{context}: {source}")]
    Context {
        /// Step that failed
        context: &'static str,
        /// Underlying error
        #[source]
        source: Box<SharingError>,
    },
}

impl SharingError {
    /// Innermost error, past any context wrapping
    pub fn root(&self) -> &SharingError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach a step description to a sharing error
pub(crate) trait SharingContext<T> {
    fn context(self, context: &'static str) -> Result<T, SharingError>;
}

impl<T, E: Into<SharingError>> SharingContext<T> for Result<T, E> {
    fn context(self, context: &'static str) -> Result<T, SharingError> {
        self.map_err(|e| SharingError::Context {
            context,
            source: Box::new(e.into()),
        })
    }
}
