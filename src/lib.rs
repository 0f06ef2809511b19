//! nat-keeper - NAT traversal maintenance for peer-to-peer nodes
//!
//! This library keeps a node reachable from the public internet while it sits
//! behind consumer NAT equipment, either by asking the upstream gateway to
//! forward a port or by sharing the host's own connection with local interfaces.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod nat;


/// Result type alias for nat-keeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for nat-keeper operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Port mapping error
    #[error("Mapping error: {0}")]
    Mapping(#[from] nat::MappingError),

    /// Connection sharing error
    #[error("Sharing error: {0}")]
    Sharing(#[from] nat::SharingError),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize logging
///
/// The filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
