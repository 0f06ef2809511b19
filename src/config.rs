//! Daemon settings

use crate::nat::{IpProtocol, MapperConfig};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of the NAT daemon
///
/// Stored as JSON. Missing fields take their defaults, and a missing or
/// empty file yields [`NatSettings::default`].
///
/// # Example
/// ```rust,no_run
/// use nat_keeper::config::NatSettings;
///
/// let settings = NatSettings::load("natd.json").expect("Failed to load");
/// println!("Refreshing every {}s", settings.refresh_interval_secs);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatSettings {
    /// Seconds between two refreshes of a port mapping
    pub refresh_interval_secs: u64,
    /// Lease requested for timed mappings, in seconds
    pub lease_duration_secs: u64,
    /// UPnP discovery timeout in seconds
    pub discovery_timeout_secs: u64,
    /// Rule name shown on the gateway
    pub description: String,
    /// Protocol of the mapped port
    pub protocol: IpProtocol,
    /// Port to map (same number externally and internally)
    pub port: u16,
}

impl NatSettings {
    /// Load settings from a JSON file
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read settings: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;

        Ok(settings)
    }

    /// Save settings to a JSON file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Check that timed leases outlive the refresh interval
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(Error::Config("refresh interval must be positive".to_string()));
        }
        if self.lease_duration_secs <= self.refresh_interval_secs {
            return Err(Error::Config(format!(
                "lease duration ({}s) must exceed refresh interval ({}s)",
                self.lease_duration_secs, self.refresh_interval_secs
            )));
        }
        Ok(())
    }

    /// Timing of the mapping loop
    pub fn mapper_config(&self) -> MapperConfig {
        MapperConfig {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            lease: Duration::from_secs(self.lease_duration_secs),
        }
    }

    /// UPnP discovery timeout
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

impl Default for NatSettings {
    fn default() -> Self {
        let mapper = MapperConfig::default();
        Self {
            refresh_interval_secs: mapper.refresh_interval.as_secs(),
            lease_duration_secs: mapper.lease.as_secs(),
            discovery_timeout_secs: 5,
            description: "nat-keeper".to_string(),
            protocol: IpProtocol::UDP,
            port: 4050,
        }
    }
}
