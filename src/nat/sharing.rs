//! Internet connection sharing
//!
//! [`SharingService`] turns the host into a gateway for local interfaces:
//! the interface on the default route shares its connection publicly, and
//! each interface matched by a [`ForwardingRule`] is attached as a private
//! side. The service remembers which interfaces it attached and what the
//! remote access service looked like before, so [`SharingService::disable`]
//! can put everything back.
//!
//! `enable` is expected before any `add`. This is not enforced; an `add` on a
//! disabled service is carried out and logged.

use super::executor::CommandExecutor;
use super::interfaces::{interface_by_subnet, public_interface, HostNetwork};
use super::types::{ForwardingRule, SharingContext, SharingError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

const ENABLE_PUBLIC_SHARING: &str = "$config.EnableSharing(0)";
const ENABLE_PRIVATE_SHARING: &str = "$config.EnableSharing(1)";
const DISABLE_SHARING: &str = "$config.DisableSharing()";

const QUERY_REMOTE_ACCESS_STARTUP: &str = "Get-Service RemoteAccess | foreach { $_.StartType }";
const START_REMOTE_ACCESS: &str = "Start-Service -Name RemoteAccess";

fn set_remote_access_startup(mode: &str) -> String {
    format!("Set-Service -Name RemoteAccess -StartupType {}", mode)
}

fn sharing_script(action: &str, iface: &str) -> String {
    format!(
        r#"regsvr32 /s hnetcfg.dll;
		$netShare = New-Object -ComObject HNetCfg.HNetShare;
		$c = $netShare.EnumEveryConnection |? {{ $netShare.NetConnectionProps.Invoke($_).Name -eq "{}" }};
		$config = $netShare.INetSharingConfigurationForINetConnection.Invoke($c);{}"#,
        iface, action
    )
}

#[derive(Debug, Default)]
struct SharingState {
    /// Interfaces with private sharing enabled, by name
    interfaces: HashMap<String, ForwardingRule>,
    /// Startup mode of the remote access service before the first `enable`
    saved_startup_mode: Option<String>,
    enabled: bool,
}

/// Keeps the first error of a multi-step teardown while every step still runs
#[derive(Debug, Default)]
struct FirstError {
    first: Option<SharingError>,
}

impl FirstError {
    fn record(&mut self, err: SharingError) {
        if self.first.is_none() {
            self.first = Some(err);
        }
    }

    fn finish(self) -> Result<(), SharingError> {
        match self.first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Connection sharing for a set of local interfaces
///
/// The state lock is never held while a command runs.
pub struct SharingService {
    state: Mutex<SharingState>,
    executor: Arc<dyn CommandExecutor>,
    network: Arc<dyn HostNetwork>,
}

impl SharingService {
    /// Create a service with no shared interfaces
    pub fn new(executor: Arc<dyn CommandExecutor>, network: Arc<dyn HostNetwork>) -> Self {
        Self {
            state: Mutex::new(SharingState::default()),
            executor,
            network,
        }
    }

    fn state(&self) -> MutexGuard<'_, SharingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether public sharing is currently on
    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    /// Interfaces with private sharing on, sorted by name
    pub fn shared_interfaces(&self) -> Vec<(String, ForwardingRule)> {
        let mut shared: Vec<_> = self
            .state()
            .interfaces
            .iter()
            .map(|(name, rule)| (name.clone(), rule.clone()))
            .collect();
        shared.sort_by(|a, b| a.0.cmp(&b.0));
        shared
    }

    /// Startup mode that `disable` will restore, if captured
    pub fn saved_startup_mode(&self) -> Option<String> {
        self.state().saved_startup_mode.clone()
    }

    /// Enable sharing on the public interface
    ///
    /// Nothing is rolled back on failure; call [`disable`](Self::disable).
    pub fn enable(&self) -> Result<(), SharingError> {
        self.enable_remote_access()
            .context("failed to enable RemoteAccess service")?;

        let iface = public_interface(self.network.as_ref())
            .context("failed to get public interface name")?;

        self.apply_sharing_config(ENABLE_PUBLIC_SHARING, &iface)
            .context("failed to enable internet connection sharing")?;

        self.state().enabled = true;
        info!("Internet connection sharing enabled on public interface {}", iface);
        Ok(())
    }

    fn enable_remote_access(&self) -> Result<(), SharingError> {
        if self.state().saved_startup_mode.is_none() {
            let status = self
                .executor
                .run(QUERY_REMOTE_ACCESS_STARTUP)
                .context("failed to get RemoteAccess service startup type")?;
            let mode = String::from_utf8_lossy(&status).trim().to_string();
            debug!("RemoteAccess service startup type: {}", mode);

            self.state().saved_startup_mode.get_or_insert(mode);
        }

        self.executor
            .run(&set_remote_access_startup("automatic"))
            .context("failed to set RemoteAccess service startup type to automatic")?;

        self.executor
            .run(START_REMOTE_ACCESS)
            .context("failed to start RemoteAccess service")?;
        Ok(())
    }

    /// Enable private sharing on the interface serving `rule.source_address`
    ///
    /// The rule is recorded only if the interface was found and configured.
    pub fn add(&self, rule: &ForwardingRule) -> Result<(), SharingError> {
        if !self.is_enabled() {
            warn!(
                "Adding sharing rule for {} while public sharing is not enabled",
                rule.source_address
            );
        }

        let iface = interface_by_subnet(self.network.as_ref(), &rule.source_address)
            .context("failed to find suitable interface")?;

        self.apply_sharing_config(ENABLE_PRIVATE_SHARING, &iface)
            .context("failed to enable internet connection sharing for internal interface")?;

        self.state().interfaces.insert(iface.clone(), rule.clone());
        info!("Internet connection sharing enabled for interface {}", iface);
        Ok(())
    }

    /// Disable sharing on the interface serving `rule.source_address`
    pub fn del(&self, rule: &ForwardingRule) -> Result<(), SharingError> {
        let iface = interface_by_subnet(self.network.as_ref(), &rule.source_address)
            .context("failed to find suitable interface")?;

        self.apply_sharing_config(DISABLE_SHARING, &iface)
            .context("failed to disable internet connection sharing for internal interface")?;

        self.state().interfaces.remove(&iface);
        info!("Internet connection sharing disabled for interface {}", iface);
        Ok(())
    }

    /// Undo everything `enable` and `add` set up
    ///
    /// Every step is attempted even when an earlier one fails; the first
    /// error is returned. An error therefore means cleanup was partial.
    pub fn disable(&self) -> Result<(), SharingError> {
        let mut errors = FirstError::default();

        let shared: Vec<(String, ForwardingRule)> = self
            .state()
            .interfaces
            .iter()
            .map(|(name, rule)| (name.clone(), rule.clone()))
            .collect();

        for (iface, rule) in shared {
            if let Err(e) = self.del(&rule) {
                error!(
                    "Failed to cleanup internet connection sharing for '{}' interface: {}",
                    iface, e
                );
                errors.record(e);
            }
        }

        let saved = self.state().saved_startup_mode.clone();
        match saved {
            Some(mode) => match self
                .executor
                .run(&set_remote_access_startup(&mode))
                .context("failed to revert RemoteAccess service startup type")
            {
                Ok(_) => self.state().saved_startup_mode = None,
                Err(e) => {
                    error!("{}", e);
                    errors.record(e);
                }
            },
            None => debug!("No saved RemoteAccess startup type, nothing to restore"),
        }

        let public = public_interface(self.network.as_ref())
            .context("failed to get public interface name")
            .and_then(|iface| {
                self.apply_sharing_config(DISABLE_SHARING, &iface)
                    .context("failed to disable internet connection sharing")
            });
        if let Err(e) = public {
            error!("{}", e);
            errors.record(e);
        }

        self.state().enabled = false;
        errors.finish()
    }

    fn apply_sharing_config(&self, action: &str, iface: &str) -> Result<(), SharingError> {
        if action.is_empty() {
            return Err(SharingError::EmptyAction);
        }
        if iface.is_empty() {
            return Err(SharingError::EmptyInterfaceName);
        }

        self.executor.run(&sharing_script(action, iface))?;
        Ok(())
    }
}
