//! Shared mocks for NAT tests

use crate::nat::executor::{CommandError, CommandExecutor};
use crate::nat::gateway::Gateway;
use crate::nat::interfaces::{HostNetwork, InterfaceAddr, NetInterface};
use crate::nat::metrics::MetricsSink;
use crate::nat::types::{IpProtocol, MappingError, SharingError};
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A call received by [`MockGateway`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Add {
        protocol: IpProtocol,
        external_port: u16,
        internal_port: u16,
        description: String,
        lease: Duration,
    },
    Delete {
        protocol: IpProtocol,
        external_port: u16,
        internal_port: u16,
    },
}

impl GatewayCall {
    pub fn is_add(&self) -> bool {
        matches!(self, Self::Add { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Gateway recording every call, optionally refusing timed or permanent leases
#[derive(Default)]
pub struct MockGateway {
    calls: Mutex<Vec<GatewayCall>>,
    refuse_timed: AtomicBool,
    refuse_permanent: AtomicBool,
    refuse_delete: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that only accepts permanent leases
    pub fn permanent_only() -> Self {
        let gw = Self::default();
        gw.refuse_timed.store(true, Ordering::SeqCst);
        gw
    }

    /// Gateway refusing every mapping
    pub fn broken() -> Self {
        let gw = Self::permanent_only();
        gw.refuse_permanent.store(true, Ordering::SeqCst);
        gw.refuse_delete.store(true, Ordering::SeqCst);
        gw
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn adds(&self) -> usize {
        self.calls().iter().filter(|c| c.is_add()).count()
    }

    pub fn deletes(&self) -> usize {
        self.calls().iter().filter(|c| c.is_delete()).count()
    }
}

impl Gateway for MockGateway {
    fn add_mapping(
        &self,
        protocol: IpProtocol,
        external_port: u16,
        internal_port: u16,
        description: &str,
        lease: Duration,
    ) -> Result<(), MappingError> {
        self.calls.lock().unwrap().push(GatewayCall::Add {
            protocol,
            external_port,
            internal_port,
            description: description.to_string(),
            lease,
        });

        let refused = if lease.is_zero() {
            self.refuse_permanent.load(Ordering::SeqCst)
        } else {
            self.refuse_timed.load(Ordering::SeqCst)
        };

        if refused {
            Err(MappingError::GatewayError(format!(
                "lease of {}s refused",
                lease.as_secs()
            )))
        } else {
            Ok(())
        }
    }

    fn delete_mapping(
        &self,
        protocol: IpProtocol,
        external_port: u16,
        internal_port: u16,
    ) -> Result<(), MappingError> {
        self.calls.lock().unwrap().push(GatewayCall::Delete {
            protocol,
            external_port,
            internal_port,
        });

        if self.refuse_delete.load(Ordering::SeqCst) {
            Err(MappingError::GatewayError("delete refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Metrics sink counting events
#[derive(Default)]
pub struct MockMetrics {
    pub successes: AtomicUsize,
    pub failures: Mutex<Vec<String>>,
    broken: bool,
}

impl MockMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every notification fails
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn success_count(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }

    fn outcome(&self) -> anyhow::Result<()> {
        if self.broken {
            anyhow::bail!("metrics transport down")
        }
        Ok(())
    }
}

impl MetricsSink for MockMetrics {
    fn notify_mapping_success(&self) -> anyhow::Result<()> {
        self.successes.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    fn notify_mapping_failure(&self, cause: &(dyn std::error::Error + Send + Sync)) -> anyhow::Result<()> {
        self.failures.lock().unwrap().push(cause.to_string());
        self.outcome()
    }
}

type FailRule = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Executor recording scripts instead of running them
pub struct MockExecutor {
    scripts: Mutex<Vec<String>>,
    startup_mode: Mutex<String>,
    fail_when: Mutex<Option<FailRule>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            startup_mode: Mutex::new("Manual\r\n".to_string()),
            fail_when: Mutex::new(None),
        }
    }

    /// Fail every script for which `rule` returns true
    pub fn fail_when(&self, rule: impl Fn(&str) -> bool + Send + Sync + 'static) {
        *self.fail_when.lock().unwrap() = Some(Box::new(rule));
    }

    /// Output of the startup type query
    pub fn set_startup_mode(&self, mode: &str) {
        *self.startup_mode.lock().unwrap() = mode.to_string();
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    /// Scripts containing every one of `needles`
    pub fn count_matching(&self, needles: &[&str]) -> usize {
        self.scripts()
            .iter()
            .filter(|s| needles.iter().all(|n| s.contains(n)))
            .count()
    }
}

impl CommandExecutor for MockExecutor {
    fn run(&self, script: &str) -> Result<Vec<u8>, CommandError> {
        self.scripts.lock().unwrap().push(script.to_string());

        if let Some(rule) = self.fail_when.lock().unwrap().as_ref() {
            if rule(script) {
                return Err(CommandError::Failed {
                    status: "exit code: 1".to_string(),
                    output: "access denied".to_string(),
                });
            }
        }

        if script.starts_with("Get-Service RemoteAccess") {
            return Ok(self.startup_mode.lock().unwrap().clone().into_bytes());
        }
        Ok(Vec::new())
    }
}

/// Host with a fixed set of interfaces
pub struct MockNetwork {
    pub interfaces: Vec<NetInterface>,
    pub default_index: Option<u32>,
    pub list_fails: bool,
}

impl MockNetwork {
    /// eth0 (index 2) carries the default route; tap0..tap2 serve 10.8/10.9/10.10
    pub fn standard() -> Self {
        Self {
            interfaces: vec![
                iface("lo", 1, &["127.0.0.1/8"], &[]),
                iface("eth0", 2, &["192.168.1.10/24"], &[]),
                iface("tap0", 5, &["10.8.0.1/24"], &[]),
                iface("tap1", 6, &["10.9.0.1/24"], &[]),
                iface("tap2", 7, &[], &["10.10.0.1"]),
            ],
            default_index: Some(2),
            list_fails: false,
        }
    }
}

impl HostNetwork for MockNetwork {
    fn interfaces(&self) -> io::Result<Vec<NetInterface>> {
        if self.list_fails {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "netlink denied"));
        }
        Ok(self.interfaces.clone())
    }

    fn default_route_index(&self) -> Result<u32, SharingError> {
        self.default_index
            .ok_or_else(|| SharingError::DefaultRoute("no default route".to_string()))
    }
}

/// Interface with addresses given as CIDR (`nets`) or bare (`ips`)
pub fn iface(name: &str, index: u32, nets: &[&str], ips: &[&str]) -> NetInterface {
    let mut addrs: Vec<InterfaceAddr> = nets
        .iter()
        .map(|n| InterfaceAddr::Net(n.parse().unwrap()))
        .collect();
    addrs.extend(ips.iter().map(|ip| InterfaceAddr::Ip(ip.parse::<IpAddr>().unwrap())));

    NetInterface {
        name: name.to_string(),
        index,
        addrs,
    }
}

/// Poll `cond` until it holds, failing the test after five seconds
pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
