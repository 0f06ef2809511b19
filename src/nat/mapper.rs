//! Gateway port mapping maintenance
//!
//! [`start_mapping`] spawns a background task that keeps one port forwarded
//! on a gateway until its [`MappingHandle`] is cancelled:
//!
//! 1. Add the mapping with a timed lease, falling back to a permanent lease
//!    when the gateway refuses timed ones.
//! 2. Report the outcome to the metrics sink.
//! 3. Stop if cancelled, otherwise sleep for the refresh interval and repeat.
//!
//! Failures never end the loop. The next iteration simply tries again, so a
//! gateway that reboots or drops its table gets the mapping back.
//! On cancellation the mapping is deleted once, best effort.

use super::gateway::Gateway;
use super::metrics::MetricsSink;
use super::types::{MappingError, PortMappingRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lease requested for a timed mapping
pub const MAP_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Delay between two refreshes of a mapping
pub const MAP_UPDATE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Timing of the maintenance loop
///
/// `lease` must be longer than `refresh_interval`, otherwise the mapping
/// expires between refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapperConfig {
    /// Delay between iterations, constant regardless of outcome
    pub refresh_interval: Duration,
    /// Lease of the timed mapping
    pub lease: Duration,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            refresh_interval: MAP_UPDATE_INTERVAL,
            lease: MAP_TIMEOUT,
        }
    }
}

/// Add a mapping, retrying with a permanent lease if the timed one is refused
///
/// Some gateways only accept permanent leases. The error of the permanent
/// attempt is returned when both fail.
pub fn establish_mapping(
    gateway: &dyn Gateway,
    request: &PortMappingRequest,
    lease: Duration,
) -> Result<(), MappingError> {
    let PortMappingRequest {
        protocol,
        external_port,
        internal_port,
        description,
    } = request;

    let err = match gateway.add_mapping(*protocol, *external_port, *internal_port, description, lease) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    debug!(
        "Couldn't add port mapping for port {}: {}, retrying with permanent lease",
        external_port, err
    );

    gateway
        .add_mapping(*protocol, *external_port, *internal_port, description, Duration::ZERO)
        .map_err(|e| MappingError::AddMapping {
            port: *external_port,
            source: Box::new(e),
        })
}

/// Handle to a running mapping loop
///
/// Dropping the handle cancels the loop just like [`MappingHandle::cancel`].
#[derive(Debug)]
pub struct MappingHandle {
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl MappingHandle {
    /// Handle with no loop behind it
    pub fn noop() -> Self {
        Self {
            shutdown_tx: None,
            task: None,
        }
    }

    /// True when no loop was started for this handle
    pub fn is_noop(&self) -> bool {
        self.task.is_none()
    }

    /// Ask the loop to delete the mapping and stop
    ///
    /// Never blocks and may be called any number of times. An in-flight
    /// gateway request is not interrupted; the loop stops after it.
    pub fn cancel(&self) {
        if let Some(tx) = &self.shutdown_tx {
            tx.send_replace(true);
        }
    }

    /// Cancel and wait until the mapping has been deleted
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Port mapping task ended abnormally: {}", e);
            }
        }
    }
}

/// Start keeping `request` mapped on `gateway`
///
/// Must be called from within a Tokio runtime.
pub fn start_mapping(
    gateway: Arc<dyn Gateway>,
    request: PortMappingRequest,
    config: MapperConfig,
    metrics: Arc<dyn MetricsSink>,
) -> MappingHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        run_mapping_loop(gateway, request, config, metrics, shutdown_rx).await;
    });

    MappingHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    }
}

async fn run_mapping_loop(
    gateway: Arc<dyn Gateway>,
    request: PortMappingRequest,
    config: MapperConfig,
    metrics: Arc<dyn MetricsSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let port = request.external_port;

    loop {
        let gw = gateway.clone();
        let req = request.clone();
        let result = tokio::task::spawn_blocking(move || establish_mapping(gw.as_ref(), &req, config.lease))
            .await
            .unwrap_or_else(|e| Err(MappingError::Internal(format!("Task join error: {}", e))));

        report(metrics.as_ref(), port, result);

        // Cancellation wins over an elapsed timer
        tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => break,
            _ = tokio::time::sleep(config.refresh_interval) => {}
        }
    }

    debug!("Deleting port mapping for port: {}", port);

    let req = request.clone();
    let deleted = tokio::task::spawn_blocking(move || {
        gateway.delete_mapping(req.protocol, req.external_port, req.internal_port)
    })
    .await
    .unwrap_or_else(|e| Err(MappingError::Internal(format!("Task join error: {}", e))));

    if let Err(e) = deleted {
        debug!("Couldn't delete port mapping for port {}: {}", port, e);
    }
}

fn report(metrics: &dyn MetricsSink, port: u16, result: Result<(), MappingError>) {
    let sent = match result {
        Ok(()) => {
            info!("Mapped network port: {}", port);
            metrics.notify_mapping_success()
        }
        Err(e) => {
            info!("Mapping for port {} failed: {}", port, e);
            metrics.notify_mapping_failure(&e)
        }
    };

    if let Err(e) = sent {
        warn!("Failed to report port mapping outcome: {}", e);
    }
}

/// Resolves once cancellation is signalled or the handle is gone
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
