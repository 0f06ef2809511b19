//! Reporting of port mapping outcomes

use tracing::info;

/// Receives the outcome of each port mapping attempt
///
/// Errors returned here are logged by the caller and otherwise ignored.
pub trait MetricsSink: Send + Sync {
    /// A mapping was established or refreshed
    fn notify_mapping_success(&self) -> anyhow::Result<()>;

    /// A mapping attempt failed
    fn notify_mapping_failure(&self, cause: &(dyn std::error::Error + Send + Sync)) -> anyhow::Result<()>;
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn notify_mapping_success(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn notify_mapping_failure(&self, _cause: &(dyn std::error::Error + Send + Sync)) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink that writes events to the log under the `nat_metrics` target
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn notify_mapping_success(&self) -> anyhow::Result<()> {
        info!(target: "nat_metrics", event = "nat_mapping", success = true);
        Ok(())
    }

    fn notify_mapping_failure(&self, cause: &(dyn std::error::Error + Send + Sync)) -> anyhow::Result<()> {
        info!(target: "nat_metrics", event = "nat_mapping", success = false, error = %cause);
        Ok(())
    }
}
