//! Monitoring for the cascades engine.
//!
//! Structured logging bootstrap and a small metric-recording facade. Metrics
//! are emitted as `tracing` events; shipping them to a backend is left to the
//! subscriber the host application installs.

use serde::{Deserialize, Serialize};
use tracing::info;

pub mod logging;
pub mod metrics;

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the initialization event
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Log level filter (e.g., "info,cascade_core=debug"), used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub enable_json_logging: bool,
}

fn default_service_name() -> String {
    "cascades".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_filter: default_log_filter(),
            enable_json_logging: false,
        }
    }
}

/// Initialize monitoring system
pub fn init(config: MonitoringConfig) -> anyhow::Result<()> {
    logging::init_logging(&config)?;
    info!(service_name = %config.service_name, "Monitoring initialized");
    Ok(())
}


pub use crate::logging::{init_logging, init_test_tracing, LogExt};
pub use crate::metrics::{CascadeMetrics, MetricRecord};
