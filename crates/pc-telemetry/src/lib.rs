//! # pc-telemetry
//!
//! Structured logging and Prometheus metrics for the pluggable component host.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PC_SERVICE_NAME` | `pluggable-host` | Service name in logs |
//! | `PC_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `PC_JSON_LOGS` | `false` (`true` in containers) | JSON log output |
//! | `PC_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//!
//! ## Reading Metrics
//!
//! [`encode_metrics`] renders every registered counter in Prometheus text
//! format. The host logs a snapshot when it shuts down.

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, log_snapshot as log_metrics_snapshot, register_metrics, MetricsHandle, COMPONENT_CALLS, CONSTRUCTION_FAILURES,
    INSTANCES_CONSTRUCTED, TRANSACT_OPERATIONS_DROPPED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    logging::init_logging(&config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
