//! Prometheus metrics for the component host.
//!
//! All metrics follow the naming convention: `pc_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use tracing::{debug, info, warn};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // RPC SURFACE
    // =========================================================================

    /// Completed calls by service, method and final status code
    pub static ref COMPONENT_CALLS: CounterVec = CounterVec::new(
        Opts::new("pc_rpc_calls_total", "Completed component calls"),
        &["service", "method", "code"]
    ).expect("metric creation failed");

    // =========================================================================
    // PROVIDERS
    // =========================================================================

    /// Component instances constructed, by capability
    pub static ref INSTANCES_CONSTRUCTED: CounterVec = CounterVec::new(
        Opts::new("pc_provider_instances_constructed_total", "Component instances constructed"),
        &["capability"]
    ).expect("metric creation failed");

    /// Failed factory invocations, by capability
    pub static ref CONSTRUCTION_FAILURES: CounterVec = CounterVec::new(
        Opts::new("pc_provider_construction_failures_total", "Component factory failures"),
        &["capability"]
    ).expect("metric creation failed");

    // =========================================================================
    // ADAPTORS
    // =========================================================================

    /// Transaction sub-operations dropped for carrying an unrecognised tag
    pub static ref TRANSACT_OPERATIONS_DROPPED: Counter = Counter::new(
        "pc_adaptor_transact_operations_dropped_total",
        "Transaction operations dropped because their kind was not recognised"
    ).expect("metric creation failed");
}

/// Handle proving the metrics were registered.
#[derive(Debug)]
pub struct MetricsHandle {
    _private: (),
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(COMPONENT_CALLS.clone()),
        Box::new(INSTANCES_CONSTRUCTED.clone()),
        Box::new(CONSTRUCTION_FAILURES.clone()),
        Box::new(TRANSACT_OPERATIONS_DROPPED.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle { _private: () })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Log the current counters: a summary at `info`, every sample at `debug`.
pub fn log_snapshot() {
    info!(
        transact_operations_dropped = TRANSACT_OPERATIONS_DROPPED.get(),
        "Metrics snapshot"
    );
    match encode_metrics() {
        Ok(text) => {
            for sample in text.lines().filter(|line| !line.starts_with('#')) {
                debug!(sample, "Metric");
            }
        }
        Err(e) => warn!(error = %e, "Failed to encode metrics"),
    }
}
