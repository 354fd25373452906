//! # Pluggable Component Host
//!
//! Serves the in-memory reference components:
//!
//! | Socket          | Component                                  |
//! |-----------------|--------------------------------------------|
//! | `memory-state`  | transactional + queryable state store      |
//! | `memory-pubsub` | pub/sub broker (one instance shared)       |
//! | `echo-binding`  | echo output binding                        |
//!
//! Sockets live in `$DAPR_COMPONENT_SOCKETS_FOLDER`
//! (default `/tmp/dapr-components-sockets`).

use anyhow::{Context, Result};
use pc_memory::{EchoOutputBinding, MemoryPubSub, MemoryStateStore};
use pc_runtime::{HostConfig, PluggableApplication, ServiceOptions};
use pc_telemetry::TelemetryConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = pc_telemetry::init_telemetry(TelemetryConfig::from_env())
        .context("failed to initialize telemetry")?;

    let config = HostConfig::from_env();
    info!(
        folder = %config.socket_folder().display(),
        "Starting pluggable component host"
    );

    let mut app = PluggableApplication::new(config);
    app.register_service(ServiceOptions::new("memory-state"), |builder| {
        builder.register_state_store(|_| Ok(MemoryStateStore::new()))?;
        Ok(())
    })?
    .register_service(ServiceOptions::new("memory-pubsub"), |builder| {
        builder.register_singleton_pub_sub(|_| Ok(MemoryPubSub::new()))?;
        Ok(())
    })?
    .register_service(ServiceOptions::new("echo-binding"), |builder| {
        builder.register_output_binding(|_| Ok(EchoOutputBinding::new()))?;
        Ok(())
    })?;

    app.run().await.context("host stopped with an error")?;
    Ok(())
}
