//! # Pluggable Application
//!
//! Hosts one or more services, each bound to its own socket.
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Create the socket folder and remove stale socket files
//! 3. Bind every listener
//! 4. Materialize providers and adaptors per socket
//! 5. Spawn one accept loop per socket
//! 6. Relax socket permissions (once per socket)
//!
//! A failure at any step leaves nothing serving: listeners already bound are
//! closed and their socket files removed.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::builder::ServiceBuilder;
use crate::config::HostConfig;
use crate::context::{ProviderEnvironment, ServiceContext};
use crate::error::{HostError, RegistrationError};
use crate::registrar::Registrar;
use crate::server::{serve, ConnectionLimits, ServiceRouter};
use crate::socket::SocketLifecycle;

/// Per-service options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Socket file name without folder or extension.
    pub socket_name: String,
}

impl ServiceOptions {
    #[must_use]
    pub fn new(socket_name: impl Into<String>) -> Self {
        Self {
            socket_name: socket_name.into(),
        }
    }
}

/// Collects services, then binds and serves them.
#[derive(Debug)]
pub struct PluggableApplication {
    config: HostConfig,
    services: ServiceContext,
    builders: Vec<ServiceBuilder>,
}

impl PluggableApplication {
    #[must_use]
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            services: ServiceContext::new(),
            builders: Vec::new(),
        }
    }

    /// Shared dependencies handed to every component factory.
    #[must_use]
    pub fn with_services(mut self, services: ServiceContext) -> Self {
        self.services = services;
        self
    }

    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Add a service on its own socket.
    ///
    /// ```rust,ignore
    /// app.register_service(ServiceOptions::new("memory-state"), |builder| {
    ///     builder.register_state_store(|_| Ok(MemoryStateStore::new()))?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn register_service<F>(
        &mut self,
        options: ServiceOptions,
        configure: F,
    ) -> Result<&mut Self, HostError>
    where
        F: FnOnce(&mut ServiceBuilder) -> Result<(), RegistrationError>,
    {
        let path = self.config.socket_path(&options.socket_name)?;
        if self.builders.iter().any(|builder| builder.socket() == path) {
            return Err(HostError::DuplicateSocket(path));
        }

        let mut builder = ServiceBuilder::new(
            Registrar::new(path.clone()),
            self.config.stream_channel_capacity,
        );
        configure(&mut builder)?;
        if builder.registrations().is_empty() {
            return Err(HostError::EmptyService(path));
        }

        self.builders.push(builder);
        Ok(self)
    }

    /// Socket files of the registered services, in registration order.
    #[must_use]
    pub fn socket_paths(&self) -> Vec<PathBuf> {
        self.builders
            .iter()
            .map(|builder| builder.socket().to_path_buf())
            .collect()
    }

    /// Bind every socket and start serving.
    pub async fn start(self) -> Result<RunningApplication, HostError> {
        self.config.validate()?;
        if self.builders.is_empty() {
            warn!("[Host] No services registered");
        }
        tokio::fs::create_dir_all(self.config.socket_folder()).await?;

        let services = Arc::new(self.services);
        let limits = ConnectionLimits::from(&self.config);
        let shutdown = CancellationToken::new();
        let mut bound = Vec::with_capacity(self.builders.len());
        for builder in self.builders {
            let registrar = builder.into_registrar();
            let path = registrar.socket().to_path_buf();
            match bind(&path).await {
                Ok(listener) => bound.push((registrar, path, listener)),
                Err(e) => {
                    release_bound(bound).await;
                    return Err(e);
                }
            }
        }

        let mut sockets = Vec::with_capacity(bound.len());
        let mut tasks = Vec::with_capacity(bound.len());
        for (registrar, path, listener) in bound {
            let env = ProviderEnvironment::new(Arc::clone(&services), path.clone());
            let router = Arc::new(ServiceRouter::new(registrar.materialize(&env)));
            info!(
                "[Host] Serving {:?} on {}",
                router.service_names(),
                path.display()
            );
            tasks.push(tokio::spawn(serve(
                listener,
                router,
                limits,
                shutdown.child_token(),
            )));
            sockets.push(Arc::new(SocketLifecycle::new(path)));
        }

        let running = RunningApplication {
            sockets,
            tasks,
            shutdown,
        };
        let mut relaxed = Ok(());
        for socket in &running.sockets {
            if let Err(e) = socket.relax_permissions().await {
                relaxed = Err(e);
                break;
            }
        }
        if let Err(e) = relaxed {
            running.shutdown().await;
            return Err(HostError::Io(e));
        }
        Ok(running)
    }

    /// Start, then serve until Ctrl+C.
    pub async fn run(self) -> Result<(), HostError> {
        let running = self.start().await?;
        info!("[Host] Running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c().await?;
        running.shutdown().await;
        Ok(())
    }
}

async fn bind(path: &std::path::Path) -> Result<UnixListener, HostError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("[Host] Removed stale socket {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(HostError::Io(e)),
    }
    UnixListener::bind(path).map_err(|source| HostError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

/// Close listeners bound by a start that failed part way and remove their files.
async fn release_bound(bound: Vec<(Registrar, PathBuf, UnixListener)>) {
    for (_, path, listener) in bound {
        drop(listener);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(socket = %path.display(), error = %e, "[Host] Failed to remove socket");
        }
    }
}

/// Handle to a started application.
#[derive(Debug)]
pub struct RunningApplication {
    sockets: Vec<Arc<SocketLifecycle>>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl RunningApplication {
    #[must_use]
    pub fn socket_paths(&self) -> Vec<PathBuf> {
        self.sockets
            .iter()
            .map(|socket| socket.path().to_path_buf())
            .collect()
    }

    #[must_use]
    pub fn sockets(&self) -> &[Arc<SocketLifecycle>] {
        &self.sockets
    }

    /// Token cancelled on shutdown; every connection and call hangs off it.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Registered counters in Prometheus text format.
    pub fn metrics(&self) -> Result<String, pc_telemetry::TelemetryError> {
        pc_telemetry::encode_metrics()
    }

    /// Stop accepting, cancel in-flight calls and remove the socket files.
    pub async fn shutdown(self) {
        info!("[Host] Shutting down");
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "[Host] Server task failed");
            }
        }
        for socket in &self.sockets {
            if let Err(e) = tokio::fs::remove_file(socket.path()).await {
                warn!(socket = %socket.path().display(), error = %e, "[Host] Failed to remove socket");
            }
        }
        pc_telemetry::log_metrics_snapshot();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;

    fn config(folder: &std::path::Path) -> HostConfig {
        HostConfig {
            socket_folder: folder.to_path_buf(),
            ..HostConfig::default()
        }
    }

    #[test]
    fn test_empty_service_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = PluggableApplication::new(config(dir.path()));

        let err = app
            .register_service(ServiceOptions::new("empty"), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, HostError::EmptyService(_)));
    }

    #[test]
    fn test_invalid_socket_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = PluggableApplication::new(config(dir.path()));

        let err = app
            .register_service(ServiceOptions::new("../escape"), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }

    #[tokio::test]
    async fn test_start_with_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let app = PluggableApplication::new(HostConfig {
            max_frame_size: 0,
            ..config(dir.path())
        });
        assert!(matches!(app.start().await, Err(HostError::Config(_))));
    }
}
