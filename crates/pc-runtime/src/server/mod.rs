//! # Socket Server
//!
//! Accepts connections on one component socket and routes each call to the
//! adaptor serving its service name.
//!
//! ```text
//!   UnixListener ──accept──▶ connection task ──frames──▶ ServiceRouter
//!                                   │                       │
//!                                   └── one task per call ◀─┘
//! ```

mod connection;

use std::collections::HashMap;
use std::sync::Arc;

use pc_proto::RpcService;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HostConfig;

/// Limits applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_frame_size: usize,
    pub max_in_flight_calls: usize,
    pub stream_channel_capacity: usize,
}

impl From<&HostConfig> for ConnectionLimits {
    fn from(config: &HostConfig) -> Self {
        Self {
            max_frame_size: config.max_frame_size,
            max_in_flight_calls: config.max_in_flight_calls,
            stream_channel_capacity: config.stream_channel_capacity,
        }
    }
}

/// Service name to adaptor.
#[derive(Default)]
pub struct ServiceRouter {
    services: HashMap<&'static str, Arc<dyn RpcService>>,
}

impl ServiceRouter {
    #[must_use]
    pub fn new(services: Vec<Arc<dyn RpcService>>) -> Self {
        let services = services
            .into_iter()
            .map(|service| (service.service_name(), service))
            .collect();
        Self { services }
    }

    #[must_use]
    pub fn get(&self, service: &str) -> Option<&Arc<dyn RpcService>> {
        self.services.get(service)
    }

    /// Served service names, sorted.
    #[must_use]
    pub fn service_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Accept connections until `shutdown` fires.
pub async fn serve(
    listener: UnixListener,
    router: Arc<ServiceRouter>,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
) {
    info!(services = ?router.service_names(), "Accepting component connections");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Socket server shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("Connection accepted");
                    tokio::spawn(connection::handle_connection(
                        stream,
                        Arc::clone(&router),
                        limits,
                        shutdown.child_token(),
                    ));
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },
        }
    }
}
