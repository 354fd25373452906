//! Host error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::registrar::Capability;

/// Rejected component registration. Fatal at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("{capability} is already registered on socket {}", socket.display())]
    DuplicateCapability {
        capability: Capability,
        socket: PathBuf,
    },
}

/// Invalid host configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("socket folder must not be empty")]
    EmptySocketFolder,

    #[error("invalid socket name {0:?}: must be non-empty and contain no path separators")]
    InvalidSocketName(String),

    #[error("invalid limit: {0}")]
    InvalidLimit(String),
}

/// Failures while building or running the application.
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("socket path {} is used by more than one service", .0.display())]
    DuplicateSocket(PathBuf),

    #[error("service on {} registers no components", .0.display())]
    EmptyService(PathBuf),

    #[error("failed to bind {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
