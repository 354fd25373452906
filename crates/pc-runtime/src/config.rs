//! Host configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming the socket folder (shared with the sidecar).
pub const SOCKET_FOLDER_ENV: &str = "DAPR_COMPONENT_SOCKETS_FOLDER";

/// Default socket folder.
pub const DEFAULT_SOCKET_FOLDER: &str = "/tmp/dapr-components-sockets";

/// Default socket file extension.
pub const DEFAULT_SOCKET_EXTENSION: &str = ".sock";

/// Runtime configuration for the component host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Folder holding one socket file per service
    pub socket_folder: PathBuf,
    /// Appended to each service's socket name
    pub socket_extension: String,
    /// Largest accepted frame, in bytes
    pub max_frame_size: usize,
    /// Concurrent calls allowed per connection
    pub max_in_flight_calls: usize,
    /// Buffer size of each streaming call's channels
    pub stream_channel_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            socket_folder: PathBuf::from(DEFAULT_SOCKET_FOLDER),
            socket_extension: DEFAULT_SOCKET_EXTENSION.to_string(),
            max_frame_size: 4 * 1024 * 1024,
            max_in_flight_calls: 1024,
            stream_channel_capacity: 64,
        }
    }
}

impl HostConfig {
    /// Load from environment variables.
    ///
    /// - `DAPR_COMPONENT_SOCKETS_FOLDER`: socket folder
    /// - `PC_SOCKET_EXTENSION`: socket file extension
    /// - `PC_MAX_FRAME_SIZE`, `PC_MAX_IN_FLIGHT_CALLS`, `PC_STREAM_CHANNEL_CAPACITY`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup. Unparseable numbers keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(folder) = lookup(SOCKET_FOLDER_ENV) {
            config.socket_folder = PathBuf::from(folder);
        }
        if let Some(extension) = lookup("PC_SOCKET_EXTENSION") {
            config.socket_extension = extension;
        }
        if let Some(size) = lookup("PC_MAX_FRAME_SIZE").and_then(|v| v.parse().ok()) {
            config.max_frame_size = size;
        }
        if let Some(calls) = lookup("PC_MAX_IN_FLIGHT_CALLS").and_then(|v| v.parse().ok()) {
            config.max_in_flight_calls = calls;
        }
        if let Some(capacity) = lookup("PC_STREAM_CHANNEL_CAPACITY").and_then(|v| v.parse().ok()) {
            config.stream_channel_capacity = capacity;
        }

        config
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_folder.as_os_str().is_empty() {
            return Err(ConfigError::EmptySocketFolder);
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_frame_size cannot be 0".into(),
            ));
        }
        if self.max_in_flight_calls == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_in_flight_calls cannot be 0".into(),
            ));
        }
        if self.stream_channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "stream_channel_capacity cannot be 0".into(),
            ));
        }
        Ok(())
    }

    /// Socket file for the service called `socket_name`.
    pub fn socket_path(&self, socket_name: &str) -> Result<PathBuf, ConfigError> {
        validate_socket_name(socket_name)?;
        Ok(self
            .socket_folder
            .join(format!("{socket_name}{}", self.socket_extension)))
    }

    #[must_use]
    pub fn socket_folder(&self) -> &Path {
        &self.socket_folder
    }
}

fn validate_socket_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ConfigError::InvalidSocketName(name.to_string()));
    }
    Ok(())
}
