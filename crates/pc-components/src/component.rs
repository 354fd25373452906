//! # Base Component Contract
//!
//! Operations shared by every component kind: initialization with the
//! configuration passthrough, optional feature advertisement and an optional
//! liveness probe.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ComponentError;
use crate::Metadata;

/// Configuration delivered to [`PluggableComponent::init`].
///
/// `properties` is the component's metadata block from the sidecar
/// configuration. The host threads it through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRequest {
    pub properties: Metadata,
}

impl MetadataRequest {
    /// Look up a single configuration property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// Contract common to state stores, pub/sub brokers and output bindings.
#[async_trait]
pub trait PluggableComponent: Send + Sync + 'static {
    /// Initialize the component with its configuration.
    async fn init(
        &self,
        request: MetadataRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ComponentError>;

    /// Optional features advertised to the sidecar (e.g. `ETAG`, `TRANSACTIONAL`).
    async fn features(&self, _cancel: &CancellationToken) -> Result<Vec<String>, ComponentError> {
        Ok(Vec::new())
    }

    /// Liveness probe. Healthy unless overridden.
    async fn ping(&self, _cancel: &CancellationToken) -> Result<(), ComponentError> {
        Ok(())
    }
}
