//! Output binding contract.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::component::PluggableComponent;
use crate::error::ComponentError;
use crate::Metadata;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBindingInvokeRequest {
    pub operation: String,
    pub data: Bytes,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBindingInvokeResponse {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

/// Primary output binding capability.
#[async_trait]
pub trait OutputBinding: PluggableComponent {
    async fn invoke(
        &self,
        request: OutputBindingInvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<OutputBindingInvokeResponse, ComponentError>;

    /// Operation names accepted by [`OutputBinding::invoke`].
    async fn list_operations(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ComponentError>;
}
