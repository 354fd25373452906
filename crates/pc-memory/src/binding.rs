//! Echo output binding.

use async_trait::async_trait;
use pc_components::{
    CancellationToken, ComponentError, MetadataRequest, OutputBinding,
    OutputBindingInvokeRequest, OutputBindingInvokeResponse, PluggableComponent,
};
use tracing::debug;

pub const ECHO_OPERATION: &str = "echo";

/// Returns each invocation's payload and metadata unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoOutputBinding;

impl EchoOutputBinding {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PluggableComponent for EchoOutputBinding {
    async fn init(
        &self,
        _request: MetadataRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), ComponentError> {
        Ok(())
    }
}

#[async_trait]
impl OutputBinding for EchoOutputBinding {
    async fn invoke(
        &self,
        request: OutputBindingInvokeRequest,
        _cancel: &CancellationToken,
    ) -> Result<OutputBindingInvokeResponse, ComponentError> {
        if request.operation != ECHO_OPERATION {
            return Err(ComponentError::Unsupported(format!(
                "operation {:?}",
                request.operation
            )));
        }
        debug!(bytes = request.data.len(), "[EchoBinding] Echoing");
        let content_type = request.metadata.get("content-type").cloned();
        Ok(OutputBindingInvokeResponse {
            data: request.data,
            content_type,
            metadata: request.metadata,
        })
    }

    async fn list_operations(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<String>, ComponentError> {
        Ok(vec![ECHO_OPERATION.to_string()])
    }
}
