//! `dapr.proto.components.v1.OutputBinding` adaptor.

use std::sync::Arc;

use async_trait::async_trait;
use pc_components::{MetadataRequest, OutputBinding, OutputBindingInvokeRequest};
use pc_proto::messages::{
    InitRequest, InitResponse, InvokeRequest, InvokeResponse, ListOperationsResponse,
    PingResponse,
};
use pc_proto::{decode, encode, CallContext, MethodKind, RpcService, Status, OUTPUT_BINDING_SERVICE};
use serde_json::Value;

use super::{resolve, to_status, unknown_method};
use crate::providers::ComponentProvider;

pub struct OutputBindingAdaptor {
    provider: Arc<dyn ComponentProvider<dyn OutputBinding>>,
}

impl OutputBindingAdaptor {
    pub fn new(provider: Arc<dyn ComponentProvider<dyn OutputBinding>>) -> Self {
        Self { provider }
    }

    async fn init(&self, request: InitRequest, ctx: &CallContext) -> Result<InitResponse, Status> {
        let binding = resolve(self.provider.as_ref(), ctx).await?;
        binding
            .init(
                MetadataRequest {
                    properties: request.metadata.properties,
                },
                ctx.cancellation(),
            )
            .await
            .map_err(to_status)?;
        Ok(InitResponse {})
    }

    async fn invoke(&self, request: InvokeRequest, ctx: &CallContext) -> Result<InvokeResponse, Status> {
        let binding = resolve(self.provider.as_ref(), ctx).await?;
        let response = binding
            .invoke(
                OutputBindingInvokeRequest {
                    operation: request.operation,
                    data: request.data,
                    metadata: request.metadata,
                },
                ctx.cancellation(),
            )
            .await
            .map_err(to_status)?;
        Ok(InvokeResponse {
            data: response.data,
            metadata: response.metadata,
            content_type: response.content_type.unwrap_or_default(),
        })
    }

    async fn list_operations(&self, ctx: &CallContext) -> Result<ListOperationsResponse, Status> {
        let binding = resolve(self.provider.as_ref(), ctx).await?;
        let operations = binding
            .list_operations(ctx.cancellation())
            .await
            .map_err(to_status)?;
        Ok(ListOperationsResponse { operations })
    }

    async fn ping(&self, ctx: &CallContext) -> Result<PingResponse, Status> {
        let binding = resolve(self.provider.as_ref(), ctx).await?;
        binding.ping(ctx.cancellation()).await.map_err(to_status)?;
        Ok(PingResponse {})
    }
}

#[async_trait]
impl RpcService for OutputBindingAdaptor {
    fn service_name(&self) -> &'static str {
        OUTPUT_BINDING_SERVICE
    }

    fn method_kind(&self, method: &str) -> Option<MethodKind> {
        match method {
            "Init" | "Invoke" | "ListOperations" | "Ping" => Some(MethodKind::Unary),
            _ => None,
        }
    }

    async fn call_unary(
        &self,
        method: &str,
        request: Value,
        ctx: CallContext,
    ) -> Result<Value, Status> {
        match method {
            "Init" => encode(&self.init(decode(request)?, &ctx).await?),
            "Invoke" => encode(&self.invoke(decode(request)?, &ctx).await?),
            "ListOperations" => encode(&self.list_operations(&ctx).await?),
            "Ping" => encode(&self.ping(&ctx).await?),
            other => Err(unknown_method(OUTPUT_BINDING_SERVICE, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptors::test_support::{ctx, ctx_for, multiplexed};
    use crate::providers::{component_factory, DelegatedProvider};
    use bytes::Bytes;
    use pc_components::{ComponentError, OutputBindingInvokeResponse, PluggableComponent};
    use pc_proto::Code;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    struct Upper {
        instance: String,
    }

    #[async_trait]
    impl PluggableComponent for Upper {
        async fn init(
            &self,
            _request: MetadataRequest,
            _cancel: &CancellationToken,
        ) -> Result<(), ComponentError> {
            Ok(())
        }

        async fn ping(&self, _cancel: &CancellationToken) -> Result<(), ComponentError> {
            Err(ComponentError::failed("unhealthy"))
        }
    }

    #[async_trait]
    impl OutputBinding for Upper {
        async fn invoke(
            &self,
            request: OutputBindingInvokeRequest,
            _cancel: &CancellationToken,
        ) -> Result<OutputBindingInvokeResponse, ComponentError> {
            if request.operation != "upper" {
                return Err(ComponentError::Unsupported(request.operation));
            }
            let mut metadata = request.metadata;
            metadata.insert("instance".to_string(), self.instance.clone());
            Ok(OutputBindingInvokeResponse {
                data: Bytes::from(String::from_utf8_lossy(&request.data).to_uppercase()),
                content_type: Some("text/plain".to_string()),
                metadata,
            })
        }

        async fn list_operations(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Vec<String>, ComponentError> {
            Ok(vec!["upper".to_string()])
        }
    }

    fn as_binding(binding: Arc<Upper>) -> Arc<dyn OutputBinding> {
        binding
    }

    fn adaptor() -> OutputBindingAdaptor {
        let wide = multiplexed(component_factory(|ctx| {
            Ok(Upper {
                instance: ctx.instance_id().unwrap_or("default").to_string(),
            })
        }));
        OutputBindingAdaptor::new(Arc::new(DelegatedProvider::new(wide, as_binding)))
    }

    #[tokio::test]
    async fn test_invoke_round_trip() {
        let response: InvokeResponse = decode(
            adaptor()
                .call_unary(
                    "Invoke",
                    json!({ "operation": "upper", "data": "6869" }),
                    ctx_for("b1"),
                )
                .await
                .unwrap(),
        )
        .unwrap();

        assert_eq!(response.data, Bytes::from("HI"));
        assert_eq!(response.content_type, "text/plain");
        assert_eq!(response.metadata.get("instance").map(String::as_str), Some("b1"));
    }

    #[tokio::test]
    async fn test_unsupported_operation_and_failed_ping() {
        let adaptor = adaptor();
        let err = adaptor
            .call_unary("Invoke", json!({ "operation": "lower" }), ctx())
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::Unimplemented);

        let err = adaptor.call_unary("Ping", json!({}), ctx()).await.unwrap_err();
        assert_eq!(err.code, Code::Internal);

        let operations: ListOperationsResponse = decode(
            adaptor
                .call_unary("ListOperations", json!({}), ctx())
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(operations.operations, vec!["upper".to_string()]);
    }
}
