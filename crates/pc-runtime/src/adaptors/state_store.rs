//! `dapr.proto.components.v1.StateStore` adaptor.

use std::sync::Arc;

use async_trait::async_trait;
use pc_components::{
    MetadataRequest, StateStore, StateStoreBulkDeleteRequest, StateStoreBulkGetRequest,
    StateStoreBulkSetRequest,
};
use pc_proto::messages::{
    BulkDeleteRequest, BulkDeleteResponse, BulkGetRequest, BulkGetResponse, BulkSetRequest,
    BulkSetResponse, DeleteRequest, DeleteResponse, FeaturesResponse, GetRequest, GetResponse,
    InitRequest, InitResponse, PingResponse, SetRequest, SetResponse,
};
use pc_proto::{decode, encode, CallContext, MethodKind, RpcService, Status, STATE_STORE_SERVICE};
use serde_json::Value;
use tracing::debug;

use super::convert::{
    bulk_item_to_wire, delete_request_from_wire, get_request_from_wire, get_response_to_wire,
    set_request_from_wire,
};
use super::{resolve, to_status, unknown_method};
use crate::providers::ComponentProvider;

pub struct StateStoreAdaptor {
    provider: Arc<dyn ComponentProvider<dyn StateStore>>,
}

impl StateStoreAdaptor {
    pub fn new(provider: Arc<dyn ComponentProvider<dyn StateStore>>) -> Self {
        Self { provider }
    }

    async fn init(&self, request: InitRequest, ctx: &CallContext) -> Result<InitResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        debug!(properties = request.metadata.properties.len(), "Initializing state store");
        store
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

    async fn features(&self, ctx: &CallContext) -> Result<FeaturesResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        let features = store.features(ctx.cancellation()).await.map_err(to_status)?;
        Ok(FeaturesResponse { features })
    }

    async fn ping(&self, ctx: &CallContext) -> Result<PingResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        store.ping(ctx.cancellation()).await.map_err(to_status)?;
        Ok(PingResponse {})
    }

    async fn get(&self, request: GetRequest, ctx: &CallContext) -> Result<GetResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        let response = store
            .get(get_request_from_wire(request), ctx.cancellation())
            .await
            .map_err(to_status)?;
        Ok(get_response_to_wire(response))
    }

    async fn set(&self, request: SetRequest, ctx: &CallContext) -> Result<SetResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        store
            .set(set_request_from_wire(request), ctx.cancellation())
            .await
            .map_err(to_status)?;
        Ok(SetResponse {})
    }

    async fn delete(
        &self,
        request: DeleteRequest,
        ctx: &CallContext,
    ) -> Result<DeleteResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        store
            .delete(delete_request_from_wire(request), ctx.cancellation())
            .await
            .map_err(to_status)?;
        Ok(DeleteResponse {})
    }

    async fn bulk_get(
        &self,
        request: BulkGetRequest,
        ctx: &CallContext,
    ) -> Result<BulkGetResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        let response = store
            .bulk_get(
                StateStoreBulkGetRequest {
                    items: request.items.into_iter().map(get_request_from_wire).collect(),
                    metadata: request.metadata,
                },
                ctx.cancellation(),
            )
            .await
            .map_err(to_status)?;
        Ok(BulkGetResponse {
            items: response.items.into_iter().map(bulk_item_to_wire).collect(),
            got: response.got,
        })
    }

    async fn bulk_set(
        &self,
        request: BulkSetRequest,
        ctx: &CallContext,
    ) -> Result<BulkSetResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        store
            .bulk_set(
                StateStoreBulkSetRequest {
                    items: request.items.into_iter().map(set_request_from_wire).collect(),
                },
                ctx.cancellation(),
            )
            .await
            .map_err(to_status)?;
        Ok(BulkSetResponse {})
    }

    async fn bulk_delete(
        &self,
        request: BulkDeleteRequest,
        ctx: &CallContext,
    ) -> Result<BulkDeleteResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        store
            .bulk_delete(
                StateStoreBulkDeleteRequest {
                    items: request
                        .items
                        .into_iter()
                        .map(delete_request_from_wire)
                        .collect(),
                },
                ctx.cancellation(),
            )
            .await
            .map_err(to_status)?;
        Ok(BulkDeleteResponse {})
    }
}

#[async_trait]
impl RpcService for StateStoreAdaptor {
    fn service_name(&self) -> &'static str {
        STATE_STORE_SERVICE
    }

    fn method_kind(&self, method: &str) -> Option<MethodKind> {
        match method {
            "Init" | "Features" | "Get" | "Set" | "Delete" | "BulkGet" | "BulkSet"
            | "BulkDelete" | "Ping" => Some(MethodKind::Unary),
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
            "Features" => encode(&self.features(&ctx).await?),
            "Get" => encode(&self.get(decode(request)?, &ctx).await?),
            "Set" => encode(&self.set(decode(request)?, &ctx).await?),
            "Delete" => encode(&self.delete(decode(request)?, &ctx).await?),
            "BulkGet" => encode(&self.bulk_get(decode(request)?, &ctx).await?),
            "BulkSet" => encode(&self.bulk_set(decode(request)?, &ctx).await?),
            "BulkDelete" => encode(&self.bulk_delete(decode(request)?, &ctx).await?),
            "Ping" => encode(&self.ping(&ctx).await?),
            other => Err(unknown_method(STATE_STORE_SERVICE, other)),
        }
    }
}
