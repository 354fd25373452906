//! `dapr.proto.components.v1.TransactionalStateStore` adaptor.
//!
//! Maps the ordered batch of tagged steps onto domain operations and hands
//! them, in order, to a single `transact` call:
//!
//! ```text
//!   [set(a), delete(b), <unrecognised>, set(c)]
//!        │       │            │            │
//!        ▼       ▼         dropped         ▼
//!   [Set(a), Delete(b),               Set(c)]  ──▶ transact()
//! ```
//!
//! Each dropped step is logged at `warn` and counted in
//! `pc_adaptor_transact_operations_dropped_total`.

use std::sync::Arc;

use async_trait::async_trait;
use pc_components::{StateStoreTransactOperation, StateStoreTransactRequest, TransactionalStateStore};
use pc_proto::messages::{
    TransactionalOperationRequest, TransactionalStateOperation, TransactionalStateRequest,
    TransactionalStateResponse,
};
use pc_proto::{
    decode, encode, CallContext, MethodKind, RpcService, Status, TRANSACTIONAL_STATE_STORE_SERVICE,
};
use serde_json::Value;
use tracing::warn;

use super::convert::{delete_request_from_wire, set_request_from_wire};
use super::{resolve, to_status, unknown_method};
use crate::providers::ComponentProvider;

pub struct TransactionalStateStoreAdaptor {
    provider: Arc<dyn ComponentProvider<dyn TransactionalStateStore>>,
}

impl TransactionalStateStoreAdaptor {
    pub fn new(provider: Arc<dyn ComponentProvider<dyn TransactionalStateStore>>) -> Self {
        Self { provider }
    }

    async fn transact(
        &self,
        request: TransactionalStateRequest,
        ctx: &CallContext,
    ) -> Result<TransactionalStateResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        store
            .transact(to_transact_request(request), ctx.cancellation())
            .await
            .map_err(to_status)?;
        Ok(TransactionalStateResponse {})
    }
}

/// Map the wire batch, dropping steps without a recognised kind.
pub fn to_transact_request(request: TransactionalStateRequest) -> StateStoreTransactRequest {
    let operations = request
        .operations
        .into_iter()
        .enumerate()
        .filter_map(|(index, operation)| to_operation(index, operation))
        .collect();

    StateStoreTransactRequest {
        operations,
        metadata: request.metadata,
    }
}

fn to_operation(
    index: usize,
    operation: TransactionalStateOperation,
) -> Option<StateStoreTransactOperation> {
    match operation.request {
        Some(TransactionalOperationRequest::Set(set)) => {
            Some(StateStoreTransactOperation::Set(set_request_from_wire(set)))
        }
        Some(TransactionalOperationRequest::Delete(delete)) => Some(
            StateStoreTransactOperation::Delete(delete_request_from_wire(delete)),
        ),
        None => {
            warn!(index, "Dropping transaction operation with unrecognised kind");
            pc_telemetry::TRANSACT_OPERATIONS_DROPPED.inc();
            None
        }
    }
}

#[async_trait]
impl RpcService for TransactionalStateStoreAdaptor {
    fn service_name(&self) -> &'static str {
        TRANSACTIONAL_STATE_STORE_SERVICE
    }

    fn method_kind(&self, method: &str) -> Option<MethodKind> {
        (method == "Transact").then_some(MethodKind::Unary)
    }

    async fn call_unary(
        &self,
        method: &str,
        request: Value,
        ctx: CallContext,
    ) -> Result<Value, Status> {
        match method {
            "Transact" => encode(&self.transact(decode(request)?, &ctx).await?),
            other => Err(unknown_method(TRANSACTIONAL_STATE_STORE_SERVICE, other)),
        }
    }
}
