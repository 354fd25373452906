//! `dapr.proto.components.v1.QueriableStateStore` adaptor.

use std::sync::Arc;

use async_trait::async_trait;
use pc_components::{
    QueryableStateStore, StateStoreQuery, StateStoreQueryItem, StateStoreQueryPagination,
    StateStoreQueryRequest, StateStoreQuerySortOrder, StateStoreQuerySorting,
};
use pc_proto::messages::{Query, QueryItem, QueryRequest, QueryResponse, SortOrder};
use pc_proto::{
    decode, encode, CallContext, MethodKind, RpcService, Status, QUERIABLE_STATE_STORE_SERVICE,
};
use serde_json::Value;

use super::convert::{etag_to_wire, non_empty};
use super::{resolve, to_status, unknown_method};
use crate::providers::ComponentProvider;

pub struct QueryableStateStoreAdaptor {
    provider: Arc<dyn ComponentProvider<dyn QueryableStateStore>>,
}

impl QueryableStateStoreAdaptor {
    pub fn new(provider: Arc<dyn ComponentProvider<dyn QueryableStateStore>>) -> Self {
        Self { provider }
    }

    async fn query(&self, request: QueryRequest, ctx: &CallContext) -> Result<QueryResponse, Status> {
        let store = resolve(self.provider.as_ref(), ctx).await?;
        let response = store
            .query(
                StateStoreQueryRequest {
                    query: request.query.map(query_from_wire).unwrap_or_default(),
                    metadata: request.metadata,
                },
                ctx.cancellation(),
            )
            .await
            .map_err(to_status)?;

        Ok(QueryResponse {
            items: response.items.into_iter().map(item_to_wire).collect(),
            token: response.token.unwrap_or_default(),
            metadata: response.metadata,
        })
    }
}

fn query_from_wire(query: Query) -> StateStoreQuery {
    StateStoreQuery {
        filter: query.filter,
        sort: query
            .sort
            .into_iter()
            .map(|sorting| StateStoreQuerySorting {
                key: sorting.key,
                order: match sorting.order {
                    SortOrder::Ascending => StateStoreQuerySortOrder::Ascending,
                    SortOrder::Descending => StateStoreQuerySortOrder::Descending,
                },
            })
            .collect(),
        pagination: query.pagination.map(|page| StateStoreQueryPagination {
            limit: page.limit,
            token: non_empty(page.token),
        }),
    }
}

fn item_to_wire(item: StateStoreQueryItem) -> QueryItem {
    QueryItem {
        key: item.key,
        data: item.data,
        etag: etag_to_wire(item.etag),
        error: item.error.unwrap_or_default(),
        content_type: item.content_type.unwrap_or_default(),
    }
}

#[async_trait]
impl RpcService for QueryableStateStoreAdaptor {
    fn service_name(&self) -> &'static str {
        QUERIABLE_STATE_STORE_SERVICE
    }

    fn method_kind(&self, method: &str) -> Option<MethodKind> {
        (method == "Query").then_some(MethodKind::Unary)
    }

    async fn call_unary(
        &self,
        method: &str,
        request: Value,
        ctx: CallContext,
    ) -> Result<Value, Status> {
        match method {
            "Query" => encode(&self.query(decode(request)?, &ctx).await?),
            other => Err(unknown_method(QUERIABLE_STATE_STORE_SERVICE, other)),
        }
    }
}
