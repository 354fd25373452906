//! # State Store Contracts
//!
//! The primary [`StateStore`] capability plus the two secondary capabilities a
//! store type may additionally declare: [`TransactionalStateStore`] and
//! [`QueryableStateStore`].
//!
//! ## Declaring secondary capabilities
//!
//! ```rust,ignore
//! impl StateStore for MyStore {
//!     // ... get / set / delete ...
//!
//!     fn facets() -> StateStoreFacets<Self> {
//!         StateStoreFacets::none().transactional().queryable()
//!     }
//! }
//! ```
//!
//! `transactional()` only compiles when `MyStore: TransactionalStateStore`
//! (likewise `queryable()`), so a declaration can never claim a capability
//! the type does not have.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::component::PluggableComponent;
use crate::error::ComponentError;
use crate::Metadata;

// =============================================================================
// OPTIONS
// =============================================================================

/// Read consistency requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StateStoreConsistency {
    #[default]
    Unspecified,
    Eventual,
    Strong,
}

/// Write concurrency requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StateStoreConcurrency {
    #[default]
    Unspecified,
    FirstWrite,
    LastWrite,
}

/// Options attached to set and delete requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateStoreOptions {
    pub concurrency: StateStoreConcurrency,
    pub consistency: StateStoreConsistency,
}

// =============================================================================
// SINGLE-KEY REQUESTS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreGetRequest {
    pub key: String,
    pub consistency: StateStoreConsistency,
    pub metadata: Metadata,
}

impl StateStoreGetRequest {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreGetResponse {
    pub data: Bytes,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreSetRequest {
    pub key: String,
    pub value: Bytes,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub metadata: Metadata,
    pub options: StateStoreOptions,
}

impl StateStoreSetRequest {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreDeleteRequest {
    pub key: String,
    pub etag: Option<String>,
    pub metadata: Metadata,
    pub options: StateStoreOptions,
}

impl StateStoreDeleteRequest {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// BULK REQUESTS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreBulkGetRequest {
    pub items: Vec<StateStoreGetRequest>,
    pub metadata: Metadata,
}

/// One entry of a bulk get. Missing keys carry empty data and no etag;
/// per-key failures carry `error` instead of failing the whole request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreBulkStateItem {
    pub key: String,
    pub data: Bytes,
    pub etag: Option<String>,
    pub error: Option<String>,
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

impl StateStoreBulkStateItem {
    fn found(key: String, response: StateStoreGetResponse) -> Self {
        Self {
            key,
            data: response.data,
            etag: response.etag,
            error: None,
            content_type: response.content_type,
            metadata: response.metadata,
        }
    }

    fn missing(key: String) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }

    fn failed(key: String, error: &ComponentError) -> Self {
        Self {
            key,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreBulkGetResponse {
    pub items: Vec<StateStoreBulkStateItem>,
    /// Whether the store serviced the request as a bulk operation.
    pub got: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreBulkSetRequest {
    pub items: Vec<StateStoreSetRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreBulkDeleteRequest {
    pub items: Vec<StateStoreDeleteRequest>,
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// One step of a multi-key transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateStoreTransactOperation {
    Set(StateStoreSetRequest),
    Delete(StateStoreDeleteRequest),
}

impl StateStoreTransactOperation {
    /// Key the operation targets.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set(request) => &request.key,
            Self::Delete(request) => &request.key,
        }
    }
}

/// Ordered operations to apply atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreTransactRequest {
    pub operations: Vec<StateStoreTransactOperation>,
    pub metadata: Metadata,
}

// =============================================================================
// QUERIES
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StateStoreQuerySortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreQuerySorting {
    pub key: String,
    pub order: StateStoreQuerySortOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreQueryPagination {
    pub limit: u64,
    pub token: Option<String>,
}

/// Structured query. Filter values are opaque JSON interpreted by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateStoreQuery {
    pub filter: HashMap<String, serde_json::Value>,
    pub sort: Vec<StateStoreQuerySorting>,
    pub pagination: Option<StateStoreQueryPagination>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateStoreQueryRequest {
    pub query: StateStoreQuery,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreQueryItem {
    pub key: String,
    pub data: Bytes,
    pub etag: Option<String>,
    pub error: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreQueryResponse {
    pub items: Vec<StateStoreQueryItem>,
    /// Continuation token for the next page, if any.
    pub token: Option<String>,
    pub metadata: Metadata,
}

// =============================================================================
// CAPABILITY TRAITS
// =============================================================================

/// Primary state store capability.
#[async_trait]
pub trait StateStore: PluggableComponent {
    /// Read a key. `Ok(None)` means the key does not exist.
    async fn get(
        &self,
        request: StateStoreGetRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<StateStoreGetResponse>, ComponentError>;

    async fn set(
        &self,
        request: StateStoreSetRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ComponentError>;

    async fn delete(
        &self,
        request: StateStoreDeleteRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ComponentError>;

    /// Read many keys. The default issues one [`StateStore::get`] per key and
    /// reports per-key failures inline.
    async fn bulk_get(
        &self,
        request: StateStoreBulkGetRequest,
        cancel: &CancellationToken,
    ) -> Result<StateStoreBulkGetResponse, ComponentError> {
        let mut items = Vec::with_capacity(request.items.len());
        for item in request.items {
            let key = item.key.clone();
            let entry = match self.get(item, cancel).await {
                Ok(Some(response)) => StateStoreBulkStateItem::found(key, response),
                Ok(None) => StateStoreBulkStateItem::missing(key),
                Err(e) => StateStoreBulkStateItem::failed(key, &e),
            };
            items.push(entry);
        }
        Ok(StateStoreBulkGetResponse { items, got: true })
    }

    /// Write many keys. The default stops at the first failing write.
    async fn bulk_set(
        &self,
        request: StateStoreBulkSetRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ComponentError> {
        for item in request.items {
            self.set(item, cancel).await?;
        }
        Ok(())
    }

    /// Delete many keys. The default stops at the first failing delete.
    async fn bulk_delete(
        &self,
        request: StateStoreBulkDeleteRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ComponentError> {
        for item in request.items {
            self.delete(item, cancel).await?;
        }
        Ok(())
    }

    /// Secondary capabilities of this store type. Read once at registration.
    fn facets() -> StateStoreFacets<Self>
    where
        Self: Sized,
    {
        StateStoreFacets::none()
    }
}

/// Multi-key atomic writes.
#[async_trait]
pub trait TransactionalStateStore: Send + Sync + 'static {
    /// Apply every operation, in order, as one unit.
    async fn transact(
        &self,
        request: StateStoreTransactRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ComponentError>;
}

/// Structured queries over stored values.
#[async_trait]
pub trait QueryableStateStore: Send + Sync + 'static {
    async fn query(
        &self,
        request: StateStoreQueryRequest,
        cancel: &CancellationToken,
    ) -> Result<StateStoreQueryResponse, ComponentError>;
}

// =============================================================================
// STATIC CAPABILITY DECLARATION
// =============================================================================

/// Converts a shared store into its transaction capability view.
pub type TransactionalView<S> = fn(Arc<S>) -> Arc<dyn TransactionalStateStore>;

/// Converts a shared store into its query capability view.
pub type QueryableView<S> = fn(Arc<S>) -> Arc<dyn QueryableStateStore>;

/// Static declaration of the secondary capabilities a store type exposes.
///
/// Each entry is a conversion from the concrete store to the capability
/// trait object, so the host can serve several adaptors from one cached
/// instance.
pub struct StateStoreFacets<S> {
    transactional: Option<TransactionalView<S>>,
    queryable: Option<QueryableView<S>>,
}

impl<S> StateStoreFacets<S> {
    /// No secondary capabilities.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            transactional: None,
            queryable: None,
        }
    }

    #[must_use]
    pub fn transactional_view(&self) -> Option<TransactionalView<S>> {
        self.transactional
    }

    #[must_use]
    pub fn queryable_view(&self) -> Option<QueryableView<S>> {
        self.queryable
    }

    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.transactional.is_some()
    }

    #[must_use]
    pub fn is_queryable(&self) -> bool {
        self.queryable.is_some()
    }
}

impl<S: TransactionalStateStore> StateStoreFacets<S> {
    /// Declare multi-key transaction support.
    #[must_use]
    pub fn transactional(mut self) -> Self {
        self.transactional = Some(as_transactional::<S>);
        self
    }
}

impl<S: QueryableStateStore> StateStoreFacets<S> {
    /// Declare query support.
    #[must_use]
    pub fn queryable(mut self) -> Self {
        self.queryable = Some(as_queryable::<S>);
        self
    }
}

impl<S> Clone for StateStoreFacets<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for StateStoreFacets<S> {}

impl<S> Default for StateStoreFacets<S> {
    fn default() -> Self {
        Self::none()
    }
}

impl<S> std::fmt::Debug for StateStoreFacets<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStoreFacets")
            .field("transactional", &self.is_transactional())
            .field("queryable", &self.is_queryable())
            .finish()
    }
}

fn as_transactional<S: TransactionalStateStore>(store: Arc<S>) -> Arc<dyn TransactionalStateStore> {
    store
}

fn as_queryable<S: QueryableStateStore>(store: Arc<S>) -> Arc<dyn QueryableStateStore> {
    store
}
