//! In-memory state store with etag concurrency.
//!
//! Every write stamps the entry with a fresh etag: the decimal form of a
//! store-wide version counter. Conditional writes compare against it.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use pc_components::{
    CancellationToken, ComponentError, MetadataRequest, PluggableComponent, QueryableStateStore,
    StateStore, StateStoreConcurrency, StateStoreDeleteRequest, StateStoreFacets,
    StateStoreGetRequest, StateStoreGetResponse, StateStoreQueryItem, StateStoreQueryRequest,
    StateStoreQueryResponse, StateStoreSetRequest, StateStoreTransactOperation,
    StateStoreTransactRequest, TransactionalStateStore,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::query::{compare_by, paginate, Filter};

/// Features advertised through `Features`.
pub const STATE_FEATURES: [&str; 3] = ["ETAG", "TRANSACTIONAL", "QUERY_API"];

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    etag: u64,
    content_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Table {
    entries: HashMap<String, Entry>,
    version: u64,
}

impl Table {
    fn set(&mut self, request: StateStoreSetRequest) -> Result<(), ComponentError> {
        check_etag(
            self.entries.get(&request.key),
            request.etag.as_deref(),
            request.options.concurrency,
        )?;
        self.version += 1;
        self.entries.insert(
            request.key,
            Entry {
                value: request.value,
                etag: self.version,
                content_type: request.content_type,
            },
        );
        Ok(())
    }

    fn delete(&mut self, request: StateStoreDeleteRequest) -> Result<(), ComponentError> {
        check_etag(
            self.entries.get(&request.key),
            request.etag.as_deref(),
            request.options.concurrency,
        )?;
        self.entries.remove(&request.key);
        Ok(())
    }
}

/// Conditional write check.
///
/// With an etag the entry must exist and carry it. Without one, first-write
/// concurrency only allows creating a key.
fn check_etag(
    current: Option<&Entry>,
    etag: Option<&str>,
    concurrency: StateStoreConcurrency,
) -> Result<(), ComponentError> {
    match etag {
        Some(etag) => {
            let expected: u64 = etag
                .parse()
                .map_err(|_| ComponentError::ETagInvalid(etag.to_string()))?;
            match current {
                Some(entry) if entry.etag == expected => Ok(()),
                Some(entry) => Err(ComponentError::ETagMismatch(format!(
                    "expected {expected}, found {}",
                    entry.etag
                ))),
                None => Err(ComponentError::ETagMismatch(format!(
                    "expected {expected}, key does not exist"
                ))),
            }
        }
        None if concurrency == StateStoreConcurrency::FirstWrite && current.is_some() => Err(
            ComponentError::ETagMismatch("first-write requires the current etag".to_string()),
        ),
        None => Ok(()),
    }
}

/// Process-local state store. Transactional and queryable.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    table: RwLock<Table>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PluggableComponent for MemoryStateStore {
    async fn init(
        &self,
        request: MetadataRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), ComponentError> {
        info!(
            properties = request.properties.len(),
            "[MemoryState] Initialized"
        );
        Ok(())
    }

    async fn features(&self, _cancel: &CancellationToken) -> Result<Vec<String>, ComponentError> {
        Ok(STATE_FEATURES.iter().map(ToString::to_string).collect())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(
        &self,
        request: StateStoreGetRequest,
        _cancel: &CancellationToken,
    ) -> Result<Option<StateStoreGetResponse>, ComponentError> {
        let table = self.table.read();
        Ok(table.entries.get(&request.key).map(|entry| StateStoreGetResponse {
            data: entry.value.clone(),
            etag: Some(entry.etag.to_string()),
            content_type: entry.content_type.clone(),
            metadata: Default::default(),
        }))
    }

    async fn set(
        &self,
        request: StateStoreSetRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), ComponentError> {
        self.table.write().set(request)
    }

    async fn delete(
        &self,
        request: StateStoreDeleteRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), ComponentError> {
        self.table.write().delete(request)
    }

    fn facets() -> StateStoreFacets<Self> {
        StateStoreFacets::none().transactional().queryable()
    }
}

#[async_trait]
impl TransactionalStateStore for MemoryStateStore {
    /// All or nothing: operations run against a copy that replaces the
    /// table only if every one succeeds.
    async fn transact(
        &self,
        request: StateStoreTransactRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ComponentError> {
        if cancel.is_cancelled() {
            return Err(ComponentError::Cancelled);
        }
        let mut table = self.table.write();
        let mut staged = table.clone();
        let count = request.operations.len();
        for operation in request.operations {
            match operation {
                StateStoreTransactOperation::Set(set) => staged.set(set)?,
                StateStoreTransactOperation::Delete(delete) => staged.delete(delete)?,
            }
        }
        *table = staged;
        debug!(operations = count, "[MemoryState] Transaction committed");
        Ok(())
    }
}

#[async_trait]
impl QueryableStateStore for MemoryStateStore {
    async fn query(
        &self,
        request: StateStoreQueryRequest,
        _cancel: &CancellationToken,
    ) -> Result<StateStoreQueryResponse, ComponentError> {
        let filter = Filter::parse(&request.query.filter)?;

        let mut rows: Vec<(String, Entry, Option<Value>)> = {
            let table = self.table.read();
            table
                .entries
                .iter()
                .map(|(key, entry)| {
                    let json = serde_json::from_slice(&entry.value).ok();
                    (key.clone(), entry.clone(), json)
                })
                .filter(|(_, _, json)| filter.matches(json.as_ref()))
                .collect()
        };

        rows.sort_by(|a, b| {
            compare_by(&request.query.sort, a.2.as_ref(), b.2.as_ref()).then_with(|| a.0.cmp(&b.0))
        });
        let (rows, token) = paginate(rows, request.query.pagination.as_ref())?;

        Ok(StateStoreQueryResponse {
            items: rows
                .into_iter()
                .map(|(key, entry, _)| StateStoreQueryItem {
                    key,
                    data: entry.value,
                    etag: Some(entry.etag.to_string()),
                    error: None,
                    content_type: entry.content_type,
                })
                .collect(),
            token,
            metadata: Default::default(),
        })
    }
}
