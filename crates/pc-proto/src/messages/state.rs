//! `StateStore`, `TransactionalStateStore` and `QueriableStateStore`
//! service messages.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

use super::hex_bytes;

// =============================================================================
// OPTIONS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Etag {
    pub value: String,
}

impl Etag {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateConsistency {
    #[default]
    Unspecified,
    Eventual,
    Strong,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateConcurrency {
    #[default]
    Unspecified,
    FirstWrite,
    LastWrite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateOptions {
    pub concurrency: StateConcurrency,
    pub consistency: StateConsistency,
}

// =============================================================================
// SINGLE-KEY OPERATIONS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetRequest {
    pub key: String,
    pub metadata: HashMap<String, String>,
    pub consistency: StateConsistency,
}

/// Response to `Get`. A missing key is an all-empty response, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetResponse {
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
    pub etag: Option<Etag>,
    pub metadata: HashMap<String, String>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetRequest {
    pub key: String,
    #[serde(with = "hex_bytes")]
    pub value: Bytes,
    pub etag: Option<Etag>,
    pub metadata: HashMap<String, String>,
    pub options: Option<StateOptions>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteRequest {
    pub key: String,
    pub etag: Option<Etag>,
    pub metadata: HashMap<String, String>,
    pub options: Option<StateOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {}

// =============================================================================
// BULK OPERATIONS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkGetRequest {
    pub items: Vec<GetRequest>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkStateItem {
    pub key: String,
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
    pub etag: Option<Etag>,
    pub error: String,
    pub metadata: HashMap<String, String>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkGetResponse {
    pub items: Vec<BulkStateItem>,
    pub got: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkSetRequest {
    pub items: Vec<SetRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSetResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkDeleteRequest {
    pub items: Vec<DeleteRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteResponse {}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Tagged body of one transaction step: `{"set": {...}}` or `{"delete": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionalOperationRequest {
    Set(SetRequest),
    Delete(DeleteRequest),
}

/// One transaction step.
///
/// `request` is `None` when the step is absent or carries a tag this host
/// does not recognise. Such steps still decode so the rest of the batch
/// survives. A `set` or `delete` body that does not decode fails the whole
/// request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionalStateOperation {
    #[serde(deserialize_with = "lenient_operation")]
    pub request: Option<TransactionalOperationRequest>,
}

impl TransactionalStateOperation {
    #[must_use]
    pub fn set(request: SetRequest) -> Self {
        Self {
            request: Some(TransactionalOperationRequest::Set(request)),
        }
    }

    #[must_use]
    pub fn delete(request: DeleteRequest) -> Self {
        Self {
            request: Some(TransactionalOperationRequest::Delete(request)),
        }
    }
}

const KNOWN_OPERATION_TAGS: [&str; 2] = ["set", "delete"];

fn lenient_operation<'de, D>(
    deserializer: D,
) -> Result<Option<TransactionalOperationRequest>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let known = value.as_object().is_some_and(|body| {
        body.keys()
            .any(|tag| KNOWN_OPERATION_TAGS.contains(&tag.as_str()))
    });
    if !known {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionalStateRequest {
    pub operations: Vec<TransactionalStateOperation>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionalStateResponse {}

// =============================================================================
// QUERIES
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sorting {
    pub key: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub limit: u64,
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub filter: HashMap<String, serde_json::Value>,
    pub sort: Vec<Sorting>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub query: Option<Query>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryItem {
    pub key: String,
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
    pub etag: Option<Etag>,
    pub error: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryResponse {
    pub items: Vec<QueryItem>,
    pub token: String,
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_operation_tag_decodes_as_none() {
        let request: TransactionalStateRequest = serde_json::from_value(json!({
            "operations": [
                { "request": { "set": { "key": "a", "value": "31" } } },
                { "request": { "delete": { "key": "b" } } },
                { "request": { "upsert": { "key": "c" } } },
                {}
            ]
        }))
        .unwrap();

        assert_eq!(request.operations.len(), 4);
        assert!(matches!(
            request.operations[0].request,
            Some(TransactionalOperationRequest::Set(ref set)) if set.key == "a"
        ));
        assert!(matches!(
            request.operations[1].request,
            Some(TransactionalOperationRequest::Delete(_))
        ));
        assert!(request.operations[2].request.is_none());
        assert!(request.operations[3].request.is_none());
    }

    #[test]
    fn test_malformed_known_operation_fails_request() {
        let bad_value = serde_json::from_value::<TransactionalStateRequest>(json!({
            "operations": [
                { "request": { "set": { "key": "a", "value": "31" } } },
                { "request": { "set": { "key": "c", "value": "not-hex" } } }
            ]
        }));
        assert!(bad_value.is_err());

        let bad_key = serde_json::from_value::<TransactionalStateRequest>(json!({
            "operations": [{ "request": { "delete": { "key": 42 } } }]
        }));
        assert!(bad_key.is_err());
    }

    #[test]
    fn test_operation_serializes_with_tag() {
        let op = TransactionalStateOperation::delete(DeleteRequest {
            key: "b".to_string(),
            ..DeleteRequest::default()
        });
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["request"]["delete"]["key"], "b");
    }

    #[test]
    fn test_state_options_names() {
        let options = StateOptions {
            concurrency: StateConcurrency::FirstWrite,
            consistency: StateConsistency::Strong,
        };
        let value = serde_json::to_value(options).unwrap();
        assert_eq!(value, json!({ "concurrency": "first_write", "consistency": "strong" }));
    }
}
