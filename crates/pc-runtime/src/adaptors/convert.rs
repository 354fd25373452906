//! Wire ⇄ domain conversions shared by the state store adaptors.
//!
//! Strings that are empty on the wire are `None` in the domain and back.

use pc_components::{
    StateStoreBulkStateItem, StateStoreConcurrency, StateStoreConsistency,
    StateStoreDeleteRequest, StateStoreGetRequest, StateStoreGetResponse, StateStoreOptions,
    StateStoreSetRequest,
};
use pc_proto::messages::{
    BulkStateItem, DeleteRequest, Etag, GetRequest, GetResponse, SetRequest, StateConcurrency,
    StateConsistency, StateOptions,
};

/// Empty string to `None`.
#[must_use]
pub fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[must_use]
pub fn etag_from_wire(etag: Option<Etag>) -> Option<String> {
    etag.and_then(|etag| non_empty(etag.value))
}

#[must_use]
pub fn etag_to_wire(etag: Option<String>) -> Option<Etag> {
    etag.map(Etag::new)
}

#[must_use]
pub fn consistency_from_wire(consistency: StateConsistency) -> StateStoreConsistency {
    match consistency {
        StateConsistency::Unspecified => StateStoreConsistency::Unspecified,
        StateConsistency::Eventual => StateStoreConsistency::Eventual,
        StateConsistency::Strong => StateStoreConsistency::Strong,
    }
}

#[must_use]
pub fn concurrency_from_wire(concurrency: StateConcurrency) -> StateStoreConcurrency {
    match concurrency {
        StateConcurrency::Unspecified => StateStoreConcurrency::Unspecified,
        StateConcurrency::FirstWrite => StateStoreConcurrency::FirstWrite,
        StateConcurrency::LastWrite => StateStoreConcurrency::LastWrite,
    }
}

#[must_use]
pub fn options_from_wire(options: Option<StateOptions>) -> StateStoreOptions {
    options
        .map(|options| StateStoreOptions {
            concurrency: concurrency_from_wire(options.concurrency),
            consistency: consistency_from_wire(options.consistency),
        })
        .unwrap_or_default()
}

#[must_use]
pub fn get_request_from_wire(request: GetRequest) -> StateStoreGetRequest {
    StateStoreGetRequest {
        key: request.key,
        consistency: consistency_from_wire(request.consistency),
        metadata: request.metadata,
    }
}

/// A missing key becomes the empty response.
#[must_use]
pub fn get_response_to_wire(response: Option<StateStoreGetResponse>) -> GetResponse {
    match response {
        Some(response) => GetResponse {
            data: response.data,
            etag: etag_to_wire(response.etag),
            metadata: response.metadata,
            content_type: response.content_type.unwrap_or_default(),
        },
        None => GetResponse::default(),
    }
}

#[must_use]
pub fn set_request_from_wire(request: SetRequest) -> StateStoreSetRequest {
    StateStoreSetRequest {
        key: request.key,
        value: request.value,
        etag: etag_from_wire(request.etag),
        content_type: non_empty(request.content_type),
        metadata: request.metadata,
        options: options_from_wire(request.options),
    }
}

#[must_use]
pub fn delete_request_from_wire(request: DeleteRequest) -> StateStoreDeleteRequest {
    StateStoreDeleteRequest {
        key: request.key,
        etag: etag_from_wire(request.etag),
        metadata: request.metadata,
        options: options_from_wire(request.options),
    }
}

#[must_use]
pub fn bulk_item_to_wire(item: StateStoreBulkStateItem) -> BulkStateItem {
    BulkStateItem {
        key: item.key,
        data: item.data,
        etag: etag_to_wire(item.etag),
        error: item.error.unwrap_or_default(),
        metadata: item.metadata,
        content_type: item.content_type.unwrap_or_default(),
    }
}
