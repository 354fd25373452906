//! # pc-components - Pluggable Component Contracts
//!
//! The simplified domain interface that extension authors implement. The host
//! (`pc-runtime`) resolves an instance of one of these traits for every call
//! arriving on a component socket and translates wire messages into the
//! request types defined here.
//!
//! ## Capabilities
//!
//! ```text
//!                    ┌──────────────────────┐
//!                    │  PluggableComponent  │  init / features / ping
//!                    └──────────┬───────────┘
//!           ┌───────────────────┼────────────────────┐
//!           ▼                   ▼                    ▼
//!    ┌─────────────┐     ┌─────────────┐     ┌───────────────┐
//!    │ StateStore  │     │   PubSub    │     │ OutputBinding │   primary
//!    └──────┬──────┘     └─────────────┘     └───────────────┘
//!           │ declared through StateStoreFacets
//!     ┌─────┴──────────────────┐
//!     ▼                        ▼
//! ┌──────────────────────┐ ┌────────────────────┐
//! │TransactionalStateStore│ │QueryableStateStore │            secondary
//! └──────────────────────┘ └────────────────────┘
//! ```
//!
//! Secondary capabilities are declared statically by the implementation type
//! (see [`StateStoreFacets`]); the host reads the declaration once, when the
//! store is registered, and never inspects instances at call time.
//!
//! ## Cancellation
//!
//! Every domain call receives the caller's [`CancellationToken`]. An aborted
//! call cancels the token; implementations doing long work should observe it.

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bindings;
pub mod component;
pub mod error;
pub mod pubsub;
pub mod state_store;

use std::collections::HashMap;

pub use bindings::{OutputBinding, OutputBindingInvokeRequest, OutputBindingInvokeResponse};
pub use component::{MetadataRequest, PluggableComponent};
pub use error::{ComponentError, ComponentResult};
pub use pubsub::{
    PubSub, PubSubPublishRequest, PubSubPullMessagesRequest, PubSubPullMessagesResponse,
    PubSubPullMessagesTopic, PullMessagesRequests, PullMessagesResponses,
};
pub use state_store::{
    QueryableStateStore, StateStore, StateStoreBulkDeleteRequest, StateStoreBulkGetRequest,
    StateStoreBulkGetResponse, StateStoreBulkSetRequest, StateStoreBulkStateItem,
    StateStoreConcurrency, StateStoreConsistency, StateStoreDeleteRequest, StateStoreFacets,
    StateStoreGetRequest, StateStoreGetResponse, StateStoreOptions, StateStoreQuery,
    StateStoreQueryItem, StateStoreQueryPagination, StateStoreQueryRequest,
    StateStoreQueryResponse, StateStoreQuerySortOrder, StateStoreQuerySorting,
    StateStoreSetRequest, StateStoreTransactOperation, StateStoreTransactRequest,
    TransactionalStateStore,
};
pub use tokio_util::sync::CancellationToken;

/// Free-form string metadata attached to requests and responses.
pub type Metadata = HashMap<String, String>;
