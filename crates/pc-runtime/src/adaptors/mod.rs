//! # Protocol Adaptors
//!
//! One adaptor per RPC service. Each call goes through the same four steps:
//!
//! ```text
//!   CallContext ──get_component──▶ instance
//!   wire request ──convert──▶ domain request ──▶ instance.method(.., cancel)
//!   domain result ──convert──▶ wire response      (failures → Status)
//! ```
//!
//! Adaptors never retry and never swallow domain failures. The only request
//! content dropped on purpose is a transaction step with an unrecognised
//! kind (see [`transactional`]).

pub mod convert;
pub mod output_binding;
pub mod pubsub;
pub mod queryable;
pub mod state_store;
pub mod transactional;

pub use output_binding::OutputBindingAdaptor;
pub use pubsub::PubSubAdaptor;
pub use queryable::QueryableStateStoreAdaptor;
pub use state_store::StateStoreAdaptor;
pub use transactional::TransactionalStateStoreAdaptor;

use std::sync::Arc;

use pc_components::ComponentError;
use pc_proto::{CallContext, Status};

use crate::providers::ComponentProvider;

/// Map a domain failure onto the status reported to the caller.
#[must_use]
pub fn to_status(error: ComponentError) -> Status {
    let message = error.to_string();
    match error {
        ComponentError::ETagMismatch(_) => Status::aborted(message),
        ComponentError::ETagInvalid(_) => Status::invalid_argument(message),
        ComponentError::BulkDeleteRowMismatch { .. } => Status::internal(message),
        ComponentError::Cancelled => Status::cancelled(message),
        ComponentError::Construction(_) => Status::unavailable(message),
        ComponentError::Unsupported(_) => Status::unimplemented(message),
        ComponentError::Failed(_) => Status::internal(message),
    }
}

/// Resolve the instance serving `ctx`'s call.
pub(crate) async fn resolve<T>(
    provider: &dyn ComponentProvider<T>,
    ctx: &CallContext,
) -> Result<Arc<T>, Status>
where
    T: ?Sized + Send + Sync + 'static,
{
    provider
        .get_component(&|name: &str| ctx.header(name).map(str::to_string))
        .await
        .map_err(to_status)
}

pub(crate) fn unknown_method(service: &str, method: &str) -> Status {
    Status::unimplemented(format!("unknown method {service}/{method}"))
}
