//! # Component Providers
//!
//! A provider answers one question for every incoming call: which component
//! instance serves it.
//!
//! ```text
//!   call metadata ──▶ InstanceKey ──▶ ComponentProvider::resolve ──▶ Arc<T>
//!
//!   SingletonProvider<S>     one instance for every key
//!   MultiplexedProvider<S>   one instance per key, built on first use
//!   DelegatedProvider<W, N>  the wide provider's instance, viewed as N
//! ```
//!
//! Construction failures are returned to the caller that triggered them and
//! never cached; the next call for the same key runs the factory again.

mod delegated;
mod multiplexed;
mod singleton;

pub use delegated::DelegatedProvider;
pub use multiplexed::MultiplexedProvider;
pub use singleton::SingletonProvider;

use std::sync::Arc;

use async_trait::async_trait;
use pc_components::ComponentError;

use crate::context::ComponentProviderContext;
use crate::instance::InstanceKey;
use crate::registrar::Capability;

/// Builds a component for one configured instance.
pub type ComponentFactory<S> =
    Arc<dyn Fn(&ComponentProviderContext) -> Result<S, ComponentError> + Send + Sync>;

/// Box a factory closure.
pub fn component_factory<S, F>(factory: F) -> ComponentFactory<S>
where
    F: Fn(&ComponentProviderContext) -> Result<S, ComponentError> + Send + Sync + 'static,
{
    Arc::new(factory)
}

/// Resolves the component instance serving a call.
#[async_trait]
pub trait ComponentProvider<T: ?Sized + Send + Sync + 'static>: Send + Sync {
    async fn resolve(&self, key: &InstanceKey) -> Result<Arc<T>, ComponentError>;

    /// Resolve using a metadata lookup on the current call.
    async fn get_component(
        &self,
        lookup: &(dyn for<'a> Fn(&'a str) -> Option<String> + Send + Sync),
    ) -> Result<Arc<T>, ComponentError> {
        let key = InstanceKey::from_lookup(lookup);
        self.resolve(&key).await
    }
}

/// Run `factory` for `ctx`, recording the outcome.
pub(crate) fn construct<S>(
    factory: &ComponentFactory<S>,
    ctx: &ComponentProviderContext,
    capability: Capability,
) -> Result<Arc<S>, ComponentError> {
    match factory(ctx) {
        Ok(component) => {
            pc_telemetry::INSTANCES_CONSTRUCTED
                .with_label_values(&[capability.as_str()])
                .inc();
            tracing::debug!(
                capability = %capability,
                instance = %ctx.instance(),
                "Component instance constructed"
            );
            Ok(Arc::new(component))
        }
        Err(e) => {
            pc_telemetry::CONSTRUCTION_FAILURES
                .with_label_values(&[capability.as_str()])
                .inc();
            tracing::warn!(
                capability = %capability,
                instance = %ctx.instance(),
                error = %e,
                "Component construction failed"
            );
            Err(match e {
                ComponentError::Construction(_) => e,
                other => ComponentError::Construction(other.to_string()),
            })
        }
    }
}
