//! One instance per configured component, built on first use.
//!
//! ```text
//!   DashMap<InstanceKey, Arc<OnceCell<Arc<S>>>>
//!
//!   resolve(k):
//!     1. clone k's cell out of its shard (shard lock released here)
//!     2. cell.get_or_try_init(factory)   concurrent callers for k wait,
//!                                        other keys proceed untouched
//! ```
//!
//! A failed initialization leaves the cell empty, so the next caller for
//! that key runs the factory again.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use pc_components::ComponentError;
use tokio::sync::OnceCell;

use super::{construct, ComponentFactory, ComponentProvider};
use crate::context::ProviderEnvironment;
use crate::instance::InstanceKey;
use crate::registrar::Capability;

/// Per-key lazily constructed instances.
pub struct MultiplexedProvider<S> {
    instances: DashMap<InstanceKey, Arc<OnceCell<Arc<S>>>>,
    factory: ComponentFactory<S>,
    env: ProviderEnvironment,
    capability: Capability,
}

impl<S: Send + Sync + 'static> MultiplexedProvider<S> {
    pub fn new(factory: ComponentFactory<S>, env: ProviderEnvironment, capability: Capability) -> Self {
        Self {
            instances: DashMap::new(),
            factory,
            env,
            capability,
        }
    }

    /// Number of keys with a constructed instance.
    #[must_use]
    pub fn constructed_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    fn cell(&self, key: &InstanceKey) -> Arc<OnceCell<Arc<S>>> {
        if let Some(cell) = self.instances.get(key) {
            return Arc::clone(cell.value());
        }
        Arc::clone(self.instances.entry(key.clone()).or_default().value())
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> ComponentProvider<S> for MultiplexedProvider<S> {
    async fn resolve(&self, key: &InstanceKey) -> Result<Arc<S>, ComponentError> {
        let cell = self.cell(key);
        let component = cell
            .get_or_try_init(|| async {
                let ctx = self.env.context_for(key.clone());
                construct(&self.factory, &ctx, self.capability)
            })
            .await?;
        Ok(Arc::clone(component))
    }
}
