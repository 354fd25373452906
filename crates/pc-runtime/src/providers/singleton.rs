//! One shared instance for every configured component.

use std::sync::Arc;

use async_trait::async_trait;
use pc_components::ComponentError;
use tokio::sync::OnceCell;

use super::{construct, ComponentFactory, ComponentProvider};
use crate::context::ProviderEnvironment;
use crate::instance::InstanceKey;
use crate::registrar::Capability;

/// Lazily builds a single instance on first access, whatever the key.
pub struct SingletonProvider<S> {
    cell: OnceCell<Arc<S>>,
    factory: ComponentFactory<S>,
    env: ProviderEnvironment,
    capability: Capability,
}

impl<S: Send + Sync + 'static> SingletonProvider<S> {
    pub fn new(factory: ComponentFactory<S>, env: ProviderEnvironment, capability: Capability) -> Self {
        Self {
            cell: OnceCell::new(),
            factory,
            env,
            capability,
        }
    }

    /// Whether the instance has been built yet.
    #[must_use]
    pub fn is_constructed(&self) -> bool {
        self.cell.initialized()
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> ComponentProvider<S> for SingletonProvider<S> {
    async fn resolve(&self, _key: &InstanceKey) -> Result<Arc<S>, ComponentError> {
        let component = self
            .cell
            .get_or_try_init(|| async {
                let ctx = self.env.context_for(InstanceKey::Default);
                construct(&self.factory, &ctx, self.capability)
            })
            .await?;
        Ok(Arc::clone(component))
    }
}
