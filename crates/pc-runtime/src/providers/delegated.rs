//! Narrow views over another provider's instances.

use std::sync::Arc;

use async_trait::async_trait;
use pc_components::ComponentError;

use super::ComponentProvider;
use crate::instance::InstanceKey;

/// Resolves through `wide` and converts the result with `narrow`.
///
/// Used for every capability view of a registered component, so the
/// primary adaptor and any secondary adaptors on the same socket see the
/// same instance for the same key.
pub struct DelegatedProvider<W: ?Sized, N: ?Sized> {
    wide: Arc<dyn ComponentProvider<W>>,
    narrow: fn(Arc<W>) -> Arc<N>,
}

impl<W, N> DelegatedProvider<W, N>
where
    W: ?Sized + Send + Sync + 'static,
    N: ?Sized + Send + Sync + 'static,
{
    pub fn new(wide: Arc<dyn ComponentProvider<W>>, narrow: fn(Arc<W>) -> Arc<N>) -> Self {
        Self { wide, narrow }
    }
}

#[async_trait]
impl<W, N> ComponentProvider<N> for DelegatedProvider<W, N>
where
    W: ?Sized + Send + Sync + 'static,
    N: ?Sized + Send + Sync + 'static,
{
    async fn resolve(&self, key: &InstanceKey) -> Result<Arc<N>, ComponentError> {
        let component = self.wide.resolve(key).await?;
        Ok((self.narrow)(component))
    }
}
