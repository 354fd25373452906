//! # Factory Context
//!
//! Component factories receive a [`ComponentProviderContext`]: which
//! configured instance is being built, the socket it serves, and a
//! [`ServiceContext`] holding shared dependencies registered by the
//! application at startup.
//!
//! ```rust,ignore
//! let mut services = ServiceContext::new();
//! services.insert(Arc::new(HttpPool::new()));
//!
//! builder.register_state_store(|ctx| {
//!     let pool = ctx.services().require::<HttpPool>()?;
//!     Ok(RemoteStore::new(pool, ctx.instance_id()))
//! })?;
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pc_components::ComponentError;

use crate::instance::InstanceKey;

/// Typed registry of shared dependencies, keyed by type.
///
/// Filled during single-threaded startup and read-only afterwards.
#[derive(Default, Clone)]
pub struct ServiceContext {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value`, replacing any earlier value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: Arc<T>) {
        self.entries.insert(TypeId::of::<T>(), value);
    }

    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(entry).downcast::<T>().ok())
    }

    /// Like [`ServiceContext::get`] but reports a missing dependency as a
    /// construction failure.
    pub fn require<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ComponentError> {
        self.get::<T>().ok_or_else(|| {
            ComponentError::construction(format!("missing dependency {}", type_name::<T>()))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// What a factory knows about the instance it is asked to build.
#[derive(Debug, Clone)]
pub struct ComponentProviderContext {
    instance: InstanceKey,
    services: Arc<ServiceContext>,
    socket_path: Arc<PathBuf>,
}

impl ComponentProviderContext {
    #[must_use]
    pub fn new(instance: InstanceKey, services: Arc<ServiceContext>, socket_path: Arc<PathBuf>) -> Self {
        Self {
            instance,
            services,
            socket_path,
        }
    }

    /// Configured component id, `None` for the default instance and for
    /// singletons.
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.instance.id()
    }

    #[must_use]
    pub fn instance(&self) -> &InstanceKey {
        &self.instance
    }

    #[must_use]
    pub fn services(&self) -> &ServiceContext {
        &self.services
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Shared inputs for every provider created on one socket.
#[derive(Debug, Clone)]
pub struct ProviderEnvironment {
    pub services: Arc<ServiceContext>,
    pub socket_path: Arc<PathBuf>,
}

impl ProviderEnvironment {
    #[must_use]
    pub fn new(services: Arc<ServiceContext>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            services,
            socket_path: Arc::new(socket_path.into()),
        }
    }

    /// Context for building the instance behind `instance`.
    #[must_use]
    pub fn context_for(&self, instance: InstanceKey) -> ComponentProviderContext {
        ComponentProviderContext::new(
            instance,
            Arc::clone(&self.services),
            Arc::clone(&self.socket_path),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Pool(u32);

    #[test]
    fn test_typed_lookup() {
        let mut services = ServiceContext::new();
        services.insert(Arc::new(Pool(4)));

        assert_eq!(services.get::<Pool>().unwrap().0, 4);
        assert!(services.get::<String>().is_none());
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_require_reports_construction_error() {
        let services = ServiceContext::new();
        let err = services.require::<Pool>().unwrap_err();
        assert!(matches!(err, ComponentError::Construction(_)));
    }

    #[test]
    fn test_context_for_instance() {
        let env = ProviderEnvironment::new(Arc::new(ServiceContext::new()), "/tmp/x.sock");
        let ctx = env.context_for(InstanceKey::Named("a".to_string()));

        assert_eq!(ctx.instance_id(), Some("a"));
        assert_eq!(ctx.socket_path(), Path::new("/tmp/x.sock"));
        assert!(env.context_for(InstanceKey::Default).instance_id().is_none());
    }
}
