//! # Component Registrar
//!
//! Collects what each socket serves before anything is bound.
//!
//! Registration is split in two phases:
//!
//! 1. **Declare** (`add_component`): record the capabilities and queue an
//!    action that will build their providers and adaptors. Duplicate
//!    capabilities on one socket are rejected here, immediately.
//! 2. **Materialize** (`materialize`): run every queued action in order and
//!    collect the adaptors. This happens once, before the socket accepts a
//!    single connection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pc_proto::RpcService;
use tracing::info;

use crate::context::ProviderEnvironment;
use crate::error::RegistrationError;

/// A contract a component exposes over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    StateStore,
    TransactionalStateStore,
    QueryableStateStore,
    PubSub,
    OutputBinding,
}

impl Capability {
    /// Primary capabilities own a provider; secondary ones delegate to the
    /// primary registered on the same socket.
    #[must_use]
    pub fn is_primary(self) -> bool {
        matches!(self, Self::StateStore | Self::PubSub | Self::OutputBinding)
    }

    /// RPC service implementing this capability.
    #[must_use]
    pub fn service_name(self) -> &'static str {
        match self {
            Self::StateStore => pc_proto::STATE_STORE_SERVICE,
            Self::TransactionalStateStore => pc_proto::TRANSACTIONAL_STATE_STORE_SERVICE,
            Self::QueryableStateStore => pc_proto::QUERIABLE_STATE_STORE_SERVICE,
            Self::PubSub => pc_proto::PUB_SUB_SERVICE,
            Self::OutputBinding => pc_proto::OUTPUT_BINDING_SERVICE,
        }
    }

    /// Metric label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateStore => "state_store",
            Self::TransactionalStateStore => "transactional_state_store",
            Self::QueryableStateStore => "queryable_state_store",
            Self::PubSub => "pub_sub",
            Self::OutputBinding => "output_binding",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StateStore => "state store",
            Self::TransactionalStateStore => "transactional state store",
            Self::QueryableStateStore => "queryable state store",
            Self::PubSub => "pub/sub",
            Self::OutputBinding => "output binding",
        })
    }
}

/// How a capability's instances are provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One instance for every configured component.
    Singleton,
    /// One instance per configured component.
    Multiplexed,
    /// View of the primary capability's instance on the same socket.
    Delegated,
}

/// Strategy of a primary capability, which always owns its instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryStrategy {
    Singleton,
    Multiplexed,
}

impl From<PrimaryStrategy> for Strategy {
    fn from(strategy: PrimaryStrategy) -> Self {
        match strategy {
            PrimaryStrategy::Singleton => Self::Singleton,
            PrimaryStrategy::Multiplexed => Self::Multiplexed,
        }
    }
}

/// Record of one registered capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRegistration {
    pub capability: Capability,
    /// Rust type name of the implementation.
    pub implementation: &'static str,
    /// RPC service the adaptor serves.
    pub adaptor: &'static str,
    pub socket: PathBuf,
    pub strategy: Strategy,
}

impl ComponentRegistration {
    #[must_use]
    pub fn new<S>(capability: Capability, socket: &Path, strategy: Strategy) -> Self {
        Self {
            capability,
            implementation: std::any::type_name::<S>(),
            adaptor: capability.service_name(),
            socket: socket.to_path_buf(),
            strategy,
        }
    }
}

/// Builds the adaptors for one registered component.
pub type PendingAction = Box<dyn FnOnce(&ProviderEnvironment) -> Vec<Arc<dyn RpcService>> + Send>;

/// Ordered registration list for one socket.
pub struct Registrar {
    socket: PathBuf,
    registrations: Vec<ComponentRegistration>,
    actions: Vec<PendingAction>,
}

impl Registrar {
    #[must_use]
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            registrations: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    #[must_use]
    pub fn registrations(&self) -> &[ComponentRegistration] {
        &self.registrations
    }

    #[must_use]
    pub fn is_registered(&self, capability: Capability) -> bool {
        self.registrations
            .iter()
            .any(|r| r.capability == capability)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Declare a component: its primary capability first, then any
    /// secondary ones. Nothing is recorded if any capability clashes.
    pub fn add_component(
        &mut self,
        registrations: Vec<ComponentRegistration>,
        action: PendingAction,
    ) -> Result<(), RegistrationError> {
        for (i, registration) in registrations.iter().enumerate() {
            let clashes_earlier = registrations[..i]
                .iter()
                .any(|r| r.capability == registration.capability);
            if clashes_earlier || self.is_registered(registration.capability) {
                return Err(RegistrationError::DuplicateCapability {
                    capability: registration.capability,
                    socket: self.socket.clone(),
                });
            }
        }

        for registration in &registrations {
            info!(
                "[Registrar] {} -> {} ({:?}) on {}",
                registration.capability,
                registration.implementation,
                registration.strategy,
                self.socket.display()
            );
        }
        self.registrations.extend(registrations);
        self.actions.push(action);
        Ok(())
    }

    /// Run every queued action in registration order.
    pub fn materialize(self, env: &ProviderEnvironment) -> Vec<Arc<dyn RpcService>> {
        self.actions
            .into_iter()
            .flat_map(|action| action(env))
            .collect()
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("socket", &self.socket)
            .field("registrations", &self.registrations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ServiceContext;
    use async_trait::async_trait;
    use pc_proto::{CallContext, MethodKind, Status};
    use serde_json::Value;

    struct Named(&'static str);

    #[async_trait]
    impl RpcService for Named {
        fn service_name(&self) -> &'static str {
            self.0
        }

        fn method_kind(&self, _method: &str) -> Option<MethodKind> {
            None
        }

        async fn call_unary(
            &self,
            _method: &str,
            _request: Value,
            _ctx: CallContext,
        ) -> Result<Value, Status> {
            Err(Status::unimplemented("test"))
        }
    }

    fn registration(capability: Capability, strategy: Strategy) -> ComponentRegistration {
        ComponentRegistration::new::<()>(capability, Path::new("/tmp/r.sock"), strategy)
    }

    fn action(name: &'static str) -> PendingAction {
        Box::new(move |_| vec![Arc::new(Named(name)) as Arc<dyn RpcService>])
    }

    #[test]
    fn test_primary_capabilities() {
        assert!(Capability::StateStore.is_primary());
        assert!(Capability::PubSub.is_primary());
        assert!(!Capability::TransactionalStateStore.is_primary());
        assert!(!Capability::QueryableStateStore.is_primary());
    }

    #[test]
    fn test_primary_strategy_never_delegates() {
        assert_eq!(Strategy::from(PrimaryStrategy::Singleton), Strategy::Singleton);
        assert_eq!(Strategy::from(PrimaryStrategy::Multiplexed), Strategy::Multiplexed);
    }

    #[test]
    fn test_duplicate_primary_rejected_immediately() {
        let mut registrar = Registrar::new("/tmp/r.sock");
        registrar
            .add_component(
                vec![registration(Capability::StateStore, Strategy::Multiplexed)],
                action("first"),
            )
            .unwrap();

        let err = registrar
            .add_component(
                vec![registration(Capability::StateStore, Strategy::Singleton)],
                action("second"),
            )
            .unwrap_err();

        assert_eq!(
            err,
            RegistrationError::DuplicateCapability {
                capability: Capability::StateStore,
                socket: PathBuf::from("/tmp/r.sock"),
            }
        );
        assert_eq!(registrar.registrations().len(), 1);
    }

    #[test]
    fn test_different_capabilities_share_a_socket() {
        let mut registrar = Registrar::new("/tmp/r.sock");
        registrar
            .add_component(
                vec![registration(Capability::StateStore, Strategy::Multiplexed)],
                action("state"),
            )
            .unwrap();
        registrar
            .add_component(
                vec![registration(Capability::PubSub, Strategy::Singleton)],
                action("pubsub"),
            )
            .unwrap();
        assert_eq!(registrar.registrations().len(), 2);
    }

    #[test]
    fn test_materialize_preserves_order() {
        let mut registrar = Registrar::new("/tmp/r.sock");
        registrar
            .add_component(
                vec![
                    registration(Capability::StateStore, Strategy::Multiplexed),
                    registration(Capability::TransactionalStateStore, Strategy::Delegated),
                ],
                Box::new(|_| {
                    vec![
                        Arc::new(Named("a")) as Arc<dyn RpcService>,
                        Arc::new(Named("b")) as Arc<dyn RpcService>,
                    ]
                }),
            )
            .unwrap();
        registrar
            .add_component(
                vec![registration(Capability::OutputBinding, Strategy::Singleton)],
                action("c"),
            )
            .unwrap();

        let env = ProviderEnvironment::new(Arc::new(ServiceContext::new()), "/tmp/r.sock");
        let names: Vec<_> = registrar
            .materialize(&env)
            .iter()
            .map(|s| s.service_name())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
