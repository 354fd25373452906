//! # Service Builder
//!
//! Fluent registration of the components served on one socket.
//!
//! ```text
//!   register_state_store(factory)
//!        │
//!        ├── StateStore               ◀── Multiplexed/Singleton provider<S>
//!        ├── TransactionalStateStore  ◀── Delegated view (if S opts in)
//!        └── QueryableStateStore      ◀── Delegated view (if S opts in)
//! ```
//!
//! Every adaptor of one component resolves through the same primary
//! provider, so all of them see the same instance for the same key.
//!
//! Registration only declares. Providers and adaptors are created when the
//! application starts.

use std::path::Path;
use std::sync::Arc;

use pc_components::{ComponentError, OutputBinding, PubSub, StateStore};
use pc_proto::RpcService;

use crate::adaptors::{
    OutputBindingAdaptor, PubSubAdaptor, QueryableStateStoreAdaptor, StateStoreAdaptor,
    TransactionalStateStoreAdaptor,
};
use crate::context::{ComponentProviderContext, ProviderEnvironment};
use crate::error::RegistrationError;
use crate::providers::{
    component_factory, ComponentFactory, ComponentProvider, DelegatedProvider,
    MultiplexedProvider, SingletonProvider,
};
use crate::registrar::{
    Capability, ComponentRegistration, PendingAction, PrimaryStrategy, Registrar, Strategy,
};

/// Registers components on one socket.
#[derive(Debug)]
pub struct ServiceBuilder {
    registrar: Registrar,
    stream_channel_capacity: usize,
}

impl ServiceBuilder {
    #[must_use]
    pub fn new(registrar: Registrar, stream_channel_capacity: usize) -> Self {
        Self {
            registrar,
            stream_channel_capacity,
        }
    }

    #[must_use]
    pub fn socket(&self) -> &Path {
        self.registrar.socket()
    }

    #[must_use]
    pub fn registrations(&self) -> &[ComponentRegistration] {
        self.registrar.registrations()
    }

    #[must_use]
    pub fn into_registrar(self) -> Registrar {
        self.registrar
    }

    // =========================================================================
    // STATE STORES
    // =========================================================================

    /// One state store instance per configured component.
    pub fn register_state_store<S, F>(&mut self, factory: F) -> Result<&mut Self, RegistrationError>
    where
        S: StateStore,
        F: Fn(&ComponentProviderContext) -> Result<S, ComponentError> + Send + Sync + 'static,
    {
        self.add_state_store(component_factory(factory), PrimaryStrategy::Multiplexed)
    }

    /// One state store instance shared by every configured component.
    pub fn register_singleton_state_store<S, F>(
        &mut self,
        factory: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        S: StateStore,
        F: Fn(&ComponentProviderContext) -> Result<S, ComponentError> + Send + Sync + 'static,
    {
        self.add_state_store(component_factory(factory), PrimaryStrategy::Singleton)
    }

    fn add_state_store<S: StateStore>(
        &mut self,
        factory: ComponentFactory<S>,
        strategy: PrimaryStrategy,
    ) -> Result<&mut Self, RegistrationError> {
        let facets = S::facets();
        let socket = self.registrar.socket().to_path_buf();

        let mut registrations = vec![ComponentRegistration::new::<S>(
            Capability::StateStore,
            &socket,
            strategy.into(),
        )];
        if facets.is_transactional() {
            registrations.push(ComponentRegistration::new::<S>(
                Capability::TransactionalStateStore,
                &socket,
                Strategy::Delegated,
            ));
        }
        if facets.is_queryable() {
            registrations.push(ComponentRegistration::new::<S>(
                Capability::QueryableStateStore,
                &socket,
                Strategy::Delegated,
            ));
        }

        let action: PendingAction = Box::new(move |env| {
            let primary = primary_provider(factory, env, Capability::StateStore, strategy);

            let mut services: Vec<Arc<dyn RpcService>> = vec![Arc::new(StateStoreAdaptor::new(
                delegate(&primary, as_state_store::<S>),
            ))];
            if let Some(view) = facets.transactional_view() {
                services.push(Arc::new(TransactionalStateStoreAdaptor::new(delegate(
                    &primary, view,
                ))));
            }
            if let Some(view) = facets.queryable_view() {
                services.push(Arc::new(QueryableStateStoreAdaptor::new(delegate(
                    &primary, view,
                ))));
            }
            services
        });

        self.registrar.add_component(registrations, action)?;
        Ok(self)
    }

    // =========================================================================
    // PUB/SUB
    // =========================================================================

    pub fn register_pub_sub<S, F>(&mut self, factory: F) -> Result<&mut Self, RegistrationError>
    where
        S: PubSub,
        F: Fn(&ComponentProviderContext) -> Result<S, ComponentError> + Send + Sync + 'static,
    {
        self.add_pub_sub(component_factory(factory), PrimaryStrategy::Multiplexed)
    }

    pub fn register_singleton_pub_sub<S, F>(
        &mut self,
        factory: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        S: PubSub,
        F: Fn(&ComponentProviderContext) -> Result<S, ComponentError> + Send + Sync + 'static,
    {
        self.add_pub_sub(component_factory(factory), PrimaryStrategy::Singleton)
    }

    fn add_pub_sub<S: PubSub>(
        &mut self,
        factory: ComponentFactory<S>,
        strategy: PrimaryStrategy,
    ) -> Result<&mut Self, RegistrationError> {
        let registration =
            ComponentRegistration::new::<S>(
            Capability::PubSub,
            self.registrar.socket(),
            strategy.into(),
        );
        let capacity = self.stream_channel_capacity;

        let action: PendingAction = Box::new(move |env| {
            let primary = primary_provider(factory, env, Capability::PubSub, strategy);
            vec![Arc::new(PubSubAdaptor::new(
                delegate(&primary, as_pub_sub::<S>),
                capacity,
            )) as Arc<dyn RpcService>]
        });

        self.registrar.add_component(vec![registration], action)?;
        Ok(self)
    }

    // =========================================================================
    // OUTPUT BINDINGS
    // =========================================================================

    pub fn register_output_binding<S, F>(
        &mut self,
        factory: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        S: OutputBinding,
        F: Fn(&ComponentProviderContext) -> Result<S, ComponentError> + Send + Sync + 'static,
    {
        self.add_output_binding(component_factory(factory), PrimaryStrategy::Multiplexed)
    }

    pub fn register_singleton_output_binding<S, F>(
        &mut self,
        factory: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        S: OutputBinding,
        F: Fn(&ComponentProviderContext) -> Result<S, ComponentError> + Send + Sync + 'static,
    {
        self.add_output_binding(component_factory(factory), PrimaryStrategy::Singleton)
    }

    fn add_output_binding<S: OutputBinding>(
        &mut self,
        factory: ComponentFactory<S>,
        strategy: PrimaryStrategy,
    ) -> Result<&mut Self, RegistrationError> {
        let registration = ComponentRegistration::new::<S>(
            Capability::OutputBinding,
            self.registrar.socket(),
            strategy.into(),
        );

        let action: PendingAction = Box::new(move |env| {
            let primary = primary_provider(factory, env, Capability::OutputBinding, strategy);
            vec![Arc::new(OutputBindingAdaptor::new(delegate(
                &primary,
                as_output_binding::<S>,
            ))) as Arc<dyn RpcService>]
        });

        self.registrar.add_component(vec![registration], action)?;
        Ok(self)
    }
}

fn primary_provider<S: Send + Sync + 'static>(
    factory: ComponentFactory<S>,
    env: &ProviderEnvironment,
    capability: Capability,
    strategy: PrimaryStrategy,
) -> Arc<dyn ComponentProvider<S>> {
    match strategy {
        PrimaryStrategy::Singleton => {
            Arc::new(SingletonProvider::new(factory, env.clone(), capability))
        }
        PrimaryStrategy::Multiplexed => {
            Arc::new(MultiplexedProvider::new(factory, env.clone(), capability))
        }
    }
}

fn delegate<W, N>(
    wide: &Arc<dyn ComponentProvider<W>>,
    narrow: fn(Arc<W>) -> Arc<N>,
) -> Arc<dyn ComponentProvider<N>>
where
    W: ?Sized + Send + Sync + 'static,
    N: ?Sized + Send + Sync + 'static,
{
    Arc::new(DelegatedProvider::new(Arc::clone(wide), narrow))
}

fn as_state_store<S: StateStore>(component: Arc<S>) -> Arc<dyn StateStore> {
    component
}

fn as_pub_sub<S: PubSub>(component: Arc<S>) -> Arc<dyn PubSub> {
    component
}

fn as_output_binding<S: OutputBinding>(component: Arc<S>) -> Arc<dyn OutputBinding> {
    component
}
