//! # pc-runtime - Pluggable Component Host
//!
//! Serves user-written components to a sidecar over Unix sockets.
//!
//! ## Architecture
//!
//! ```text
//!   PluggableApplication
//!     └── per socket: ServiceBuilder ──▶ Registrar (declared capabilities)
//!                                            │ materialize at start
//!                                            ▼
//!                      ┌──────────── adaptors (RpcService) ────────────┐
//!                      │ StateStore  Transactional  Queryable  PubSub  │
//!                      │ OutputBinding                                 │
//!                      └──────────────────┬────────────────────────────┘
//!                                         │ get_component(metadata)
//!                                         ▼
//!                      providers: Singleton / Multiplexed / Delegated
//!                                         │ factory(ComponentProviderContext)
//!                                         ▼
//!                               user component instance
//! ```
//!
//! ## Modular Structure
//!
//! - `instance` - instance key extraction from call metadata
//! - `context` - factory context and shared dependency registry
//! - `providers` - instance resolution strategies
//! - `adaptors` - wire ⇄ domain translation per RPC service
//! - `registrar`, `builder` - per-socket registration
//! - `socket` - post-bind permission relaxation
//! - `server` - accept loop and per-connection call dispatch
//! - `application` - binds, serves and shuts down every socket

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adaptors;
pub mod application;
pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod instance;
pub mod providers;
pub mod registrar;
pub mod server;
pub mod socket;

pub use application::{PluggableApplication, RunningApplication, ServiceOptions};
pub use builder::ServiceBuilder;
pub use config::HostConfig;
pub use context::{ComponentProviderContext, ProviderEnvironment, ServiceContext};
pub use error::{ConfigError, HostError, RegistrationError};
pub use instance::{InstanceKey, INSTANCE_ID_METADATA_KEY};
pub use providers::{
    ComponentFactory, ComponentProvider, DelegatedProvider, MultiplexedProvider,
    SingletonProvider,
};
pub use registrar::{Capability, ComponentRegistration, PrimaryStrategy, Registrar, Strategy};
pub use socket::SocketLifecycle;
