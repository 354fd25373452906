//! # pc-proto - Component Wire Protocol
//!
//! Everything that crosses a component socket:
//!
//! - [`messages`]: request/response shapes of the five component services
//! - [`status`]: call outcome codes
//! - [`frame`]: newline-delimited JSON framing, multiplexed by call id
//! - [`service`]: the [`RpcService`] trait the host's adaptors implement
//! - [`client`]: a small client speaking the same framing
//!
//! The framing is plumbing. Adaptors only see decoded JSON payloads and a
//! [`CallContext`], so a different transport can replace it without touching
//! them.

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod context;
pub mod error;
pub mod frame;
pub mod messages;
pub mod service;
pub mod status;

pub use client::{ClientCall, ComponentClient};
pub use context::CallContext;
pub use error::TransportError;
pub use frame::{CallId, ClientFrame, FrameReader, ServerFrame};
pub use service::{decode, encode, MethodKind, RequestStream, ResponseSink, RpcService};
pub use status::{Code, Status};

// =============================================================================
// SERVICE NAMES
// =============================================================================

pub const STATE_STORE_SERVICE: &str = "dapr.proto.components.v1.StateStore";
pub const TRANSACTIONAL_STATE_STORE_SERVICE: &str =
    "dapr.proto.components.v1.TransactionalStateStore";
pub const QUERIABLE_STATE_STORE_SERVICE: &str = "dapr.proto.components.v1.QueriableStateStore";
pub const PUB_SUB_SERVICE: &str = "dapr.proto.components.v1.PubSub";
pub const OUTPUT_BINDING_SERVICE: &str = "dapr.proto.components.v1.OutputBinding";
