//! # pc-memory - In-Memory Reference Components
//!
//! Process-local implementations of every component capability, for local
//! development and end-to-end tests of the host:
//!
//! - [`MemoryStateStore`]: etag concurrency, transactions, simple queries
//! - [`MemoryPubSub`]: broadcast topics with per-message acknowledgements
//! - [`EchoOutputBinding`]: returns what it is sent
//!
//! Nothing here is durable. Every instance starts empty.

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod binding;
pub mod pubsub;
mod query;
pub mod state;

pub use binding::EchoOutputBinding;
pub use pubsub::MemoryPubSub;
pub use state::MemoryStateStore;
