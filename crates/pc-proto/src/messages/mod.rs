//! Wire messages for the component RPC services.
//!
//! Field names and shapes mirror the `dapr.proto.components.v1` protocol.
//! Byte payloads travel hex-encoded; strings left empty on the wire mean
//! "not set".

pub mod bindings;
pub mod common;
pub mod pubsub;
pub mod state;

pub use bindings::*;
pub use common::*;
pub use pubsub::*;
pub use state::*;

/// Serde adaptor encoding [`bytes::Bytes`] as a lowercase hex string.
pub mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
