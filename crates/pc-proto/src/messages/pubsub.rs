//! `PubSub` service messages.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::hex_bytes;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishRequest {
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
    pub pubsub_name: String,
    pub topic: String,
    pub metadata: HashMap<String, String>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topic {
    pub name: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AckMessageError {
    pub message: String,
}

/// Inbound element of a `PullMessages` stream.
///
/// The opening message carries `topic`; later messages acknowledge a
/// delivered message by `ack_message_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullMessagesRequest {
    pub ack_message_id: String,
    pub ack_error: Option<AckMessageError>,
    pub topic: Option<Topic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullMessagesResponse {
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
    pub topic_name: String,
    pub metadata: HashMap<String, String>,
    pub content_type: String,
    pub id: String,
}
