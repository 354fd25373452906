//! # Pub/Sub Contract
//!
//! Publishing is a plain request/response call. Subscribing is a long-lived
//! bidirectional exchange:
//!
//! ```text
//!   sidecar ──PullMessagesRequest──▶ host ──▶ requests (mpsc::Receiver)
//!                                                  │
//!                                            PubSub::pull_messages
//!                                                  │
//!   sidecar ◀─PullMessagesResponse── host ◀── responses (mpsc::Sender)
//! ```
//!
//! The first request names the topic. Later requests acknowledge delivered
//! messages by id, optionally with an error. The exchange ends when the
//! implementation returns, when the sidecar half-closes and the
//! implementation stops, or when `cancel` fires.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::component::PluggableComponent;
use crate::error::ComponentError;
use crate::Metadata;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubSubPublishRequest {
    pub pubsub_name: String,
    pub topic: String,
    pub data: Bytes,
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

/// Topic a subscriber asks to receive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubSubPullMessagesTopic {
    pub name: String,
    pub metadata: Metadata,
}

/// One inbound element of the subscription stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubSubPullMessagesRequest {
    /// Id of a previously delivered message being acknowledged.
    pub ack_message_id: Option<String>,
    /// Processing error reported alongside the acknowledgement.
    pub ack_message_error: Option<String>,
    /// Set on the opening request only.
    pub topic: Option<PubSubPullMessagesTopic>,
}

impl PubSubPullMessagesRequest {
    /// Opening request subscribing to `name`.
    #[must_use]
    pub fn subscribe(name: impl Into<String>) -> Self {
        Self {
            topic: Some(PubSubPullMessagesTopic {
                name: name.into(),
                metadata: Metadata::new(),
            }),
            ..Self::default()
        }
    }

    /// Successful acknowledgement of message `id`.
    #[must_use]
    pub fn ack(id: impl Into<String>) -> Self {
        Self {
            ack_message_id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// One outbound message delivered to the subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubSubPullMessagesResponse {
    pub topic_name: String,
    pub id: String,
    pub data: Bytes,
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

/// Inbound half of a subscription, already translated to domain form.
pub type PullMessagesRequests = mpsc::Receiver<PubSubPullMessagesRequest>;

/// Outbound half of a subscription. A failed send means the caller is gone.
pub type PullMessagesResponses = mpsc::Sender<PubSubPullMessagesResponse>;

/// Primary pub/sub capability.
#[async_trait]
pub trait PubSub: PluggableComponent {
    async fn publish(
        &self,
        request: PubSubPublishRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ComponentError>;

    /// Serve one subscription until the stream ends or `cancel` fires.
    async fn pull_messages(
        &self,
        requests: PullMessagesRequests,
        responses: PullMessagesResponses,
        cancel: CancellationToken,
    ) -> Result<(), ComponentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request_carries_topic_only() {
        let request = PubSubPullMessagesRequest::subscribe("orders");
        assert_eq!(request.topic.unwrap().name, "orders");
        assert!(request.ack_message_id.is_none());
        assert!(request.ack_message_error.is_none());
    }

    #[test]
    fn test_ack_request_carries_id_only() {
        let request = PubSubPullMessagesRequest::ack("m-1");
        assert_eq!(request.ack_message_id.as_deref(), Some("m-1"));
        assert!(request.topic.is_none());
    }
}
