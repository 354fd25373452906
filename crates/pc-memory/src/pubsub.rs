//! In-memory pub/sub broker.
//!
//! Each topic is a `tokio::sync::broadcast` channel. Messages published while
//! a topic has no subscriber are dropped. Every delivery gets a fresh id and
//! stays pending until the subscriber acknowledges it. Pending ids belong to
//! the subscription that received them and are released when it ends.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pc_components::{
    CancellationToken, ComponentError, Metadata, MetadataRequest, PluggableComponent, PubSub,
    PubSubPublishRequest, PubSubPullMessagesRequest, PubSubPullMessagesResponse,
    PullMessagesRequests, PullMessagesResponses,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default per-topic buffer.
pub const DEFAULT_TOPIC_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Message {
    data: Bytes,
    content_type: Option<String>,
    metadata: Metadata,
}

#[derive(Debug)]
pub struct MemoryPubSub {
    topics: Mutex<HashMap<String, broadcast::Sender<Message>>>,
    unacknowledged: AtomicUsize,
    capacity: usize,
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl MemoryPubSub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker whose topics buffer up to `capacity` messages per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            unacknowledged: AtomicUsize::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Active subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Delivered messages not yet acknowledged, across live subscriptions.
    #[must_use]
    pub fn unacknowledged(&self) -> usize {
        self.unacknowledged.load(Ordering::Acquire)
    }

    fn topic(&self, name: &str) -> broadcast::Sender<Message> {
        self.topics
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

}

/// Ids delivered on one subscription and not yet acknowledged.
struct PendingAcks<'a> {
    broker: &'a MemoryPubSub,
    ids: HashSet<String>,
}

impl<'a> PendingAcks<'a> {
    fn new(broker: &'a MemoryPubSub) -> Self {
        Self {
            broker,
            ids: HashSet::new(),
        }
    }

    fn track(&mut self, id: String) {
        if self.ids.insert(id) {
            self.broker.unacknowledged.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn acknowledge(&mut self, request: PubSubPullMessagesRequest) {
        let Some(id) = request.ack_message_id else {
            debug!("[MemoryPubSub] Ignoring request without ack id");
            return;
        };
        if !self.ids.remove(&id) {
            debug!(message_id = %id, "[MemoryPubSub] Ack for message not delivered on this subscription");
            return;
        }
        self.broker.unacknowledged.fetch_sub(1, Ordering::AcqRel);
        if let Some(error) = request.ack_message_error {
            warn!(message_id = %id, error = %error, "[MemoryPubSub] Subscriber reported failure");
        }
    }
}

impl Drop for PendingAcks<'_> {
    fn drop(&mut self) {
        if !self.ids.is_empty() {
            debug!(released = self.ids.len(), "[MemoryPubSub] Releasing unacknowledged messages");
            self.broker
                .unacknowledged
                .fetch_sub(self.ids.len(), Ordering::AcqRel);
        }
    }
}

#[async_trait]
impl PluggableComponent for MemoryPubSub {
    async fn init(
        &self,
        request: MetadataRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), ComponentError> {
        info!(
            properties = request.properties.len(),
            "[MemoryPubSub] Initialized"
        );
        Ok(())
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn publish(
        &self,
        request: PubSubPublishRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), ComponentError> {
        let message = Message {
            data: request.data,
            content_type: request.content_type,
            metadata: request.metadata,
        };
        match self.topic(&request.topic).send(message) {
            Ok(subscribers) => debug!(topic = %request.topic, subscribers, "[MemoryPubSub] Published"),
            Err(_) => debug!(topic = %request.topic, "[MemoryPubSub] No subscribers, message dropped"),
        }
        Ok(())
    }

    async fn pull_messages(
        &self,
        mut requests: PullMessagesRequests,
        responses: PullMessagesResponses,
        cancel: CancellationToken,
    ) -> Result<(), ComponentError> {
        let first = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            first = requests.recv() => first,
        };
        let Some(first) = first else {
            return Ok(());
        };
        let topic = first
            .topic
            .ok_or_else(|| ComponentError::failed("first pull request must name a topic"))?;

        let mut receiver = self.topic(&topic.name).subscribe();
        let mut pending = PendingAcks::new(self);
        info!(topic = %topic.name, "[MemoryPubSub] Subscribed");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                request = requests.recv() => match request {
                    Some(request) => pending.acknowledge(request),
                    None => {
                        debug!(topic = %topic.name, "[MemoryPubSub] Subscriber closed its request stream");
                        return Ok(());
                    }
                },
                message = receiver.recv() => match message {
                    Ok(message) => {
                        let id = Uuid::new_v4().to_string();
                        pending.track(id.clone());
                        let delivery = PubSubPullMessagesResponse {
                            topic_name: topic.name.clone(),
                            id,
                            data: message.data,
                            content_type: message.content_type,
                            metadata: message.metadata,
                        };
                        if responses.send(delivery).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(topic = %topic.name, skipped, "[MemoryPubSub] Subscriber lagged");
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    async fn wait_for_subscriber(broker: &MemoryPubSub, topic: &str) {
        timeout(Duration::from_secs(5), async {
            while broker.subscriber_count(topic) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_dropped() {
        let broker = MemoryPubSub::new();
        broker
            .publish(
                PubSubPublishRequest {
                    topic: "orders".to_string(),
                    data: Bytes::from_static(b"lost"),
                    ..PubSubPublishRequest::default()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(broker.unacknowledged(), 0);
    }

    #[tokio::test]
    async fn test_deliver_and_acknowledge() {
        let broker = Arc::new(MemoryPubSub::new());
        let (req_tx, req_rx) = mpsc::channel(4);
        let (resp_tx, mut resp_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let subscription = tokio::spawn({
            let broker = Arc::clone(&broker);
            let cancel = cancel.clone();
            async move { broker.pull_messages(req_rx, resp_tx, cancel).await }
        });

        req_tx
            .send(PubSubPullMessagesRequest::subscribe("orders"))
            .await
            .unwrap();
        wait_for_subscriber(&broker, "orders").await;

        broker
            .publish(
                PubSubPublishRequest {
                    topic: "orders".to_string(),
                    data: Bytes::from_static(b"order-1"),
                    ..PubSubPublishRequest::default()
                },
                &cancel,
            )
            .await
            .unwrap();

        let delivered = timeout(Duration::from_secs(5), resp_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.topic_name, "orders");
        assert_eq!(delivered.data, Bytes::from_static(b"order-1"));
        assert_eq!(broker.unacknowledged(), 1);

        req_tx
            .send(PubSubPullMessagesRequest::ack(delivered.id))
            .await
            .unwrap();
        drop(req_tx);

        timeout(Duration::from_secs(5), subscription)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(broker.unacknowledged(), 0);
    }

    type Subscription = (
        mpsc::Sender<PubSubPullMessagesRequest>,
        tokio::task::JoinHandle<Result<(), ComponentError>>,
        PubSubPullMessagesResponse,
    );

    /// Subscribe to `topic`, publish once and return the delivery.
    async fn deliver_one(broker: &Arc<MemoryPubSub>, topic: &str) -> Subscription {
        let (req_tx, req_rx) = mpsc::channel(4);
        let (resp_tx, mut resp_rx) = mpsc::channel(4);
        let subscription = tokio::spawn({
            let broker = Arc::clone(broker);
            async move {
                broker
                    .pull_messages(req_rx, resp_tx, CancellationToken::new())
                    .await
            }
        });
        req_tx
            .send(PubSubPullMessagesRequest::subscribe(topic))
            .await
            .unwrap();
        wait_for_subscriber(broker, topic).await;
        broker
            .publish(
                PubSubPublishRequest {
                    topic: topic.to_string(),
                    data: Bytes::from_static(b"payload"),
                    ..PubSubPublishRequest::default()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let delivered = timeout(Duration::from_secs(5), resp_rx.recv())
            .await
            .unwrap()
            .unwrap();
        (req_tx, subscription, delivered)
    }

    #[tokio::test]
    async fn test_first_request_must_name_topic() {
        let broker = MemoryPubSub::new();
        let (req_tx, req_rx) = mpsc::channel(1);
        let (resp_tx, _resp_rx) = mpsc::channel(1);
        req_tx
            .send(PubSubPullMessagesRequest::ack("m-1"))
            .await
            .unwrap();

        let result = broker
            .pull_messages(req_rx, resp_tx, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ComponentError::Failed(_))));
    }

    #[tokio::test]
    async fn test_cancel_ends_subscription() {
        let broker = Arc::new(MemoryPubSub::new());
        let (req_tx, req_rx) = mpsc::channel(1);
        let (resp_tx, _resp_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        req_tx
            .send(PubSubPullMessagesRequest::subscribe("orders"))
            .await
            .unwrap();

        let subscription = tokio::spawn({
            let broker = Arc::clone(&broker);
            let cancel = cancel.clone();
            async move { broker.pull_messages(req_rx, resp_tx, cancel).await }
        });
        wait_for_subscriber(&broker, "orders").await;
        cancel.cancel();

        timeout(Duration::from_secs(5), subscription)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        drop(req_tx);
    }

    async fn close(subscription: Subscription) {
        let (req_tx, task, _) = subscription;
        drop(req_tx);
        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_releases_pending_ids() {
        let broker = Arc::new(MemoryPubSub::new());
        let subscription = deliver_one(&broker, "orders").await;
        assert_eq!(broker.unacknowledged(), 1);

        close(subscription).await;
        assert_eq!(broker.unacknowledged(), 0);
    }

    #[tokio::test]
    async fn test_ack_only_applies_to_own_subscription() {
        let broker = Arc::new(MemoryPubSub::new());
        let first = deliver_one(&broker, "orders").await;
        let second = deliver_one(&broker, "invoices").await;
        assert_eq!(broker.unacknowledged(), 2);

        second
            .0
            .send(PubSubPullMessagesRequest::ack(first.2.id.clone()))
            .await
            .unwrap();
        close(second).await;
        assert_eq!(broker.unacknowledged(), 1);

        first
            .0
            .send(PubSubPullMessagesRequest::ack(first.2.id.clone()))
            .await
            .unwrap();
        timeout(Duration::from_secs(5), async {
            while broker.unacknowledged() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        close(first).await;
    }
}
