//! # `dapr.proto.components.v1.PubSub` adaptor
//!
//! `PullMessages` runs three futures for one call:
//!
//! ```text
//!   RequestStream ──inbound loop──▶ mpsc ──▶ PubSub::pull_messages ──▶ mpsc ──outbound loop──▶ ResponseSink
//! ```
//!
//! - The inbound loop translates subscribe/ack messages. When the client
//!   half-closes it closes the domain's request channel and finishes quietly.
//! - The outbound loop forwards domain messages until the domain drops its
//!   sender, then drains what is queued.
//! - The call ends when the domain and outbound loop have both finished, or
//!   as soon as any of the three fails, or when the call is cancelled. The
//!   remaining futures are dropped and the domain's token is cancelled.

use std::sync::Arc;

use async_trait::async_trait;
use pc_components::{
    MetadataRequest, PubSub, PubSubPublishRequest, PubSubPullMessagesRequest,
    PubSubPullMessagesResponse, PubSubPullMessagesTopic,
};
use pc_proto::messages::{
    FeaturesResponse, InitRequest, InitResponse, PingResponse, PublishRequest, PublishResponse,
    PullMessagesRequest, PullMessagesResponse,
};
use pc_proto::{
    decode, encode, CallContext, MethodKind, RequestStream, ResponseSink, RpcService, Status,
    PUB_SUB_SERVICE,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::convert::non_empty;
use super::{resolve, to_status, unknown_method};
use crate::providers::ComponentProvider;

pub struct PubSubAdaptor {
    provider: Arc<dyn ComponentProvider<dyn PubSub>>,
    channel_capacity: usize,
}

impl PubSubAdaptor {
    pub fn new(provider: Arc<dyn ComponentProvider<dyn PubSub>>, channel_capacity: usize) -> Self {
        Self {
            provider,
            channel_capacity: channel_capacity.max(1),
        }
    }

    async fn init(&self, request: InitRequest, ctx: &CallContext) -> Result<InitResponse, Status> {
        let pubsub = resolve(self.provider.as_ref(), ctx).await?;
        pubsub
            .init(
                MetadataRequest {
                    properties: request.metadata.properties,
                },
                ctx.cancellation(),
            )
            .await
            .map_err(to_status)?;
        Ok(InitResponse {})
    }

    async fn features(&self, ctx: &CallContext) -> Result<FeaturesResponse, Status> {
        let pubsub = resolve(self.provider.as_ref(), ctx).await?;
        let features = pubsub.features(ctx.cancellation()).await.map_err(to_status)?;
        Ok(FeaturesResponse { features })
    }

    async fn ping(&self, ctx: &CallContext) -> Result<PingResponse, Status> {
        let pubsub = resolve(self.provider.as_ref(), ctx).await?;
        pubsub.ping(ctx.cancellation()).await.map_err(to_status)?;
        Ok(PingResponse {})
    }

    async fn publish(
        &self,
        request: PublishRequest,
        ctx: &CallContext,
    ) -> Result<PublishResponse, Status> {
        let pubsub = resolve(self.provider.as_ref(), ctx).await?;
        pubsub
            .publish(
                PubSubPublishRequest {
                    pubsub_name: request.pubsub_name,
                    topic: request.topic,
                    data: request.data,
                    content_type: non_empty(request.content_type),
                    metadata: request.metadata,
                },
                ctx.cancellation(),
            )
            .await
            .map_err(to_status)?;
        Ok(PublishResponse {})
    }

    async fn pull_messages(
        &self,
        mut requests: RequestStream,
        responses: ResponseSink,
        ctx: CallContext,
    ) -> Result<(), Status> {
        let pubsub = resolve(self.provider.as_ref(), &ctx).await?;
        let cancel = ctx.cancellation().child_token();

        let (inbound_tx, inbound_rx) = mpsc::channel(self.channel_capacity);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(self.channel_capacity);

        let inbound = async move {
            while let Some(request) = requests.message::<PullMessagesRequest>().await? {
                if inbound_tx.send(request_from_wire(request)).await.is_err() {
                    // Domain stopped reading; nothing left to deliver.
                    break;
                }
            }
            Ok::<(), Status>(())
        };

        let domain_cancel = cancel.clone();
        let domain = async move {
            pubsub
                .pull_messages(inbound_rx, outbound_tx, domain_cancel)
                .await
                .map_err(to_status)
        };

        let outbound = async move {
            while let Some(message) = outbound_rx.recv().await {
                responses.send(&response_to_wire(message)).await?;
            }
            Ok::<(), Status>(())
        };

        tokio::pin!(inbound, domain, outbound);
        let mut inbound_done = false;
        let mut domain_done = false;

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break Err(Status::cancelled("pull messages cancelled"));
                }
                result = &mut inbound, if !inbound_done => match result {
                    Ok(()) => {
                        debug!("Subscriber half-closed");
                        inbound_done = true;
                    }
                    Err(status) => break Err(status),
                },
                result = &mut domain, if !domain_done => match result {
                    Ok(()) => domain_done = true,
                    Err(status) => break Err(status),
                },
                result = &mut outbound => break result,
            }
        };

        cancel.cancel();
        info!(ok = result.is_ok(), "Pull messages stream ended");
        result
    }
}

fn request_from_wire(request: PullMessagesRequest) -> PubSubPullMessagesRequest {
    PubSubPullMessagesRequest {
        ack_message_id: non_empty(request.ack_message_id),
        ack_message_error: request.ack_error.map(|error| error.message),
        topic: request.topic.map(|topic| PubSubPullMessagesTopic {
            name: topic.name,
            metadata: topic.metadata,
        }),
    }
}

fn response_to_wire(response: PubSubPullMessagesResponse) -> PullMessagesResponse {
    PullMessagesResponse {
        data: response.data,
        topic_name: response.topic_name,
        metadata: response.metadata,
        content_type: response.content_type.unwrap_or_default(),
        id: response.id,
    }
}

#[async_trait]
impl RpcService for PubSubAdaptor {
    fn service_name(&self) -> &'static str {
        PUB_SUB_SERVICE
    }

    fn method_kind(&self, method: &str) -> Option<MethodKind> {
        match method {
            "Init" | "Features" | "Publish" | "Ping" => Some(MethodKind::Unary),
            "PullMessages" => Some(MethodKind::Streaming),
            _ => None,
        }
    }

    async fn call_unary(
        &self,
        method: &str,
        request: Value,
        ctx: CallContext,
    ) -> Result<Value, Status> {
        match method {
            "Init" => encode(&self.init(decode(request)?, &ctx).await?),
            "Features" => encode(&self.features(&ctx).await?),
            "Publish" => encode(&self.publish(decode(request)?, &ctx).await?),
            "Ping" => encode(&self.ping(&ctx).await?),
            other => Err(unknown_method(PUB_SUB_SERVICE, other)),
        }
    }

    async fn call_streaming(
        &self,
        method: &str,
        requests: RequestStream,
        responses: ResponseSink,
        ctx: CallContext,
    ) -> Result<(), Status> {
        match method {
            "PullMessages" => self.pull_messages(requests, responses, ctx).await,
            other => Err(unknown_method(PUB_SUB_SERVICE, other)),
        }
    }
}
