//! # Service Dispatch Contract
//!
//! An [`RpcService`] serves one named service (e.g.
//! `dapr.proto.components.v1.StateStore`). The connection layer decodes
//! frames, builds a [`CallContext`] and hands each call to the service by
//! method name. Payloads stay as JSON values until the service decodes them
//! into its own message types with [`decode`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::CallContext;
use crate::status::Status;

/// Shape of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// One request, one response.
    Unary,
    /// Request and response streams open concurrently.
    Streaming,
}

/// Inbound messages of a streaming call.
#[derive(Debug)]
pub struct RequestStream {
    rx: mpsc::Receiver<Value>,
}

impl RequestStream {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<Value>) -> Self {
        Self { rx }
    }

    /// Next request message, `Ok(None)` once the client half-closes.
    pub async fn message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, Status> {
        match self.rx.recv().await {
            Some(value) => decode(value).map(Some),
            None => Ok(None),
        }
    }
}

/// Outbound messages of a streaming call.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    tx: mpsc::Sender<Value>,
}

impl ResponseSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Value>) -> Self {
        Self { tx }
    }

    /// Send one response. Fails with `Cancelled` when the caller is gone.
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), Status> {
        let value = encode(message)?;
        self.tx
            .send(value)
            .await
            .map_err(|_| Status::cancelled("response stream closed"))
    }
}

/// One named RPC service.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    /// Fully qualified service name.
    fn service_name(&self) -> &'static str;

    /// Kind of `method`, or `None` if the service has no such method.
    fn method_kind(&self, method: &str) -> Option<MethodKind>;

    async fn call_unary(
        &self,
        method: &str,
        request: Value,
        ctx: CallContext,
    ) -> Result<Value, Status>;

    async fn call_streaming(
        &self,
        method: &str,
        _requests: RequestStream,
        _responses: ResponseSink,
        _ctx: CallContext,
    ) -> Result<(), Status> {
        Err(Status::unimplemented(format!(
            "{}/{method} is not a streaming method",
            self.service_name()
        )))
    }
}

/// Decode a request payload. Malformed input is the caller's fault.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Status> {
    serde_json::from_value(value).map_err(|e| Status::invalid_argument(e.to_string()))
}

/// Encode a response payload.
pub fn encode<T: Serialize>(message: &T) -> Result<Value, Status> {
    serde_json::to_value(message).map_err(|e| Status::internal(e.to_string()))
}
