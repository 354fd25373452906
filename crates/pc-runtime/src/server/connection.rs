//! One client connection: frame decoding, call dispatch, reply writing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use pc_proto::frame::write_frame;
use pc_proto::{
    CallContext, CallId, ClientFrame, Code, FrameReader, MethodKind, RequestStream, ResponseSink,
    RpcService, ServerFrame, Status,
};
use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ConnectionLimits, ServiceRouter};

/// Bookkeeping for a call that has not yet sent its status.
struct ActiveCall {
    cancel: CancellationToken,
    /// Request channel of a streaming call; `None` once half-closed.
    inbound: Option<mpsc::Sender<Value>>,
    /// Set before `cancel` when the call stopped draining its requests.
    overflowed: Arc<AtomicBool>,
}

struct Connection {
    router: Arc<ServiceRouter>,
    limits: ConnectionLimits,
    calls: Arc<DashMap<CallId, ActiveCall>>,
    permits: Arc<Semaphore>,
    outbound: mpsc::Sender<ServerFrame>,
    cancel: CancellationToken,
}

pub(super) async fn handle_connection(
    stream: UnixStream,
    router: Arc<ServiceRouter>,
    limits: ConnectionLimits,
    cancel: CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let (outbound, mut outbound_rx) = mpsc::channel::<ServerFrame>(limits.stream_channel_capacity);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = write_frame(&mut write_half, &frame).await {
                debug!(error = %e, "Connection write failed");
                break;
            }
        }
    });

    let connection = Connection {
        router,
        limits,
        calls: Arc::new(DashMap::new()),
        permits: Arc::new(Semaphore::new(limits.max_in_flight_calls)),
        outbound,
        cancel,
    };

    let mut reader = FrameReader::new(BufReader::new(read_half), limits.max_frame_size);
    loop {
        let frame = tokio::select! {
            _ = connection.cancel.cancelled() => break,
            frame = reader.next_frame::<ClientFrame>() => frame,
        };
        match frame {
            Ok(Some(frame)) => connection.dispatch(frame).await,
            Ok(None) => {
                debug!("Connection closed by client");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Dropping connection after bad frame");
                break;
            }
        }
    }

    // Every call token is a child of this one.
    connection.cancel.cancel();
    drop(connection);
    let _ = writer.await;
}

impl Connection {
    async fn dispatch(&self, frame: ClientFrame) {
        match frame {
            ClientFrame::Call {
                id,
                service,
                method,
                metadata,
                payload,
            } => self.start_call(id, service, method, metadata, payload).await,
            ClientFrame::Message { id, payload } => self.forward_message(id, payload),
            ClientFrame::HalfClose { id } => {
                if let Some(mut call) = self.calls.get_mut(&id) {
                    call.inbound = None;
                }
            }
            ClientFrame::Cancel { id } => {
                if let Some(call) = self.calls.get(&id) {
                    call.cancel.cancel();
                }
            }
        }
    }

    /// Hand a request to its streaming call without ever waiting. A call whose
    /// channel is full is failed with `RESOURCE_EXHAUSTED` so the reader keeps
    /// serving the other calls on this connection.
    fn forward_message(&self, id: CallId, payload: Value) {
        let Some(mut call) = self.calls.get_mut(&id) else {
            debug!(call_id = id, "Message for unknown call");
            return;
        };
        let Some(sender) = call.inbound.as_ref() else {
            debug!(call_id = id, "Message for half-closed call");
            return;
        };
        match sender.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                debug!(call_id = id, "Streaming call no longer reads requests");
            }
            Err(TrySendError::Full(_)) => {
                warn!(call_id = id, "Streaming call request backlog full, failing call");
                call.inbound = None;
                call.overflowed.store(true, Ordering::Release);
                call.cancel.cancel();
            }
        }
    }

    async fn start_call(
        &self,
        id: CallId,
        service_name: String,
        method: String,
        metadata: std::collections::HashMap<String, String>,
        payload: Option<Value>,
    ) {
        if self.calls.contains_key(&id) {
            self.reject(id, Status::invalid_argument(format!("call id {id} already in use")))
                .await;
            return;
        }
        let Some(service) = self.router.get(&service_name).cloned() else {
            self.reject(id, Status::unimplemented(format!("unknown service {service_name}")))
                .await;
            return;
        };
        let Some(kind) = service.method_kind(&method) else {
            self.reject(
                id,
                Status::unimplemented(format!("unknown method {service_name}/{method}")),
            )
            .await;
            return;
        };
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            self.reject(id, Status::unavailable("too many in-flight calls"))
                .await;
            return;
        };

        let token = self.cancel.child_token();
        let overflowed = Arc::new(AtomicBool::new(false));
        let ctx = CallContext::new(metadata, token.clone());
        let call = CallTask {
            id,
            service,
            method,
            token: token.clone(),
            overflowed: Arc::clone(&overflowed),
            calls: Arc::clone(&self.calls),
            outbound: self.outbound.clone(),
            _permit: permit,
        };

        match kind {
            MethodKind::Unary => {
                self.calls.insert(
                    id,
                    ActiveCall {
                        cancel: token,
                        inbound: None,
                        overflowed,
                    },
                );
                let request = payload.unwrap_or_else(|| Value::Object(Default::default()));
                tokio::spawn(call.run_unary(request, ctx));
            }
            MethodKind::Streaming => {
                let capacity = self.limits.stream_channel_capacity;
                let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
                if let Some(first) = payload {
                    // Fresh channel with capacity >= 1; cannot be full.
                    let _ = inbound_tx.try_send(first);
                }
                self.calls.insert(
                    id,
                    ActiveCall {
                        cancel: token,
                        inbound: Some(inbound_tx),
                        overflowed,
                    },
                );
                tokio::spawn(call.run_streaming(RequestStream::new(inbound_rx), capacity, ctx));
            }
        }
    }

    async fn reject(&self, id: CallId, status: Status) {
        debug!(call_id = id, code = %status.code, message = %status.message, "Call rejected");
        let _ = self.outbound.send(ServerFrame::status(id, Err(status))).await;
    }
}

/// Everything a spawned call needs once dispatched.
struct CallTask {
    id: CallId,
    service: Arc<dyn RpcService>,
    method: String,
    token: CancellationToken,
    overflowed: Arc<AtomicBool>,
    calls: Arc<DashMap<CallId, ActiveCall>>,
    outbound: mpsc::Sender<ServerFrame>,
    _permit: OwnedSemaphorePermit,
}

impl CallTask {
    fn cancelled_status(&self) -> Status {
        if self.overflowed.load(Ordering::Acquire) {
            Status::resource_exhausted("request backlog full")
        } else {
            Status::cancelled("call cancelled")
        }
    }

    async fn run_unary(self, request: Value, ctx: CallContext) {
        let result = tokio::select! {
            _ = self.token.cancelled() => Err(self.cancelled_status()),
            result = self.service.call_unary(&self.method, request, ctx) => result,
        };

        let result = match result {
            Ok(payload) => self
                .outbound
                .send(ServerFrame::Reply {
                    id: self.id,
                    payload,
                })
                .await
                .map_err(|_| Status::cancelled("connection closed")),
            Err(status) => Err(status),
        };
        self.finish(result).await;
    }

    async fn run_streaming(self, requests: RequestStream, capacity: usize, ctx: CallContext) {
        let (response_tx, mut response_rx) = mpsc::channel(capacity);

        let call = async {
            tokio::select! {
                _ = self.token.cancelled() => Err(self.cancelled_status()),
                result = self.service.call_streaming(
                    &self.method,
                    requests,
                    ResponseSink::new(response_tx),
                    ctx,
                ) => result,
            }
        };
        let forward = async {
            while let Some(payload) = response_rx.recv().await {
                let reply = ServerFrame::Reply {
                    id: self.id,
                    payload,
                };
                if self.outbound.send(reply).await.is_err() {
                    break;
                }
            }
        };

        let (result, ()) = tokio::join!(call, forward);
        self.finish(result).await;
    }

    async fn finish(self, result: Result<(), Status>) {
        self.calls.remove(&self.id);
        let code = result.as_ref().err().map_or(Code::Ok, |status| status.code);
        pc_telemetry::COMPONENT_CALLS
            .with_label_values(&[self.service.service_name(), &self.method, code.as_str()])
            .inc();
        debug!(
            call_id = self.id,
            service = self.service.service_name(),
            method = %self.method,
            code = %code,
            "Call finished"
        );
        let _ = self.outbound.send(ServerFrame::status(self.id, result)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pc_proto::frame::write_frame;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::BufReader;
    use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// `Echo` replies at once and `Hang` waits for cancellation. `Count`
    /// streams back the number of messages it read, `Stall` never reads.
    struct Scripted;

    #[async_trait]
    impl RpcService for Scripted {
        fn service_name(&self) -> &'static str {
            "scripted"
        }

        fn method_kind(&self, method: &str) -> Option<MethodKind> {
            match method {
                "Echo" | "Hang" => Some(MethodKind::Unary),
                "Count" | "Stall" => Some(MethodKind::Streaming),
                _ => None,
            }
        }

        async fn call_unary(
            &self,
            method: &str,
            request: Value,
            ctx: CallContext,
        ) -> Result<Value, Status> {
            if method == "Hang" {
                ctx.cancellation().cancelled().await;
                return Err(Status::cancelled("hang cancelled"));
            }
            Ok(request)
        }

        async fn call_streaming(
            &self,
            method: &str,
            mut requests: RequestStream,
            responses: ResponseSink,
            ctx: CallContext,
        ) -> Result<(), Status> {
            if method == "Stall" {
                ctx.cancellation().cancelled().await;
                return Err(Status::cancelled("stall cancelled"));
            }
            let mut count = 0;
            while requests.message::<Value>().await?.is_some() {
                count += 1;
            }
            responses.send(&json!({ "count": count })).await
        }
    }

    struct Peer {
        reader: FrameReader<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl Peer {
        async fn send(&mut self, frame: ClientFrame) {
            write_frame(&mut self.writer, &frame).await.unwrap();
        }

        async fn next(&mut self) -> ServerFrame {
            timeout(WAIT, self.reader.next_frame::<ServerFrame>())
                .await
                .unwrap()
                .unwrap()
                .unwrap()
        }
    }

    fn call(id: CallId, method: &str, payload: Option<Value>) -> ClientFrame {
        ClientFrame::Call {
            id,
            service: "scripted".to_string(),
            method: method.to_string(),
            metadata: Default::default(),
            payload,
        }
    }

    fn start(max_in_flight_calls: usize) -> (Peer, CancellationToken) {
        let (server, client) = UnixStream::pair().unwrap();
        let router = Arc::new(ServiceRouter::new(vec![Arc::new(Scripted) as Arc<dyn RpcService>]));
        let limits = ConnectionLimits {
            max_frame_size: 64 * 1024,
            max_in_flight_calls,
            stream_channel_capacity: 4,
        };
        let cancel = CancellationToken::new();
        tokio::spawn(handle_connection(server, router, limits, cancel.clone()));

        let (read_half, writer) = client.into_split();
        let peer = Peer {
            reader: FrameReader::new(BufReader::new(read_half), 64 * 1024),
            writer,
        };
        (peer, cancel)
    }

    fn status_code(frame: &ServerFrame) -> Option<Code> {
        match frame {
            ServerFrame::Status { code, .. } => Some(*code),
            ServerFrame::Reply { .. } => None,
        }
    }

    #[tokio::test]
    async fn test_unary_reply_then_status() {
        let (mut peer, _cancel) = start(8);
        peer.send(call(1, "Echo", Some(json!({ "x": 1 })))).await;

        assert_eq!(
            peer.next().await,
            ServerFrame::Reply {
                id: 1,
                payload: json!({ "x": 1 })
            }
        );
        assert_eq!(status_code(&peer.next().await), Some(Code::Ok));
    }

    #[tokio::test]
    async fn test_unknown_method_unimplemented() {
        let (mut peer, _cancel) = start(8);
        peer.send(call(1, "Nope", None)).await;
        assert_eq!(status_code(&peer.next().await), Some(Code::Unimplemented));
    }

    #[tokio::test]
    async fn test_in_flight_limit_and_duplicate_ids() {
        let (mut peer, _cancel) = start(1);
        peer.send(call(1, "Hang", None)).await;
        peer.send(call(1, "Echo", None)).await;
        let frame = peer.next().await;
        assert_eq!(frame.id(), 1);
        assert_eq!(status_code(&frame), Some(Code::InvalidArgument));

        peer.send(call(2, "Echo", None)).await;
        let frame = peer.next().await;
        assert_eq!(frame.id(), 2);
        assert_eq!(status_code(&frame), Some(Code::Unavailable));

        peer.send(ClientFrame::Cancel { id: 1 }).await;
        let frame = peer.next().await;
        assert_eq!(frame.id(), 1);
        assert_eq!(status_code(&frame), Some(Code::Cancelled));
    }

    #[tokio::test]
    async fn test_streaming_counts_until_half_close() {
        let (mut peer, _cancel) = start(8);
        peer.send(call(7, "Count", Some(json!("first")))).await;
        peer.send(ClientFrame::Message {
            id: 7,
            payload: json!("second"),
        })
        .await;
        peer.send(ClientFrame::HalfClose { id: 7 }).await;

        assert_eq!(
            peer.next().await,
            ServerFrame::Reply {
                id: 7,
                payload: json!({ "count": 2 })
            }
        );
        assert_eq!(status_code(&peer.next().await), Some(Code::Ok));
    }

    #[tokio::test]
    async fn test_connection_cancel_ends_calls() {
        let (mut peer, cancel) = start(8);
        peer.send(call(3, "Hang", None)).await;
        // Frames dispatch in order, so once Echo answers, Hang is running.
        peer.send(call(4, "Echo", None)).await;
        assert_eq!(peer.next().await.id(), 4);
        assert_eq!(status_code(&peer.next().await), Some(Code::Ok));
        cancel.cancel();

        let frame = peer.next().await;
        assert_eq!(frame.id(), 3);
        assert_eq!(status_code(&frame), Some(Code::Cancelled));
    }

    #[tokio::test]
    async fn test_stalled_stream_does_not_block_connection() {
        let (mut peer, _cancel) = start(8);
        peer.send(call(9, "Stall", None)).await;
        for n in 0..16 {
            peer.send(ClientFrame::Message {
                id: 9,
                payload: json!(n),
            })
            .await;
        }
        peer.send(ClientFrame::Cancel { id: 9 }).await;
        peer.send(call(10, "Echo", Some(json!("still here")))).await;

        let mut stalled = None;
        let mut echoed = None;
        while stalled.is_none() || echoed.is_none() {
            let frame = peer.next().await;
            match (frame.id(), status_code(&frame)) {
                (9, Some(code)) => stalled = Some(code),
                (10, Some(code)) => echoed = Some(code),
                (10, None) => assert_eq!(
                    frame,
                    ServerFrame::Reply {
                        id: 10,
                        payload: json!("still here")
                    }
                ),
                _ => panic!("unexpected frame {frame:?}"),
            }
        }
        assert_eq!(stalled, Some(Code::ResourceExhausted));
        assert_eq!(echoed, Some(Code::Ok));
    }
}
