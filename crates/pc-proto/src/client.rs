//! # Component Client
//!
//! Minimal client for the framing in [`crate::frame`]. It plays the sidecar's
//! role in integration tests and tooling: one connection, many concurrent
//! calls, replies routed back by call id.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::BufReader;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::TransportError;
use crate::frame::{write_frame, CallId, ClientFrame, FrameReader, ServerFrame};
use crate::status::{Code, Status};

/// Largest frame the client accepts from the host.
pub const CLIENT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

type Pending = Arc<DashMap<CallId, mpsc::UnboundedSender<ServerFrame>>>;

/// One connection to a component socket.
pub struct ComponentClient {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    pending: Pending,
    next_id: AtomicU64,
    reader_task: JoinHandle<()>,
}

impl ComponentClient {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path).await?;
        let (read_half, write_half) = stream.into_split();
        let pending: Pending = Arc::new(DashMap::new());

        let reader_task = tokio::spawn(route_replies(
            FrameReader::new(BufReader::new(read_half), CLIENT_MAX_FRAME_SIZE),
            Arc::clone(&pending),
        ));

        Ok(Self {
            writer: Arc::new(Mutex::new(write_half)),
            pending,
            next_id: AtomicU64::new(1),
            reader_task,
        })
    }

    /// Issue a unary call and decode its single reply.
    pub async fn call_unary<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        metadata: HashMap<String, String>,
        request: &Req,
    ) -> Result<Resp, TransportError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let mut call = self.open(service, method, metadata, Some(payload)).await?;

        let reply = call.message::<Resp>().await?;
        // Drain to the status frame so failures after a reply surface too.
        while call.message::<serde_json::Value>().await?.is_some() {}
        reply.ok_or_else(|| TransportError::UnexpectedFrame("status without reply".to_string()))
    }

    /// Open a streaming call.
    pub async fn open_stream(
        &self,
        service: &str,
        method: &str,
        metadata: HashMap<String, String>,
    ) -> Result<ClientCall, TransportError> {
        self.open(service, method, metadata, None).await
    }

    async fn open(
        &self,
        service: &str,
        method: &str,
        metadata: HashMap<String, String>,
        payload: Option<serde_json::Value>,
    ) -> Result<ClientCall, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.insert(id, tx);

        let frame = ClientFrame::Call {
            id,
            service: service.to_string(),
            method: method.to_string(),
            metadata,
            payload,
        };
        if let Err(e) = write_frame(&mut *self.writer.lock().await, &frame).await {
            self.pending.remove(&id);
            return Err(e);
        }

        Ok(ClientCall {
            id,
            writer: Arc::clone(&self.writer),
            rx,
            finished: false,
        })
    }
}

impl Drop for ComponentClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Client side of one call.
pub struct ClientCall {
    id: CallId,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    rx: mpsc::UnboundedReceiver<ServerFrame>,
    finished: bool,
}

impl ClientCall {
    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Send one request message on a streaming call.
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), TransportError> {
        let frame = ClientFrame::Message {
            id: self.id,
            payload: serde_json::to_value(message)?,
        };
        self.write(&frame).await
    }

    /// Signal that no more request messages follow.
    pub async fn half_close(&self) -> Result<(), TransportError> {
        self.write(&ClientFrame::HalfClose { id: self.id }).await
    }

    /// Abort the call.
    pub async fn cancel(&self) -> Result<(), TransportError> {
        self.write(&ClientFrame::Cancel { id: self.id }).await
    }

    /// Next reply. `Ok(None)` once the call finished with `OK`; a non-OK
    /// status is returned as [`TransportError::Rpc`].
    pub async fn message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(ServerFrame::Reply { payload, .. }) => Ok(Some(serde_json::from_value(payload)?)),
            Some(ServerFrame::Status { code, message, .. }) => {
                self.finished = true;
                if code == Code::Ok {
                    Ok(None)
                } else {
                    Err(TransportError::Rpc(Status::new(code, message)))
                }
            }
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn write(&self, frame: &ClientFrame) -> Result<(), TransportError> {
        write_frame(&mut *self.writer.lock().await, frame).await
    }
}

async fn route_replies<R>(mut reader: FrameReader<R>, pending: Pending)
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        match reader.next_frame::<ServerFrame>().await {
            Ok(Some(frame)) => {
                let id = frame.id();
                let last = matches!(frame, ServerFrame::Status { .. });
                if let Some(tx) = pending.get(&id) {
                    let _ = tx.send(frame);
                }
                if last {
                    pending.remove(&id);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Client connection read failed");
                break;
            }
        }
    }
    // Wake every waiting call with ConnectionClosed.
    pending.clear();
}
