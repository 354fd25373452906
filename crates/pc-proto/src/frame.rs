//! # Connection Framing
//!
//! Newline-delimited JSON frames over a Unix stream. Each connection carries
//! any number of concurrent calls, told apart by a client-chosen `id`.
//!
//! ```text
//!  client                                host
//!    │── call {id, service, method} ──────▶│
//!    │── message {id, payload} ──────────▶│   streaming calls only
//!    │── half_close {id} ────────────────▶│
//!    │◀────────────── reply {id, payload} ─│   zero or more
//!    │◀────────────── status {id, code} ───│   exactly one, always last
//! ```
//!
//! `cancel {id}` aborts an in-flight call; dropping the connection aborts
//! all of them.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;
use crate::status::{Code, Status};

/// Identifies one call within a connection.
pub type CallId = u64;

/// Frames sent by the sidecar (or any client) to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Opens a call. Unary calls carry their request in `payload`.
    Call {
        id: CallId,
        service: String,
        method: String,
        #[serde(default)]
        metadata: HashMap<String, String>,
        #[serde(default)]
        payload: Option<Value>,
    },
    /// One request message of a streaming call.
    Message { id: CallId, payload: Value },
    /// No more request messages will follow for this call.
    HalfClose { id: CallId },
    /// Abort the call.
    Cancel { id: CallId },
}

/// Frames sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply {
        id: CallId,
        payload: Value,
    },
    Status {
        id: CallId,
        code: Code,
        #[serde(default)]
        message: String,
    },
}

impl ServerFrame {
    #[must_use]
    pub fn id(&self) -> CallId {
        match self {
            Self::Reply { id, .. } | Self::Status { id, .. } => *id,
        }
    }

    /// Final frame for a call that ended with `result`.
    #[must_use]
    pub fn status(id: CallId, result: Result<(), Status>) -> Self {
        match result {
            Ok(()) => Self::Status {
                id,
                code: Code::Ok,
                message: String::new(),
            },
            Err(status) => Self::Status {
                id,
                code: status.code,
                message: status.message,
            },
        }
    }
}

/// Reads one frame per line, refusing lines longer than `max_frame_size`.
pub struct FrameReader<R> {
    reader: R,
    max_frame_size: usize,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_size: usize) -> Self {
        Self {
            reader,
            max_frame_size,
            buf: Vec::new(),
        }
    }

    /// Next frame, or `None` on a clean end of stream.
    pub async fn next_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        loop {
            self.buf.clear();
            let limit = self.max_frame_size as u64 + 1;
            let read = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if read == 0 {
                return Ok(None);
            }

            let terminated = self.buf.last() == Some(&b'\n');
            if terminated {
                self.buf.pop();
            }
            if self.buf.len() > self.max_frame_size {
                return Err(TransportError::FrameTooLarge {
                    max: self.max_frame_size,
                });
            }
            if !terminated {
                return Err(TransportError::Truncated);
            }

            let line = trim_ascii_whitespace(&self.buf);
            if line.is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_slice(line)?));
        }
    }
}

/// Serialize `frame` as one line and flush it.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    #[test]
    fn test_call_frame_shape() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "kind": "call",
            "id": 7,
            "service": "dapr.proto.components.v1.StateStore",
            "method": "Get",
            "payload": { "key": "a" }
        }))
        .unwrap();

        match frame {
            ClientFrame::Call {
                id,
                method,
                metadata,
                payload,
                ..
            } => {
                assert_eq!(id, 7);
                assert_eq!(method, "Get");
                assert!(metadata.is_empty());
                assert_eq!(payload, Some(json!({ "key": "a" })));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_status_frame_from_result() {
        let ok = ServerFrame::status(3, Ok(()));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "kind": "status", "id": 3, "code": "OK", "message": "" })
        );

        let failed = ServerFrame::status(4, Err(Status::internal("boom")));
        assert_eq!(failed.id(), 4);
        assert!(matches!(
            failed,
            ServerFrame::Status { code: Code::Internal, .. }
        ));
    }

    #[tokio::test]
    async fn test_reader_splits_lines_and_skips_blanks() {
        let input = b"{\"kind\":\"half_close\",\"id\":1}\n\n{\"kind\":\"cancel\",\"id\":2}\n";
        let mut reader = FrameReader::new(BufReader::new(&input[..]), 1024);

        let first: ClientFrame = reader.next_frame().await.unwrap().unwrap();
        let second: ClientFrame = reader.next_frame().await.unwrap().unwrap();
        let end: Option<ClientFrame> = reader.next_frame().await.unwrap();

        assert_eq!(first, ClientFrame::HalfClose { id: 1 });
        assert_eq!(second, ClientFrame::Cancel { id: 2 });
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_reader_rejects_oversized_frame() {
        let input = format!("{}\n", "x".repeat(64));
        let mut reader = FrameReader::new(BufReader::new(input.as_bytes()), 16);

        let result: Result<Option<ClientFrame>, _> = reader.next_frame().await;
        assert!(matches!(result, Err(TransportError::FrameTooLarge { max: 16 })));
    }

    #[tokio::test]
    async fn test_reader_rejects_truncated_frame() {
        let mut reader = FrameReader::new(BufReader::new(&b"{\"kind\":\"cancel\""[..]), 1024);
        let result: Result<Option<ClientFrame>, _> = reader.next_frame().await;
        assert!(matches!(result, Err(TransportError::Truncated)));
    }

    #[tokio::test]
    async fn test_write_frame_appends_newline() {
        let mut out = Vec::new();
        write_frame(&mut out, &ClientFrame::Cancel { id: 9 })
            .await
            .unwrap();
        assert_eq!(out, b"{\"kind\":\"cancel\",\"id\":9}\n");
    }
}
