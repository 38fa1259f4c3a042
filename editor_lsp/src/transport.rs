//! JSON-RPC transport layer for LSP communication.
//!
//! Handles framing of LSP messages. Outgoing frames are queued to a writer task
//! that owns the server's stdin; a reader task deframes its stdout. Decoded
//! messages are queued on a channel so the editor thread can read them without
//! blocking, and sending never waits on the runtime.

use crate::error::{LspError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Size of each read from the server's stdout.
const READ_BUFFER_SIZE: usize = 8192;

/// Largest body accepted in a single frame.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// JSON-RPC message types.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

/// JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC response.
///
/// `result` is `Some(Value::Null)` when the server sent an explicit null, and
/// `None` when the field was absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<JsonRpcError> for LspError {
    fn from(error: JsonRpcError) -> Self {
        LspError::Protocol {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

/// Request ID (can be number or string).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Serializes a message and prepends its `Content-Length` header.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let content = serde_json::to_vec(message).map_err(|source| LspError::Encode {
        what: "outgoing message",
        source,
    })?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", content.len()).into_bytes();
    frame.extend_from_slice(&content);
    Ok(frame)
}

/// Incremental `Content-Length` deframer.
///
/// Bytes may arrive split at any point; complete frames are yielded in order.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next complete frame, or returns `Ok(None)` if more bytes are needed.
    ///
    /// A malformed header block or body is consumed before the error is returned,
    /// so the caller can keep decoding subsequent frames.
    pub fn next_frame(&mut self) -> Result<Option<Value>> {
        let Some(header_end) = find(&self.buffer, HEADER_TERMINATOR) else {
            return Ok(None);
        };
        let body_start = header_end + HEADER_TERMINATOR.len();

        let content_length = match parse_content_length(&self.buffer[..header_end]) {
            Ok(len) => len,
            Err(e) => {
                self.buffer.drain(..body_start);
                return Err(e);
            }
        };
        if content_length > MAX_FRAME_BYTES {
            self.buffer.drain(..body_start);
            return Err(LspError::Frame(format!(
                "Content-Length {} exceeds maximum {}",
                content_length, MAX_FRAME_BYTES
            )));
        }

        let frame_end = body_start + content_length;
        if self.buffer.len() < frame_end {
            return Ok(None);
        }

        let body: Vec<u8> = self.buffer.drain(..frame_end).skip(body_start).collect();
        log::trace!("Received: {}", String::from_utf8_lossy(&body));
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| LspError::Frame(format!("invalid JSON body: {}", e)))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_content_length(headers: &[u8]) -> Result<usize> {
    let headers = std::str::from_utf8(headers)
        .map_err(|_| LspError::Frame("header block is not valid UTF-8".to_string()))?;

    let mut content_length = None;
    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        // Other headers (Content-Type) are ignored.
        if key.trim().eq_ignore_ascii_case("Content-Length") {
            content_length = Some(value.trim().parse::<usize>().map_err(|_| {
                LspError::Frame(format!("invalid Content-Length '{}'", value.trim()))
            })?);
        }
    }
    content_length.ok_or_else(|| LspError::Frame("missing Content-Length header".to_string()))
}

/// Reads the server's stdout until EOF, forwarding each decoded frame.
pub(crate) async fn read_loop<R>(mut stdout: R, inbound: Sender<Result<Value>>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) => {
                log::debug!("Language server closed its output stream");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                let _ = inbound.send(Err(LspError::Read(e)));
                return;
            }
        };

        decoder.extend(&buf[..n]);
        loop {
            match decoder.next_frame() {
                Ok(Some(message)) => {
                    if inbound.send(Ok(message)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    if inbound.send(Err(e)).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Writes queued frames to the server's stdin in order.
///
/// Stops when the queue is closed or a write fails.
pub(crate) async fn write_loop<W>(mut stdin: W, mut outbound: mpsc::UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        let written = async {
            stdin.write_all(&frame).await?;
            stdin.flush().await
        };
        if let Err(e) = written.await {
            log::warn!("Failed to write to language server: {}", e);
            return;
        }
    }
}

/// Framed JSON-RPC channel to one language server.
pub struct Transport {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Receiver<Result<Value>>,
}

impl Transport {
    /// Creates a transport queueing frames on `outbound` and reading them from `inbound`.
    pub(crate) fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: Receiver<Result<Value>>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Sends a JSON-RPC request.
    pub fn send_request(
        &mut self,
        id: impl Into<RequestId>,
        method: &str,
        params: Option<Value>,
    ) -> Result<()> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.to_string(),
            params,
        };
        self.send_message(&request)
    }

    /// Sends a JSON-RPC notification.
    pub fn send_notification(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        };
        self.send_message(&notification)
    }

    /// Sends an error response to a server-to-client request.
    pub fn send_error_response(&mut self, id: RequestId, error: JsonRpcError) -> Result<()> {
        let response = JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        };
        self.send_message(&response)
    }

    fn send_message<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let frame = encode_frame(message)?;
        log::trace!("Sent: {}", String::from_utf8_lossy(&frame));
        self.outbound.send(frame).map_err(|_| {
            LspError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "language server input is closed",
            ))
        })
    }

    /// Returns the next decoded message without blocking.
    ///
    /// Fails with [`LspError::WouldBlock`] when no complete frame is available.
    pub fn read_next(&self) -> Result<Value> {
        match self.inbound.try_recv() {
            Ok(message) => message,
            Err(TryRecvError::Empty) => Err(LspError::WouldBlock),
            Err(TryRecvError::Disconnected) => Err(LspError::Disconnected),
        }
    }

    /// Waits up to `timeout` for output, then returns one decoded message.
    pub fn read_timeout(&self, timeout: Duration) -> Result<Value> {
        match self.inbound.recv_timeout(timeout) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => Err(LspError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(LspError::Disconnected),
        }
    }
}
