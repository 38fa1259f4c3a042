//! JSON-RPC request/notification client over a server process.

use crate::error::{LspError, Result};
use crate::process::ServerProcess;
use crate::transport::{JsonRpcError, RequestId};
use serde_json::Value;
use std::time::Duration;

/// JSON-RPC error code for methods the client does not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Issues requests and notifications to one language server.
///
/// Calls must be serialized: the client performs exactly one bounded read per
/// poll and never retries on its own.
pub struct RpcClient {
    process: ServerProcess,
    next_id: i64,
    poll_timeout: Duration,
}

impl RpcClient {
    pub fn new(process: ServerProcess, poll_timeout: Duration) -> Self {
        Self {
            process,
            next_id: 1,
            poll_timeout,
        }
    }

    /// Allocates the next request id. Ids are never reused.
    pub fn next_request_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        RequestId::Number(id)
    }

    /// The most recently allocated id, if any.
    pub fn last_request_id(&self) -> Option<i64> {
        (self.next_id > 1).then_some(self.next_id - 1)
    }

    /// Writes a request, then waits one poll cycle and reads one message.
    ///
    /// The message read is not necessarily the response to this request.
    pub fn call(&mut self, id: RequestId, method: &str, params: Option<Value>) -> Result<Value> {
        log::debug!("LSP request {} (id: {})", method, id);
        self.process
            .transport_mut()
            .send_request(id, method, params)?;
        self.poll()
    }

    /// Writes a notification. No response is awaited.
    pub fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        log::debug!("LSP notification {}", method);
        self.process
            .transport_mut()
            .send_notification(method, params)
    }

    /// Replies to a server-to-client request the client does not handle.
    pub fn reject_request(&mut self, id: RequestId, method: &str) -> Result<()> {
        log::warn!("Rejecting server request {} (id: {})", method, id);
        self.process.transport_mut().send_error_response(
            id,
            JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Unhandled method {}", method),
                data: None,
            },
        )
    }

    /// Waits up to the poll timeout for output, then reads one message.
    pub fn poll(&mut self) -> Result<Value> {
        self.process.transport().read_timeout(self.poll_timeout)
    }

    /// Reads one already-buffered message without waiting.
    pub fn try_read(&mut self) -> Result<Value> {
        self.process.transport().read_next()
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn set_poll_timeout(&mut self, timeout: Duration) {
        self.poll_timeout = timeout;
    }

    pub fn process(&self) -> &ServerProcess {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut ServerProcess {
        &mut self.process
    }

    /// Fails fast if the server process has exited.
    pub fn ensure_running(&mut self) -> Result<()> {
        if self.process.is_running() {
            Ok(())
        } else {
            Err(LspError::ServerCrashed)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn silent_server() -> RpcClient {
        let process = ServerProcess::start("sleep 30").unwrap();
        RpcClient::new(process, Duration::from_millis(20))
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut client = silent_server();
        assert_eq!(client.last_request_id(), None);

        let ids: Vec<RequestId> = (0..5).map(|_| client.next_request_id()).collect();
        assert_eq!(ids, (1..=5).map(RequestId::Number).collect::<Vec<_>>());
        assert_eq!(client.last_request_id(), Some(5));
    }

    #[test]
    fn test_call_times_out_without_output() {
        let mut client = silent_server();
        let id = client.next_request_id();
        let err = client.call(id, "shutdown", None).unwrap_err();
        assert!(matches!(err, LspError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[test]
    fn test_try_read_would_block() {
        let mut client = silent_server();
        assert!(matches!(client.try_read(), Err(LspError::WouldBlock)));
    }

    #[test]
    fn test_ensure_running_after_terminate() {
        let mut client = silent_server();
        assert!(client.ensure_running().is_ok());
        client.process_mut().terminate();
        assert!(matches!(client.ensure_running(), Err(LspError::ServerCrashed)));
    }
}
