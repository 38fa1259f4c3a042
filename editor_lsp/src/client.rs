//! LSP Client - one language server process and its protocol state.
//!
//! All calls are synchronous. Requests poll for their response with a bounded
//! wait per cycle; notifications that arrive in the meantime are queued and
//! handed out by [`LspClient::poll`].
//!
//! Waiting blocks the calling thread, so async code should drive the client
//! from `spawn_blocking` or a dedicated thread.

use crate::capabilities::{
    build_initialize_params, Capabilities, InitializeOptions, LifecycleState,
};
use crate::config::ClientConfig;
use crate::error::{LspError, Result};
use crate::parser::{self, LspMethod};
use crate::process::ServerProcess;
use crate::rpc::RpcClient;
use crate::transport::{JsonRpcMessage, RequestId};
use crate::types::{BufferPosition, HoverContent, ServerEvent};
use crate::uri::{absolute, normalize, path_to_lsp_uri};
use lsp_types::{
    DidChangeConfigurationParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, HoverParams, InitializedParams, TextDocumentContentChangeEvent,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams, Uri,
    VersionedTextDocumentIdentifier,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// The LSP client.
pub struct LspClient {
    rpc: RpcClient,
    config: ClientConfig,
    state: LifecycleState,
    capabilities: Capabilities,
    /// Set once an `initialize` response has been accepted.
    negotiated: bool,
    workspace_root: Option<PathBuf>,
    /// Open documents and their current version.
    documents: HashMap<PathBuf, i32>,
    /// Server messages received while waiting for a response.
    inbound: VecDeque<Value>,
}

impl LspClient {
    /// Starts the language server for `command`.
    pub fn start(command: &str, config: ClientConfig) -> Result<Self> {
        let process = ServerProcess::start(command)?;
        Ok(Self {
            rpc: RpcClient::new(process, config.poll_timeout),
            config,
            state: LifecycleState::Uninitialized,
            capabilities: Capabilities::default(),
            negotiated: false,
            workspace_root: None,
            documents: HashMap::new(),
            inbound: VecDeque::new(),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Capabilities negotiated during `initialize`.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn is_initialized(&self) -> bool {
        self.state == LifecycleState::Initialized
    }

    pub fn process_id(&self) -> Option<u32> {
        self.rpc.process().id()
    }

    pub fn command(&self) -> &str {
        self.rpc.process().command()
    }

    pub fn is_running(&mut self) -> bool {
        self.rpc.process_mut().is_running()
    }

    /// Returns true if the document is open on the server.
    pub fn is_open(&self, path: &Path) -> bool {
        self.documents.contains_key(&self.resolve(path))
    }

    /// Performs the `initialize` request and the `initialized` notification.
    pub fn initialize(&mut self, options: &InitializeOptions) -> Result<Capabilities> {
        self.with_method(LspMethod::Initialize, |client| {
            match client.state {
                LifecycleState::Uninitialized | LifecycleState::Initializing => {}
                LifecycleState::Closed => return Err(LspError::Closed),
                _ => return Err(LspError::AlreadyInitialized),
            }
            client.rpc.ensure_running()?;
            client.state = LifecycleState::Initializing;

            let params = build_initialize_params(options)?;
            let doc = client.request(LspMethod::Initialize, Some(to_params(&params)?))?;
            let result = parser::parse_initialize_response(&doc)?;

            client.capabilities = Capabilities::from_server(&result.capabilities);
            client.workspace_root = Some(absolute(&options.workspace_root));
            client.negotiated = true;
            if let Some(info) = &result.server_info {
                log::info!(
                    "LSP server {} {} initialized (hover: {})",
                    info.name,
                    info.version.as_deref().unwrap_or(""),
                    client.capabilities.hover
                );
            }
            Ok(())
        })?;

        self.initialized()?;
        Ok(self.capabilities)
    }

    /// Sends the `initialized` notification, completing the handshake.
    pub fn initialized(&mut self) -> Result<()> {
        self.with_method(LspMethod::Initialized, |client| {
            match client.state {
                LifecycleState::Initializing if client.negotiated => {}
                LifecycleState::Uninitialized | LifecycleState::Initializing => {
                    return Err(LspError::NotInitialized)
                }
                LifecycleState::Closed => return Err(LspError::Closed),
                _ => return Err(LspError::AlreadyInitialized),
            }
            client.notify(LspMethod::Initialized, &InitializedParams {})?;
            client.state = LifecycleState::Initialized;
            Ok(())
        })
    }

    /// Asks the server to shut down. The server must answer with a null result.
    ///
    /// The client stays initialized until the server acknowledges, so a failed
    /// shutdown may be retried.
    pub fn shutdown(&mut self) -> Result<()> {
        self.with_method(LspMethod::Shutdown, |client| {
            client.ensure_ready()?;
            let doc = client.request(LspMethod::Shutdown, None)?;
            parser::parse_shutdown_response(&doc)?;
            client.state = LifecycleState::ShuttingDown;
            Ok(())
        })
    }

    /// Sends `exit` and terminates the process. The client is unusable afterwards.
    pub fn exit(&mut self) {
        if self.state == LifecycleState::Closed {
            return;
        }
        if self.rpc.process_mut().is_running() {
            if let Err(e) = self.rpc.notify(LspMethod::Exit.as_str(), None) {
                log::debug!("Failed to send exit to '{}': {}", self.command(), e);
            }
        }
        self.rpc.process_mut().terminate();
        self.documents.clear();
        self.inbound.clear();
        self.state = LifecycleState::Closed;
        log::info!("LSP client for '{}' closed", self.command());
    }

    /// Sends `workspace/didChangeConfiguration` with the given settings.
    pub fn workspace_did_change_configuration(&mut self, settings: Value) -> Result<()> {
        self.with_method(LspMethod::WorkspaceDidChangeConfiguration, |client| {
            client.ensure_ready()?;
            client.notify(
                LspMethod::WorkspaceDidChangeConfiguration,
                &DidChangeConfigurationParams { settings },
            )
        })
    }

    /// Sends `textDocument/didOpen` with the full document text.
    ///
    /// Opening an already open document sends its text as a change instead.
    pub fn text_document_did_open(
        &mut self,
        path: &Path,
        language_id: &str,
        text: &str,
    ) -> Result<()> {
        if self.is_open(path) {
            return self.text_document_did_change(path, text);
        }
        self.with_method(LspMethod::TextDocumentDidOpen, |client| {
            client.ensure_ready()?;
            let (path, uri) = client.document_uri(path)?;
            let version = 1;
            client.notify(
                LspMethod::TextDocumentDidOpen,
                &DidOpenTextDocumentParams {
                    text_document: TextDocumentItem {
                        uri,
                        language_id: language_id.to_string(),
                        version,
                        text: text.to_string(),
                    },
                },
            )?;
            client.documents.insert(path, version);
            Ok(())
        })
    }

    /// Sends `textDocument/didChange` replacing the whole document text.
    pub fn text_document_did_change(&mut self, path: &Path, text: &str) -> Result<()> {
        self.with_method(LspMethod::TextDocumentDidChange, |client| {
            client.ensure_ready()?;
            let (path, uri) = client.document_uri(path)?;
            let version = match client.documents.get(&path) {
                Some(version) => version + 1,
                None => return Err(LspError::DocumentNotOpen(path)),
            };
            client.notify(
                LspMethod::TextDocumentDidChange,
                &DidChangeTextDocumentParams {
                    text_document: VersionedTextDocumentIdentifier { uri, version },
                    content_changes: vec![TextDocumentContentChangeEvent {
                        range: None,
                        range_length: None,
                        text: text.to_string(),
                    }],
                },
            )?;
            client.documents.insert(path, version);
            Ok(())
        })
    }

    /// Sends `textDocument/didClose`.
    pub fn text_document_did_close(&mut self, path: &Path) -> Result<()> {
        self.with_method(LspMethod::TextDocumentDidClose, |client| {
            client.ensure_ready()?;
            let (path, uri) = client.document_uri(path)?;
            if !client.documents.contains_key(&path) {
                return Err(LspError::DocumentNotOpen(path));
            }
            client.notify(
                LspMethod::TextDocumentDidClose,
                &DidCloseTextDocumentParams {
                    text_document: TextDocumentIdentifier { uri },
                },
            )?;
            client.documents.remove(&path);
            Ok(())
        })
    }

    /// Requests hover content at a buffer position.
    ///
    /// Returns `Ok(None)` when the server has nothing to show. Fails locally,
    /// without contacting the server, if hover was not negotiated.
    pub fn text_document_hover(
        &mut self,
        path: &Path,
        position: BufferPosition,
    ) -> Result<Option<HoverContent>> {
        self.with_method(LspMethod::TextDocumentHover, |client| {
            client.ensure_ready()?;
            if !client.capabilities.hover {
                return Err(LspError::HoverUnavailable);
            }
            let (_, uri) = client.document_uri(path)?;
            let params = HoverParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: position.into(),
                },
                work_done_progress_params: Default::default(),
            };
            let doc = client.request(LspMethod::TextDocumentHover, Some(to_params(&params)?))?;
            let hover = parser::parse_text_document_hover_response(&doc)?;
            Ok(hover.as_ref().map(parser::to_hover_content))
        })
    }

    /// Returns the next server notification, waiting at most one poll cycle.
    ///
    /// Returns `Ok(None)` when nothing arrived. Unknown or malformed messages
    /// are returned as errors; the caller may log them and keep polling.
    pub fn poll(&mut self) -> Result<Option<ServerEvent>> {
        if self.state == LifecycleState::Closed {
            return Err(LspError::Closed);
        }
        let doc = match self.inbound.pop_front() {
            Some(doc) => doc,
            None => match self.rpc.poll() {
                Ok(doc) => doc,
                Err(LspError::Timeout(_)) => return Ok(None),
                Err(LspError::Disconnected) => return Err(LspError::ServerCrashed),
                Err(e) => return Err(e),
            },
        };
        self.dispatch(&doc)
    }

    fn dispatch(&mut self, doc: &Value) -> Result<Option<ServerEvent>> {
        match parser::classify(doc)? {
            JsonRpcMessage::Response(response) => {
                log::warn!("Ignoring unsolicited response (id: {})", response.id);
                Ok(None)
            }
            JsonRpcMessage::Request(request) => {
                self.rpc.reject_request(request.id, &request.method)?;
                Err(LspError::InvalidValue(format!(
                    "unhandled server request '{}'",
                    request.method
                )))
            }
            JsonRpcMessage::Notification(_) => {
                let event = match parser::method(doc)? {
                    LspMethod::WindowShowMessage => {
                        ServerEvent::ShowMessage(parser::parse_window_show_message_notify(doc)?)
                    }
                    LspMethod::WindowLogMessage => {
                        ServerEvent::LogMessage(parser::parse_window_log_message_notify(doc)?)
                    }
                    LspMethod::TextDocumentPublishDiagnostics => {
                        match parser::parse_text_document_publish_diagnostics_notify(doc)? {
                            Some(diagnostics) => ServerEvent::Diagnostics(diagnostics),
                            None => ServerEvent::NoDiagnostics,
                        }
                    }
                    other => {
                        return Err(LspError::InvalidValue(format!(
                            "unexpected notification '{}'",
                            other
                        )))
                    }
                };
                Ok(Some(event))
            }
        }
    }

    /// Sends a request and re-polls until its response arrives or the request
    /// timeout elapses. Returns the raw response document.
    fn request(&mut self, method: LspMethod, params: Option<Value>) -> Result<Value> {
        let id = self.rpc.next_request_id();
        let deadline = Instant::now() + self.config.request_timeout;
        let mut next = self.rpc.call(id.clone(), method.as_str(), params);

        loop {
            match next {
                Ok(doc) => {
                    if let Some(response) = self.accept(&id, doc) {
                        return Ok(response);
                    }
                }
                Err(LspError::Timeout(_)) => {}
                Err(LspError::Frame(reason)) => {
                    log::warn!("Ignoring malformed frame: {}", reason);
                }
                Err(LspError::Disconnected) => return Err(LspError::ServerCrashed),
                Err(LspError::Write(_)) if !self.rpc.process_mut().is_running() => {
                    return Err(LspError::ServerCrashed)
                }
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                log::warn!(
                    "Abandoning {} (id: {}) after {:?}",
                    method,
                    id,
                    self.config.request_timeout
                );
                return Err(LspError::Timeout(self.config.request_timeout));
            }
            next = self.rpc.poll();
        }
    }

    /// Returns the document if it answers `awaited`; queues server messages and
    /// drops responses to other requests.
    fn accept(&mut self, awaited: &RequestId, doc: Value) -> Option<Value> {
        match parser::classify(&doc) {
            Ok(JsonRpcMessage::Response(response)) if &response.id == awaited => Some(doc),
            Ok(JsonRpcMessage::Response(response)) => {
                log::warn!(
                    "Ignoring stale response (id: {}) while waiting for {}",
                    response.id,
                    awaited
                );
                None
            }
            Ok(_) => {
                self.inbound.push_back(doc);
                None
            }
            Err(e) => {
                log::warn!("Ignoring undecodable message: {}", e);
                None
            }
        }
    }

    fn notify<P: Serialize>(&mut self, method: LspMethod, params: &P) -> Result<()> {
        let params = to_params(params)?;
        self.rpc.notify(method.as_str(), Some(params))
    }

    fn ensure_ready(&mut self) -> Result<()> {
        if self.state == LifecycleState::Closed {
            return Err(LspError::Closed);
        }
        self.rpc.ensure_running()?;
        match self.state {
            LifecycleState::Initialized => Ok(()),
            LifecycleState::ShuttingDown => Err(LspError::ShuttingDown),
            _ => Err(LspError::NotInitialized),
        }
    }

    /// Resolves relative paths against the workspace root.
    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => normalize(&root.join(path)),
            _ => absolute(path),
        }
    }

    fn document_uri(&self, path: &Path) -> Result<(PathBuf, Uri)> {
        let path = self.resolve(path);
        let uri = path_to_lsp_uri(&path)?;
        Ok((path, uri))
    }

    fn with_method<T>(
        &mut self,
        method: LspMethod,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        f(self).map_err(|e| e.in_method(method.as_str()))
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        self.exit();
    }
}

fn to_params<P: Serialize>(params: &P) -> Result<Value> {
    serde_json::to_value(params).map_err(|source| LspError::Encode {
        what: "params",
        source,
    })
}
