//! Capability negotiation for the `initialize` handshake.

use crate::error::Result;
use crate::uri::{absolute, path_to_lsp_uri};
use lsp_types::{
    ClientCapabilities, ClientInfo, HoverClientCapabilities, HoverProviderCapability,
    InitializeParams, MarkupKind, ServerCapabilities, TextDocumentClientCapabilities, TraceValue,
    WorkspaceClientCapabilities, WorkspaceFolder,
};
use std::path::PathBuf;

/// Lifecycle of a client's connection to its server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Initialized,
    ShuttingDown,
    Closed,
}

/// Optional server features the client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub hover: bool,
}

impl Capabilities {
    /// Records the features advertised by the server.
    ///
    /// Hover is enabled only when `hoverProvider` is exactly `true`.
    pub fn from_server(server: &ServerCapabilities) -> Self {
        Self {
            hover: matches!(
                server.hover_provider,
                Some(HoverProviderCapability::Simple(true))
            ),
        }
    }
}

/// Editor context sent with `initialize`.
#[derive(Debug, Clone)]
pub struct InitializeOptions {
    /// Workspace root; used for the root URI and the single workspace folder.
    pub workspace_root: PathBuf,
    pub client_name: String,
    pub client_version: Option<String>,
    pub locale: Option<String>,
    pub trace: TraceValue,
}

impl InitializeOptions {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            locale: Some("en-US".to_string()),
            trace: TraceValue::Off,
        }
    }

    pub fn with_trace(mut self, trace: TraceValue) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// Builds the `initialize` parameters from editor context.
///
/// Declared client capabilities are limited to `workspace.applyEdit` and
/// `textDocument.hover`.
#[allow(deprecated)]
pub fn build_initialize_params(options: &InitializeOptions) -> Result<InitializeParams> {
    let root = absolute(&options.workspace_root);
    let root_uri = path_to_lsp_uri(&root)?;
    let folder_name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().into_owned());

    Ok(InitializeParams {
        process_id: Some(std::process::id()),
        root_path: Some(root.to_string_lossy().into_owned()),
        root_uri: Some(root_uri.clone()),
        capabilities: ClientCapabilities {
            workspace: Some(WorkspaceClientCapabilities {
                apply_edit: Some(true),
                ..Default::default()
            }),
            text_document: Some(TextDocumentClientCapabilities {
                hover: Some(HoverClientCapabilities {
                    dynamic_registration: Some(false),
                    content_format: Some(vec![MarkupKind::PlainText, MarkupKind::Markdown]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        trace: Some(options.trace),
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: root_uri,
            name: folder_name,
        }]),
        client_info: Some(ClientInfo {
            name: options.client_name.clone(),
            version: options.client_version.clone(),
        }),
        locale: options.locale.clone(),
        ..Default::default()
    })
}
