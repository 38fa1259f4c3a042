//! LSP Client - Language Server Protocol client for CP Editor.
//!
//! Drives one language server process per language over stdin/stdout with
//! Content-Length framed JSON-RPC. Every operation is synchronous from the
//! editor's side: a background reader thread deframes server output and the
//! client waits on it with a bounded timeout, so the render loop never blocks
//! for longer than one poll cycle.
//!
//! Layers, bottom up:
//! - [`transport`]: framing and the JSON-RPC envelope
//! - [`process`]: spawning and supervising the server
//! - [`rpc`]: request ids and raw message exchange
//! - [`parser`]: decoding responses and notifications into editor types
//! - [`client`]: the LSP lifecycle and document operations
//! - [`manager`]: one client per configured language

pub mod capabilities;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod parser;
pub mod process;
pub mod rpc;
pub mod transport;
pub mod types;
pub mod uri;

pub use capabilities::{Capabilities, InitializeOptions, LifecycleState};
pub use client::LspClient;
pub use config::{language_id_from_path, ClientConfig, LanguageConfig, LspConfig};
pub use error::{LspError, Result};
pub use manager::LspManager;
pub use parser::LspMethod;
pub use types::{
    BufferPosition, BufferRange, Diagnostic, DiagnosticSeverity, Diagnostics, HoverContent,
    MessageType, ServerEvent, ServerMessage,
};
pub use uri::{path_to_uri, uri_to_path};
