//! Error type shared by every layer of the LSP client.

use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LspError>;

/// Errors produced by the LSP client.
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    // Process level.
    #[error("empty language server command")]
    EmptyCommand,

    #[error("failed to start language server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server crashed")]
    ServerCrashed,

    // Transport level.
    #[error("failed to write to language server: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to read from language server: {0}")]
    Read(#[source] std::io::Error),

    #[error("no complete message available (would block)")]
    WouldBlock,

    #[error("timed out after {0:?} waiting for language server output")]
    Timeout(Duration),

    #[error("language server output stream closed")]
    Disconnected,

    #[error("malformed frame: {0}")]
    Frame(String),

    // Protocol level.
    #[error("server returned error {code}: {message}")]
    Protocol {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    // Decode level.
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid notify: {0}")]
    InvalidNotify(String),

    #[error("invalid uri '{0}'")]
    InvalidUri(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(Value),

    // Preconditions.
    #[error("hover unavailable")]
    HoverUnavailable,

    #[error("language server is not initialized")]
    NotInitialized,

    #[error("language server is already initialized")]
    AlreadyInitialized,

    #[error("language server is shutting down")]
    ShuttingDown,

    #[error("language server connection is closed")]
    Closed,

    #[error("document is not open: {}", .0.display())]
    DocumentNotOpen(PathBuf),

    #[error("{method}: {source}")]
    Method {
        method: &'static str,
        #[source]
        source: Box<LspError>,
    },
}

impl LspError {
    /// Wraps this error with the name of the LSP method that failed.
    pub fn in_method(self, method: &'static str) -> Self {
        Self::Method {
            method,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping method wrappers.
    pub fn root(&self) -> &LspError {
        match self {
            Self::Method { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the server process is gone.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.root(),
            Self::Spawn { .. } | Self::ServerCrashed | Self::Disconnected
        )
    }
}
