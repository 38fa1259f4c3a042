//! Editor-facing types produced by the LSP client.
//!
//! These are simplified projections of lsp-types for use by the editor core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A position in an editor buffer.
///
/// Both coordinates are 0-indexed. The column maps directly onto the LSP
/// `character` field with no unit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BufferPosition {
    pub line: u32,
    pub column: u32,
}

impl BufferPosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl From<lsp_types::Position> for BufferPosition {
    fn from(pos: lsp_types::Position) -> Self {
        Self {
            line: pos.line,
            column: pos.character,
        }
    }
}

impl From<BufferPosition> for lsp_types::Position {
    fn from(pos: BufferPosition) -> Self {
        Self {
            line: pos.line,
            character: pos.column,
        }
    }
}

/// A span between two buffer positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferRange {
    pub start: BufferPosition,
    pub end: BufferPosition,
}

impl BufferRange {
    pub fn new(start: BufferPosition, end: BufferPosition) -> Self {
        Self { start, end }
    }

    /// Returns true if the range covers the given position (end inclusive).
    pub fn contains(&self, pos: BufferPosition) -> bool {
        pos >= self.start && pos <= self.end
    }
}

impl PartialOrd for BufferPosition {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BufferPosition {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.line, self.column).cmp(&(other.line, other.column))
    }
}

impl From<lsp_types::Range> for BufferRange {
    fn from(range: lsp_types::Range) -> Self {
        Self {
            start: range.start.into(),
            end: range.end.into(),
        }
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
    Hint,
}

impl From<lsp_types::DiagnosticSeverity> for DiagnosticSeverity {
    fn from(severity: lsp_types::DiagnosticSeverity) -> Self {
        match severity {
            lsp_types::DiagnosticSeverity::ERROR => Self::Error,
            lsp_types::DiagnosticSeverity::WARNING => Self::Warning,
            lsp_types::DiagnosticSeverity::HINT => Self::Hint,
            _ => Self::Information,
        }
    }
}

/// A diagnostic message (error, warning, etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: BufferRange,
    pub severity: DiagnosticSeverity,
    pub message: String,
    /// Optional error code, numeric codes rendered as text.
    pub code: Option<String>,
    /// Optional source (e.g., "rust-analyzer").
    pub source: Option<String>,
}

impl From<lsp_types::Diagnostic> for Diagnostic {
    fn from(diag: lsp_types::Diagnostic) -> Self {
        Self {
            range: diag.range.into(),
            severity: diag
                .severity
                .map(DiagnosticSeverity::from)
                .unwrap_or(DiagnosticSeverity::Information),
            message: diag.message,
            code: diag.code.map(|c| match c {
                lsp_types::NumberOrString::Number(n) => n.to_string(),
                lsp_types::NumberOrString::String(s) => s,
            }),
            source: diag.source,
        }
    }
}

/// Diagnostics published by the server for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

/// Hover content ready to be rendered at the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HoverContent {
    /// Heading line, empty when the server sent a single fragment.
    pub title: String,
    /// Body lines in display order.
    pub description: Vec<String>,
    /// Span the hover applies to, if the server reported one.
    pub range: Option<BufferRange>,
}

/// Severity of a `window/showMessage` or `window/logMessage` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Error,
    Warn,
    Info,
    Log,
    Debug,
}

impl MessageType {
    /// Returns the matching `log` level for forwarding server messages.
    pub fn log_level(self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Log | Self::Debug => log::Level::Debug,
        }
    }
}

/// A message the server asked the editor to show or log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub message_type: MessageType,
    pub message: String,
}

/// An inbound server notification, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// `textDocument/publishDiagnostics` carrying a diagnostics list (possibly empty).
    Diagnostics(Diagnostics),
    /// `textDocument/publishDiagnostics` without a diagnostics field.
    NoDiagnostics,
    /// `window/showMessage`.
    ShowMessage(ServerMessage),
    /// `window/logMessage`.
    LogMessage(ServerMessage),
}
