//! Classification and decoding of inbound server messages.
//!
//! Every function here is pure: it takes a decoded JSON document and returns a
//! typed value or a descriptive error.

use crate::error::{LspError, Result};
use crate::transport::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::types::{Diagnostic, Diagnostics, HoverContent, MessageType, ServerMessage};
use crate::uri::uri_to_path;
use lsp_types::{Hover, HoverContents, InitializeResult, MarkedString};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// LSP methods understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LspMethod {
    Initialize,
    Initialized,
    Shutdown,
    Exit,
    WindowShowMessage,
    WindowLogMessage,
    WorkspaceDidChangeConfiguration,
    TextDocumentDidOpen,
    TextDocumentDidChange,
    TextDocumentDidClose,
    TextDocumentPublishDiagnostics,
    TextDocumentHover,
}

impl LspMethod {
    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Initialized => "initialized",
            Self::Shutdown => "shutdown",
            Self::Exit => "exit",
            Self::WindowShowMessage => "window/showMessage",
            Self::WindowLogMessage => "window/logMessage",
            Self::WorkspaceDidChangeConfiguration => "workspace/didChangeConfiguration",
            Self::TextDocumentDidOpen => "textDocument/didOpen",
            Self::TextDocumentDidChange => "textDocument/didChange",
            Self::TextDocumentDidClose => "textDocument/didClose",
            Self::TextDocumentPublishDiagnostics => "textDocument/publishDiagnostics",
            Self::TextDocumentHover => "textDocument/hover",
        }
    }

    /// Maps a wire method name back to the enum.
    pub fn from_wire(name: &str) -> Result<Self> {
        let method = match name {
            "initialize" => Self::Initialize,
            "initialized" => Self::Initialized,
            "shutdown" => Self::Shutdown,
            "exit" => Self::Exit,
            "window/showMessage" => Self::WindowShowMessage,
            "window/logMessage" => Self::WindowLogMessage,
            "workspace/didChangeConfiguration" => Self::WorkspaceDidChangeConfiguration,
            "textDocument/didOpen" => Self::TextDocumentDidOpen,
            "textDocument/didChange" => Self::TextDocumentDidChange,
            "textDocument/didClose" => Self::TextDocumentDidClose,
            "textDocument/publishDiagnostics" => Self::TextDocumentPublishDiagnostics,
            "textDocument/hover" => Self::TextDocumentHover,
            other => return Err(LspError::InvalidValue(format!("unknown method '{}'", other))),
        };
        Ok(method)
    }
}

impl fmt::Display for LspMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Determines whether a document is a response, a request, or a notification.
pub fn classify(doc: &Value) -> Result<JsonRpcMessage> {
    let has_id = doc.get("id").is_some();
    let has_method = doc.get("method").is_some();
    let decode = |what, source| LspError::Decode { what, source };

    match (has_id, has_method) {
        (true, false) => JsonRpcResponse::deserialize(doc)
            .map(JsonRpcMessage::Response)
            .map_err(|e| decode("response", e)),
        (true, true) => JsonRpcRequest::deserialize(doc)
            .map(JsonRpcMessage::Request)
            .map_err(|e| decode("request", e)),
        (false, true) => JsonRpcNotification::deserialize(doc)
            .map(JsonRpcMessage::Notification)
            .map_err(|e| decode("notification", e)),
        (false, false) => Err(LspError::InvalidValue(format!(
            "not a JSON-RPC message: {}",
            doc
        ))),
    }
}

/// Returns the method of an inbound request or notification.
pub fn method(doc: &Value) -> Result<LspMethod> {
    let name = doc
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| LspError::InvalidValue("missing method".to_string()))?;
    LspMethod::from_wire(name)
}

/// Extracts `result` from a response, converting an `error` member into a
/// protocol error.
pub fn response_result(doc: &Value) -> Result<Value> {
    let response = JsonRpcResponse::deserialize(doc).map_err(|source| LspError::Decode {
        what: "response",
        source,
    })?;
    if let Some(error) = response.error {
        return Err(error.into());
    }
    response
        .result
        .ok_or_else(|| LspError::UnexpectedResponse(doc.clone()))
}

/// Decodes the `initialize` response.
pub fn parse_initialize_response(doc: &Value) -> Result<InitializeResult> {
    let result = response_result(doc)?;
    serde_json::from_value(result).map_err(|source| LspError::Decode {
        what: "InitializeResult",
        source,
    })
}

/// Accepts a `shutdown` response iff its result is JSON null.
pub fn parse_shutdown_response(doc: &Value) -> Result<()> {
    match response_result(doc)? {
        Value::Null => Ok(()),
        _ => Err(LspError::UnexpectedResponse(doc.clone())),
    }
}

/// Maps the LSP `MessageType` integer to its enum value.
pub fn parse_lsp_message_type(n: i64) -> Result<MessageType> {
    match n {
        1 => Ok(MessageType::Error),
        2 => Ok(MessageType::Warn),
        3 => Ok(MessageType::Info),
        4 => Ok(MessageType::Log),
        5 => Ok(MessageType::Debug),
        other => Err(LspError::InvalidValue(format!(
            "message type {} out of range",
            other
        ))),
    }
}

#[derive(Deserialize)]
struct MessageParams {
    #[serde(rename = "type")]
    typ: i64,
    message: String,
}

fn parse_message_notify(doc: &Value, method: LspMethod) -> Result<ServerMessage> {
    let params = doc
        .get("params")
        .cloned()
        .ok_or_else(|| LspError::InvalidNotify(format!("{}: missing params", method)))?;
    let params: MessageParams = serde_json::from_value(params)
        .map_err(|e| LspError::InvalidNotify(format!("{}: {}", method, e)))?;
    Ok(ServerMessage {
        message_type: parse_lsp_message_type(params.typ)?,
        message: params.message,
    })
}

/// Decodes a `window/showMessage` notification.
pub fn parse_window_show_message_notify(doc: &Value) -> Result<ServerMessage> {
    parse_message_notify(doc, LspMethod::WindowShowMessage)
}

/// Decodes a `window/logMessage` notification.
pub fn parse_window_log_message_notify(doc: &Value) -> Result<ServerMessage> {
    parse_message_notify(doc, LspMethod::WindowLogMessage)
}

/// Wire shape of `PublishDiagnosticsParams` with an optional diagnostics list,
/// so an absent field can be told apart from an empty one.
#[derive(Deserialize)]
struct PublishDiagnosticsParams {
    uri: String,
    #[serde(default)]
    diagnostics: Option<Vec<lsp_types::Diagnostic>>,
}

/// Decodes `textDocument/publishDiagnostics`.
///
/// Returns `Ok(None)` when the notification carries no diagnostics field.
pub fn parse_text_document_publish_diagnostics_notify(doc: &Value) -> Result<Option<Diagnostics>> {
    let params = doc.get("params").cloned().ok_or_else(|| {
        LspError::InvalidNotify("textDocument/publishDiagnostics: missing params".to_string())
    })?;
    let params: PublishDiagnosticsParams =
        serde_json::from_value(params).map_err(|source| LspError::Decode {
            what: "PublishDiagnosticsParams",
            source,
        })?;

    let Some(diagnostics) = params.diagnostics else {
        return Ok(None);
    };
    Ok(Some(Diagnostics {
        path: uri_to_path(&params.uri)?,
        diagnostics: diagnostics.into_iter().map(Diagnostic::from).collect(),
    }))
}

/// Decodes a `textDocument/hover` response. A null result means no hover.
pub fn parse_text_document_hover_response(doc: &Value) -> Result<Option<Hover>> {
    match response_result(doc)? {
        Value::Null => Ok(None),
        result => serde_json::from_value(result)
            .map(Some)
            .map_err(|source| LspError::Decode {
                what: "Hover",
                source,
            }),
    }
}

fn marked_text(marked: &MarkedString) -> &str {
    match marked {
        MarkedString::String(s) => s,
        MarkedString::LanguageString(ls) => &ls.value,
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(String::from).collect()
}

/// Normalizes a hover into title, description lines and range.
///
/// With several fragments the first becomes the title and the rest are joined
/// with blank lines. Character offsets are copied as-is.
pub fn to_hover_content(hover: &Hover) -> HoverContent {
    let fragments: Vec<&str> = match &hover.contents {
        HoverContents::Scalar(marked) => vec![marked_text(marked)],
        HoverContents::Array(items) => items.iter().map(marked_text).collect(),
        HoverContents::Markup(markup) => vec![markup.value.as_str()],
    };

    let (title, description) = match fragments.as_slice() {
        [] => (String::new(), Vec::new()),
        [only] => (String::new(), split_lines(only)),
        [first, rest @ ..] => {
            let mut lines = Vec::new();
            for (i, fragment) in rest.iter().enumerate() {
                if i > 0 {
                    lines.push(String::new());
                }
                lines.extend(split_lines(fragment));
            }
            (first.to_string(), lines)
        }
    };

    HoverContent {
        title,
        description,
        range: hover.range.map(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferPosition, DiagnosticSeverity};
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_classify() {
        let response = json!({"jsonrpc": "2.0", "id": 3, "result": null});
        assert!(matches!(
            classify(&response),
            Ok(JsonRpcMessage::Response(r)) if r.result == Some(Value::Null)
        ));

        let request = json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "workspace/configuration",
            "params": {}
        });
        assert!(matches!(classify(&request), Ok(JsonRpcMessage::Request(_))));

        let notification = json!({"jsonrpc": "2.0", "method": "window/logMessage"});
        assert!(matches!(classify(&notification), Ok(JsonRpcMessage::Notification(_))));

        assert!(classify(&json!({"jsonrpc": "2.0"})).is_err());
        assert!(classify(&json!({"id": {"nested": true}})).is_err());
    }

    #[test]
    fn test_method_roundtrip() {
        for method in [
            LspMethod::Initialize,
            LspMethod::WindowShowMessage,
            LspMethod::TextDocumentPublishDiagnostics,
            LspMethod::TextDocumentHover,
        ] {
            let doc = json!({"method": method.as_str()});
            assert_eq!(super::method(&doc).unwrap(), method);
        }
    }

    #[test]
    fn test_unknown_method_is_error() {
        let doc = json!({"jsonrpc": "2.0", "method": "$/progress"});
        let err = method(&doc).unwrap_err();
        assert!(matches!(err, LspError::InvalidValue(_)));
        assert!(err.to_string().starts_with("Invalid value"));
    }

    #[test]
    fn test_message_type_range() {
        let expected = [
            MessageType::Error,
            MessageType::Warn,
            MessageType::Info,
            MessageType::Log,
            MessageType::Debug,
        ];
        for (n, ty) in (1..=5).zip(expected) {
            assert_eq!(parse_lsp_message_type(n).unwrap(), ty);
        }
        for n in [0, 6, -1, 100] {
            assert!(parse_lsp_message_type(n).is_err());
        }
    }

    #[test]
    fn test_shutdown_response() {
        let null = json!({"jsonrpc": "2.0", "id": 2, "result": null});
        assert!(parse_shutdown_response(&null).is_ok());

        let non_null = json!({"jsonrpc": "2.0", "id": 2, "result": {}});
        assert!(matches!(
            parse_shutdown_response(&non_null),
            Err(LspError::UnexpectedResponse(raw)) if raw == non_null
        ));

        let error = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32603, "message": "boom"}
        });
        assert!(matches!(
            parse_shutdown_response(&error),
            Err(LspError::Protocol { code: -32603, .. })
        ));

        let missing = json!({"jsonrpc": "2.0", "id": 2});
        assert!(parse_shutdown_response(&missing).is_err());
    }

    #[test]
    fn test_show_and_log_message() {
        let doc = json!({
            "jsonrpc": "2.0",
            "method": "window/showMessage",
            "params": {"type": 2, "message": "indexing slow"}
        });
        let message = parse_window_show_message_notify(&doc).unwrap();
        assert_eq!(message.message_type, MessageType::Warn);
        assert_eq!(message.message, "indexing slow");

        let doc = json!({"method": "window/logMessage", "params": {"type": 5, "message": "trace"}});
        assert_eq!(
            parse_window_log_message_notify(&doc).unwrap().message_type,
            MessageType::Debug
        );
    }

    #[test]
    fn test_message_notify_errors() {
        let missing = json!({"method": "window/logMessage", "params": {"type": 3}});
        assert!(matches!(
            parse_window_log_message_notify(&missing),
            Err(LspError::InvalidNotify(_))
        ));

        let mistyped = json!({
            "method": "window/logMessage",
            "params": {"type": "3", "message": "x"}
        });
        assert!(matches!(
            parse_window_log_message_notify(&mistyped),
            Err(LspError::InvalidNotify(_))
        ));

        let no_params = json!({"method": "window/showMessage"});
        assert!(parse_window_show_message_notify(&no_params).is_err());

        let out_of_range = json!({
            "method": "window/showMessage",
            "params": {"type": 9, "message": "x"}
        });
        assert!(matches!(
            parse_window_show_message_notify(&out_of_range),
            Err(LspError::InvalidValue(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_publish_diagnostics() {
        let doc = json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": "file:///work/src/my%20lib.rs",
                "diagnostics": [{
                    "range": {
                        "start": {"line": 4, "character": 2},
                        "end": {"line": 4, "character": 9}
                    },
                    "severity": 1,
                    "code": "E0425",
                    "source": "rustc",
                    "message": "cannot find value"
                }]
            }
        });
        let diagnostics = parse_text_document_publish_diagnostics_notify(&doc)
            .unwrap()
            .unwrap();
        assert_eq!(diagnostics.path, PathBuf::from("/work/src/my lib.rs"));
        assert_eq!(diagnostics.diagnostics.len(), 1);

        let diag = &diagnostics.diagnostics[0];
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.range.start, BufferPosition::new(4, 2));
        assert_eq!(diag.code.as_deref(), Some("E0425"));
        assert_eq!(diag.source.as_deref(), Some("rustc"));
    }

    #[test]
    fn test_publish_diagnostics_absent_vs_empty() {
        let absent = json!({"params": {"uri": "file:///work/a.rs"}});
        assert_eq!(parse_text_document_publish_diagnostics_notify(&absent).unwrap(), None);

        let empty = json!({"params": {"uri": "file:///work/a.rs", "diagnostics": []}});
        let parsed = parse_text_document_publish_diagnostics_notify(&empty)
            .unwrap()
            .unwrap();
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_publish_diagnostics_errors() {
        let malformed = json!({"params": {"diagnostics": []}});
        assert!(matches!(
            parse_text_document_publish_diagnostics_notify(&malformed),
            Err(LspError::Decode { .. })
        ));

        let remote = json!({"params": {"uri": "https://example.com/a.rs", "diagnostics": []}});
        assert!(matches!(
            parse_text_document_publish_diagnostics_notify(&remote),
            Err(LspError::InvalidUri(_))
        ));

        assert!(parse_text_document_publish_diagnostics_notify(&json!({})).is_err());
    }

    #[test]
    fn test_hover_response() {
        let none = json!({"jsonrpc": "2.0", "id": 4, "result": null});
        assert_eq!(parse_text_document_hover_response(&none).unwrap(), None);

        let hover = json!({"jsonrpc": "2.0", "id": 4, "result": {
            "contents": {"kind": "markdown", "value": "fn main()"}
        }});
        assert!(parse_text_document_hover_response(&hover).unwrap().is_some());

        let malformed = json!({"jsonrpc": "2.0", "id": 4, "result": {"contents": 42}});
        assert!(matches!(
            parse_text_document_hover_response(&malformed),
            Err(LspError::Decode { .. })
        ));
    }

    fn hover(value: Value) -> Hover {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_hover_content_single_fragment() {
        let content = to_hover_content(&hover(json!({"contents": ["first line\nsecond line"]})));
        assert_eq!(content.title, "");
        assert_eq!(content.description, vec!["first line", "second line"]);
        assert_eq!(content.range, None);

        let markup = to_hover_content(&hover(json!({
            "contents": {"kind": "plaintext", "value": "u32"}
        })));
        assert_eq!(markup.title, "");
        assert_eq!(markup.description, vec!["u32"]);
    }

    #[test]
    fn test_hover_content_multiple_fragments() {
        let content = to_hover_content(&hover(json!({
            "contents": [
                {"language": "rust", "value": "pub fn open(path: &Path)"},
                "Opens a file.\nReturns an error if missing.",
                "Since 1.0"
            ],
            "range": {"start": {"line": 10, "character": 4}, "end": {"line": 10, "character": 8}}
        })));
        assert_eq!(content.title, "pub fn open(path: &Path)");
        assert_eq!(
            content.description,
            vec!["Opens a file.", "Returns an error if missing.", "", "Since 1.0"]
        );
        let range = content.range.unwrap();
        assert_eq!(range.start, BufferPosition::new(10, 4));
        assert_eq!(range.end, BufferPosition::new(10, 8));
    }
}
