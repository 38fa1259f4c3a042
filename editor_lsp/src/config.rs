//! Language server configuration consumed from the editor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default wait for server output per poll cycle.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Default time a request keeps polling for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing policy for a single client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bounded wait for output before each read.
    pub poll_timeout: Duration,
    /// How long a request re-polls for its matching response.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// How to launch the server for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// File extensions without the leading dot.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Command line; split on spaces.
    pub command: String,
}

impl LanguageConfig {
    pub fn new(command: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            command: command.into(),
        }
    }
}

/// LSP section of the editor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspConfig {
    #[serde(default = "default_enable")]
    pub enable: bool,
    /// Servers keyed by language id.
    #[serde(default)]
    pub languages: HashMap<String, LanguageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

fn default_enable() -> bool {
    true
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            enable: true,
            languages: HashMap::new(),
            poll_timeout_ms: None,
            request_timeout_ms: None,
        }
    }
}

impl LspConfig {
    /// Returns the language id configured for the file's extension.
    pub fn language_for_path(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        self.languages
            .iter()
            .find(|(_, lang)| lang.extensions.iter().any(|e| e == ext))
            .map(|(id, _)| id.as_str())
    }

    /// Client timing with configured overrides applied.
    pub fn client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            poll_timeout: self
                .poll_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_timeout),
            request_timeout: self
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

/// Get language ID from file extension.
pub fn language_id_from_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" => Some("javascript"),
        "ts" => Some("typescript"),
        "go" => Some("go"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "cxx" | "hpp" => Some("cpp"),
        "java" => Some("java"),
        "json" => Some("json"),
        "md" => Some("markdown"),
        "sh" => Some("shellscript"),
        "toml" => Some("toml"),
        _ => None,
    }
}
