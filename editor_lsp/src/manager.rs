//! Per-language management of LSP clients.
//!
//! Starts one client per configured language on first use and routes document
//! notifications by file extension. Polling never blocks longer than one poll
//! cycle per running client.

use crate::capabilities::InitializeOptions;
use crate::client::LspClient;
use crate::config::{ClientConfig, LspConfig};
use crate::error::{LspError, Result};
use crate::types::{BufferPosition, HoverContent, ServerEvent};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Manages LSP clients for the editor.
pub struct LspManager {
    config: LspConfig,
    client_config: ClientConfig,
    workspace_root: PathBuf,
    /// Running clients by language id.
    clients: HashMap<String, LspClient>,
    /// Languages whose server failed to start, initialize, or stay alive.
    unavailable: HashSet<String>,
}

impl LspManager {
    /// Creates a manager. No server is started until a document needs one.
    pub fn new(config: LspConfig, workspace_root: impl Into<PathBuf>) -> Self {
        let client_config = config.client_config();
        Self {
            config,
            client_config,
            workspace_root: workspace_root.into(),
            clients: HashMap::new(),
            unavailable: HashSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enable
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Language id configured for the file, if any.
    pub fn language_for_path(&self, path: &Path) -> Option<&str> {
        self.config.language_for_path(path)
    }

    /// Returns true if the language's server has been given up on.
    pub fn is_unavailable(&self, language: &str) -> bool {
        self.unavailable.contains(language)
    }

    /// Languages with a running client.
    pub fn running_languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }

    /// Returns the running client for `language`, if any.
    pub fn client_mut(&mut self, language: &str) -> Option<&mut LspClient> {
        self.clients.get_mut(language)
    }

    /// Returns the client for `language`, starting and initializing it if needed.
    ///
    /// Returns `Ok(None)` when LSP is disabled, the language is not configured,
    /// or its server was already marked unavailable.
    pub fn start_client(&mut self, language: &str) -> Result<Option<&mut LspClient>> {
        if !self.config.enable || self.unavailable.contains(language) {
            return Ok(None);
        }

        if !self.clients.contains_key(language) {
            let Some(command) = self.config.languages.get(language).map(|l| l.command.clone())
            else {
                return Ok(None);
            };
            match self.launch(&command) {
                Ok(client) => {
                    log::info!("Started LSP client for {}", language);
                    self.clients.insert(language.to_string(), client);
                }
                Err(e) => {
                    log::warn!("LSP for {} is unavailable: {}", language, e);
                    self.unavailable.insert(language.to_string());
                    return Err(e);
                }
            }
        }

        Ok(self.clients.get_mut(language))
    }

    fn launch(&self, command: &str) -> Result<LspClient> {
        let mut client = LspClient::start(command, self.client_config)?;
        client.initialize(&InitializeOptions::new(&self.workspace_root))?;
        Ok(client)
    }

    /// Notifies the file's server that a document was opened.
    pub fn did_open(&mut self, path: &Path, text: &str) -> Result<()> {
        let Some(language) = self.language_for_path(path).map(str::to_string) else {
            return Ok(());
        };
        let result = match self.start_client(&language)? {
            Some(client) => client.text_document_did_open(path, &language, text),
            None => return Ok(()),
        };
        self.check_fatal(&language, result)
    }

    /// Notifies the file's server that a document changed.
    pub fn did_change(&mut self, path: &Path, text: &str) -> Result<()> {
        let Some(language) = self.language_for_path(path).map(str::to_string) else {
            return Ok(());
        };
        let result = match self.clients.get_mut(&language) {
            Some(client) if client.is_open(path) => client.text_document_did_change(path, text),
            _ => return Ok(()),
        };
        self.check_fatal(&language, result)
    }

    /// Notifies the file's server that a document was closed.
    pub fn did_close(&mut self, path: &Path) -> Result<()> {
        let Some(language) = self.language_for_path(path).map(str::to_string) else {
            return Ok(());
        };
        let result = match self.clients.get_mut(&language) {
            Some(client) if client.is_open(path) => client.text_document_did_close(path),
            _ => return Ok(()),
        };
        self.check_fatal(&language, result)
    }

    /// Requests hover content for a position in the file.
    pub fn hover(
        &mut self,
        path: &Path,
        position: BufferPosition,
    ) -> Result<Option<HoverContent>> {
        let Some(language) = self.language_for_path(path).map(str::to_string) else {
            return Ok(None);
        };
        let result = match self.clients.get_mut(&language) {
            Some(client) => client.text_document_hover(path, position),
            None => return Ok(None),
        };
        self.check_fatal(&language, result)
    }

    /// Pushes new settings to the server of `language`, if it is running.
    pub fn did_change_configuration(&mut self, language: &str, settings: Value) -> Result<()> {
        let result = match self.clients.get_mut(language) {
            Some(client) => client.workspace_did_change_configuration(settings),
            None => return Ok(()),
        };
        self.check_fatal(language, result)
    }

    /// Drops the client of `language` if `result` shows its server is gone.
    fn check_fatal<T>(&mut self, language: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                self.forget(language, e);
            }
        }
        result
    }

    fn forget(&mut self, language: &str, error: &LspError) {
        log::error!("LSP server for {} stopped: {}", language, error);
        self.clients.remove(language);
        self.unavailable.insert(language.to_string());
    }

    /// Polls every running client once. Call this from the event loop.
    ///
    /// Clients whose server died are dropped and their language marked
    /// unavailable.
    pub fn poll(&mut self) -> Vec<(String, ServerEvent)> {
        let mut events = Vec::new();
        let mut crashed = Vec::new();

        for (language, client) in self.clients.iter_mut() {
            match client.poll() {
                Ok(Some(event)) => {
                    if let ServerEvent::LogMessage(message) = &event {
                        log::log!(
                            message.message_type.log_level(),
                            "[{}] {}",
                            language,
                            message.message
                        );
                    }
                    events.push((language.clone(), event));
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => crashed.push((language.clone(), e)),
                Err(e) => log::debug!("LSP {}: {}", language, e),
            }
        }

        for (language, e) in crashed {
            self.forget(&language, &e);
        }
        events
    }

    /// Shuts down all LSP clients.
    pub fn shutdown_all(&mut self) {
        for (language, mut client) in self.clients.drain() {
            log::info!("Shutting down LSP client for {}", language);
            if let Err(e) = client.shutdown() {
                log::warn!("LSP shutdown for {} failed: {}", language, e);
            }
            client.exit();
        }
    }
}

impl Drop for LspManager {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
