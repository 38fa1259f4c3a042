//! Language server process supervision.
//!
//! Each server runs as a child process with piped stdio. A small tokio runtime
//! owned by the process drives the pipes: frames are written to stdin by one
//! task, stdout is deframed by another, and stderr lines are forwarded to the log.

use crate::error::{LspError, Result};
use crate::transport::{self, Transport};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Splits a configured command line into program and arguments.
///
/// Words are separated by spaces; quoting is not supported.
pub fn split_command(command: &str) -> Result<(String, Vec<String>)> {
    let mut words = command.split(' ').filter(|w| !w.is_empty()).map(String::from);
    let program = words.next().ok_or(LspError::EmptyCommand)?;
    Ok((program, words.collect()))
}

/// A running language server and its stdio streams.
pub struct ServerProcess {
    command: String,
    child: Child,
    pid: Option<u32>,
    transport: Transport,
    exited: bool,
    runtime: Option<Runtime>,
}

impl ServerProcess {
    /// Launches `command` with its standard streams redirected to pipes.
    pub fn start(command: &str) -> Result<Self> {
        let (program, args) = split_command(command)?;
        let spawn_error = |source| LspError::Spawn {
            command: command.to_string(),
            source,
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("lsp-io")
            .enable_all()
            .build()
            .map_err(spawn_error)?;

        let mut child = {
            let _guard = runtime.enter();
            Command::new(&program)
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    log::error!("Failed to start LSP server '{}': {}", command, e);
                    spawn_error(e)
                })?
        };

        let missing = |stream: &str| {
            spawn_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("child {} was not captured", stream),
            ))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        runtime.spawn(transport::write_loop(stdin, outbound_rx));
        runtime.spawn(transport::read_loop(stdout, inbound_tx));
        runtime.spawn(forward_stderr(stderr, program));

        let pid = child.id();
        log::info!("Started LSP server: {} (pid {:?})", command, pid);

        Ok(Self {
            command: command.to_string(),
            child,
            pid,
            transport: Transport::new(outbound_tx, inbound_rx),
            exited: false,
            runtime: Some(runtime),
        })
    }

    /// The command line this process was started with.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// OS process id captured at spawn time.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Returns true while the child has not exited.
    pub fn is_running(&mut self) -> bool {
        if self.exited {
            return false;
        }
        let _guard = self.runtime.as_ref().map(Runtime::enter);
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                log::info!("LSP server '{}' exited with {}", self.command, status);
                self.exited = true;
                false
            }
            Err(e) => {
                log::warn!("Failed to query LSP server '{}': {}", self.command, e);
                self.exited = true;
                false
            }
        }
    }

    /// Kills the child. No further interaction is attempted afterwards.
    pub fn terminate(&mut self) {
        if self.exited {
            return;
        }
        let _guard = self.runtime.as_ref().map(Runtime::enter);
        if let Err(e) = self.child.start_kill() {
            log::debug!("Failed to kill LSP server '{}': {}", self.command, e);
        }
        self.exited = true;
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        self.terminate();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn forward_stderr(stderr: ChildStderr, program: String) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => log::debug!("[{}] {}", program, line),
            Ok(None) => break,
            Err(e) => {
                log::debug!("[{}] stderr closed: {}", program, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        let (program, args) = split_command("typescript-language-server --stdio").unwrap();
        assert_eq!(program, "typescript-language-server");
        assert_eq!(args, vec!["--stdio".to_string()]);
    }

    #[test]
    fn test_split_command_collapses_spaces() {
        let (program, args) = split_command("  clangd   --log=verbose  -j=2 ").unwrap();
        assert_eq!(program, "clangd");
        assert_eq!(args, vec!["--log=verbose", "-j=2"]);
    }

    #[test]
    fn test_split_command_empty() {
        assert!(matches!(split_command("   "), Err(LspError::EmptyCommand)));
    }

    #[test]
    fn test_start_missing_executable() {
        let err = ServerProcess::start("cp-editor-no-such-language-server --stdio")
            .err()
            .unwrap();
        assert!(matches!(err, LspError::Spawn { .. }));
        assert!(err.is_fatal());
    }

    #[cfg(unix)]
    #[test]
    fn test_is_running_tracks_exit() {
        let mut process = ServerProcess::start("sleep 30").unwrap();
        assert!(process.is_running());
        assert!(process.id().is_some());

        process.terminate();
        assert!(!process.is_running());
    }
}
