//! Scripted language servers for the end-to-end tests.

#![allow(dead_code)]

use cp_editor_lsp::transport::FrameDecoder;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const INIT_WITH_HOVER: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{"hoverProvider":true},"serverInfo":{"name":"fake","version":"1.0"}}}"#;
pub const INIT_WITHOUT_HOVER: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#;

fn stdin_log(dir: &TempDir) -> PathBuf {
    dir.path().join("stdin.log")
}

/// Writes a server script that emits `frames` in order and then runs `tail`.
/// Returns its command line.
pub fn script_server(dir: &TempDir, frames: &[&str], tail: &str) -> String {
    let mut script = String::from(
        "#!/bin/sh\nsend() { printf 'Content-Length: %d\\r\\n\\r\\n%s' \"${#1}\" \"$1\"; }\n",
    );
    for frame in frames {
        script.push_str(&format!("send '{}'\n", frame));
    }
    script.push_str(tail);
    script.push('\n');

    let path = dir.path().join("server.sh");
    fs::write(&path, script).unwrap();
    format!("sh {}", path.display())
}

/// A server that emits `frames` and records everything the client sends.
pub fn fake_server(dir: &TempDir, frames: &[&str]) -> String {
    let tail = format!("exec cat > '{}'", stdin_log(dir).display());
    script_server(dir, frames, &tail)
}

/// Waits until the client has sent at least `count` messages to a
/// [`fake_server`] and returns all of them in order.
pub fn sent_messages(dir: &TempDir, count: usize) -> Vec<Value> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let bytes = fs::read(stdin_log(dir)).unwrap_or_default();
        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);
        let mut messages = Vec::new();
        while let Some(message) = decoder.next_frame().unwrap() {
            messages.push(message);
        }

        if messages.len() >= count {
            return messages;
        }
        assert!(
            Instant::now() < deadline,
            "expected {} messages, got {:?}",
            count,
            messages
        );
        thread::sleep(Duration::from_millis(10));
    }
}
