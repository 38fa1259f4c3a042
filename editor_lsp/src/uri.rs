//! Conversion between filesystem paths and `file://` URIs.

use crate::error::{LspError, Result};
use std::path::{Component, Path, PathBuf};

/// Converts a path to a `file://` URI.
///
/// Relative paths are made absolute first. Every byte outside
/// `/ A-Z a-z 0-9 - . _ ~` is percent-encoded.
pub fn path_to_uri(path: &Path) -> String {
    let path = if path.is_relative() {
        absolute(path)
    } else {
        path.to_path_buf()
    };
    let path_str = path.to_string_lossy();
    let path_str = if cfg!(windows) {
        format!("/{}", path_str.replace('\\', "/"))
    } else {
        path_str.into_owned()
    };

    let mut uri = String::with_capacity(path_str.len() + 7);
    uri.push_str("file://");
    for byte in path_str.bytes() {
        match byte {
            b'/' | b'-' | b'.' | b'_' | b'~' => uri.push(byte as char),
            b if b.is_ascii_alphanumeric() => uri.push(b as char),
            b => uri.push_str(&format!("%{:02X}", b)),
        }
    }
    uri
}

/// Converts a path to an lsp-types URI.
pub fn path_to_lsp_uri(path: &Path) -> Result<lsp_types::Uri> {
    let uri = path_to_uri(path);
    uri.parse().map_err(|_| LspError::InvalidUri(uri))
}

/// Converts a `file://` URI back to a normalized filesystem path.
///
/// Rejects other schemes and URIs naming a host.
pub fn uri_to_path(uri: &str) -> Result<PathBuf> {
    let url = url::Url::parse(uri).map_err(|_| LspError::InvalidUri(uri.to_string()))?;
    if url.scheme() != "file" {
        return Err(LspError::InvalidUri(uri.to_string()));
    }
    // `Url` folds `localhost` to an empty host, so check the raw authority too.
    if !authority(uri).is_empty() || url.host_str().is_some_and(|host| !host.is_empty()) {
        return Err(LspError::InvalidUri(uri.to_string()));
    }
    let path = url
        .to_file_path()
        .map_err(|_| LspError::InvalidUri(uri.to_string()))?;
    Ok(normalize(&path))
}

fn authority(uri: &str) -> &str {
    let Some((_, rest)) = uri.split_once("://") else {
        return "";
    };
    rest.split(['/', '?', '#']).next().unwrap_or("")
}

/// Resolves a relative path against the current directory and normalizes it.
///
/// An empty path stands for the current directory.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    match std::path::absolute(path) {
        Ok(abs) => normalize(&abs),
        Err(e) => {
            log::warn!("Failed to resolve {}: {}", path.display(), e);
            normalize(path)
        }
    }
}

/// Lexically normalizes a path, folding `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
