//! cp-lsp - drive a language server from the command line.
//!
//! Usage: cp-lsp "<server command>" <file> [line col]
//!
//! Opens FILE on the server, prints what the server publishes for a short
//! while, and optionally prints the hover at LINE:COL (1-based).

use cp_editor_lsp::{
    language_id_from_path, BufferPosition, ClientConfig, HoverContent, InitializeOptions,
    LspClient, LspError, ServerEvent,
};
use std::env;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::process;
use std::time::{Duration, Instant};

/// How long to collect server notifications after opening the file.
const SETTLE_TIME: Duration = Duration::from_secs(2);

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: cp-lsp \"<server command>\" <file> [line col]");
        process::exit(2);
    }

    let position = match parse_position(&args[3..]) {
        Ok(position) => position,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    if let Err(e) = run(&args[1], Path::new(&args[2]), position) {
        log::error!("{}", e);
        process::exit(1);
    }
}

fn parse_position(args: &[String]) -> Result<Option<BufferPosition>, String> {
    match args {
        [] => Ok(None),
        [line, col] => {
            let line: u32 = line.parse().map_err(|_| format!("invalid line '{}'", line))?;
            let col: u32 = col.parse().map_err(|_| format!("invalid column '{}'", col))?;
            Ok(Some(BufferPosition::new(
                line.saturating_sub(1),
                col.saturating_sub(1),
            )))
        }
        _ => Err("expected both a line and a column".to_string()),
    }
}

fn run(command: &str, file: &Path, position: Option<BufferPosition>) -> Result<(), Box<dyn Error>> {
    let root = env::current_dir()?;
    let text = fs::read_to_string(file)?;

    let mut client = LspClient::start(command, ClientConfig::default())?;
    let caps = client.initialize(&InitializeOptions::new(&root))?;
    log::info!("Connected to '{}' (hover: {})", client.command(), caps.hover);

    let language = language_id_from_path(file).unwrap_or("plaintext");
    client.text_document_did_open(file, language, &text)?;

    let deadline = Instant::now() + SETTLE_TIME;
    while Instant::now() < deadline {
        match client.poll() {
            Ok(Some(event)) => print_event(&event),
            Ok(None) => {}
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => log::warn!("{}", e),
        }
    }

    if let Some(position) = position {
        match client.text_document_hover(file, position) {
            Ok(Some(hover)) => print_hover(&hover),
            Ok(None) => println!("No hover information"),
            Err(e) if matches!(e.root(), LspError::HoverUnavailable) => {
                println!("Server does not support hover")
            }
            Err(e) => return Err(e.into()),
        }
    }

    client.text_document_did_close(file)?;
    client.shutdown()?;
    client.exit();
    Ok(())
}

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::Diagnostics(diagnostics) => {
            if diagnostics.diagnostics.is_empty() {
                println!("{}: clean", diagnostics.path.display());
            }
            for diag in &diagnostics.diagnostics {
                println!(
                    "{}:{}:{}: {:?}: {}",
                    diagnostics.path.display(),
                    diag.range.start.line + 1,
                    diag.range.start.column + 1,
                    diag.severity,
                    diag.message
                );
            }
        }
        ServerEvent::NoDiagnostics => println!("(diagnostics without a list)"),
        ServerEvent::ShowMessage(message) => {
            println!("[{:?}] {}", message.message_type, message.message)
        }
        ServerEvent::LogMessage(message) => {
            log::log!(message.message_type.log_level(), "{}", message.message)
        }
    }
}

fn print_hover(hover: &HoverContent) {
    if !hover.title.is_empty() {
        println!("{}", hover.title);
        println!();
    }
    for line in &hover.description {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position(&[]).unwrap(), None);
        assert_eq!(
            parse_position(&args(&["10", "4"])).unwrap(),
            Some(BufferPosition::new(9, 3))
        );
        assert!(parse_position(&args(&["10"])).is_err());
        assert!(parse_position(&args(&["x", "1"])).is_err());
    }
}
