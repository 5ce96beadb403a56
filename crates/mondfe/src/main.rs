//! CLI entry point for the `mondfe` debugger.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mondfe::{
    CommandError, CrosstermTerminal, DebuggerConfig, LoopbackTarget, RemoteTarget, Session,
    SessionExit, DEFAULT_ESCAPE_BYTE,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use am29k_asm as _;
use am29k_isa as _;
use crossterm as _;
use thiserror as _;
#[cfg(feature = "serde")]
use serde as _;
#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use serde_json as _;
#[cfg(test)]
use tempfile as _;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Monitor connection string.
    #[arg(short, long, default_value = "loopback")]
    connect: String,

    /// Read commands and program input from this file before the keyboard.
    #[arg(short = 'f', long)]
    command_file: Option<PathBuf>,

    /// Byte (hex) that returns the keyboard to the debugger.
    #[arg(short, long, value_parser = parse_escape, default_value = "1d")]
    escape: u8,

    /// Status poll timeout in milliseconds.
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,

    /// Log filter, e.g. `debug` or `mondfe=trace`; overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_escape(text: &str) -> Result<u8, String> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u8::from_str_radix(digits, 16).map_err(|err| format!("invalid escape byte {text:?}: {err}"))
}

impl Args {
    fn debugger_config(&self) -> DebuggerConfig {
        DebuggerConfig {
            connection: self.connect.clone(),
            escape_byte: self.escape,
            poll_interval: Duration::from_millis(self.poll_ms),
            command_file: self.command_file.clone(),
            ..DebuggerConfig::default()
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_remote(connection: &str) -> Result<Box<dyn RemoteTarget>, CommandError> {
    match connection {
        "loopback" => Ok(Box::new(LoopbackTarget::new())),
        other => Err(CommandError::Fatal(format!(
            "no transport for connection {other:?}"
        ))),
    }
}

fn run(args: &Args) -> Result<SessionExit, CommandError> {
    let config = args.debugger_config();
    let interrupt = Arc::new(AtomicBool::new(false));
    let remote = open_remote(&config.connection)?;
    let terminal = CrosstermTerminal::new(Arc::clone(&interrupt))?;
    let mut session = Session::connect(remote, Box::new(terminal), config)?.with_interrupt(interrupt);
    session.run()
}

fn main() {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());
    let exit_code = match run(&args) {
        Ok(exit) => {
            info!(?exit, "done");
            0
        }
        Err(err) => {
            error!(%err, "mondfe failed");
            eprintln!("mondfe: {err}");
            1
        }
    };
    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_debugger_config() {
        let args = Args::try_parse_from(["mondfe"]).expect("no flags");
        assert_eq!(args.debugger_config(), DebuggerConfig::default());
        assert_eq!(args.escape, DEFAULT_ESCAPE_BYTE);
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "mondfe",
            "--connect",
            "loopback",
            "-f",
            "cmds.txt",
            "--escape",
            "0x1c",
            "--poll-ms",
            "10",
        ])
        .expect("valid flags");
        let config = args.debugger_config();
        assert_eq!(config.escape_byte, 0x1c);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.command_file, Some(PathBuf::from("cmds.txt")));
    }

    #[test]
    fn rejects_bad_escape() {
        assert!(Args::try_parse_from(["mondfe", "--escape", "zz"]).is_err());
        assert!(Args::try_parse_from(["mondfe", "--escape", "100"]).is_err());
    }

    #[test]
    fn unknown_connection_is_fatal() {
        assert!(matches!(
            open_remote("serial:/dev/ttyS0"),
            Err(CommandError::Fatal(_))
        ));
    }
}
