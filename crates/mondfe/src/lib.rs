//! Debugger front-end for Am29000-family targets running a resident monitor.
//!
//! A [`Session`] polls the monitor through a [`RemoteTarget`], relays program
//! I/O to a [`TerminalChannel`], and runs user commands from the keyword
//! table in [`commands`]. [`LoopbackTarget`] is an in-process monitor used by
//! the tests and by the `loopback` connection string.

/// Breakpoint mirror kept consistent with the monitor.
pub mod breakpoints;
pub use breakpoints::{BreakpointError, BreakpointRecord, BreakpointTable, MAX_BREAKPOINT_SLOTS};

/// Keyword handlers.
pub mod commands;
pub use commands::COMMANDS;

/// Session configuration.
pub mod config;
pub use config::{DebuggerConfig, DEFAULT_ESCAPE_BYTE, DEFAULT_MAX_TOKENS, IO_BUFFER_SIZE};

/// Tokenizer and keyword table.
pub mod dispatcher;
pub use dispatcher::{normalize, tokenize, CommandHandler, CommandTable, CommandTableEntry};

/// Command error taxonomy.
pub mod error;
pub use error::{CommandError, Severity};

/// In-process monitor.
pub mod loopback;
pub use loopback::{LoopbackTarget, RemoteOp};

/// Monitor call interface.
pub mod remote;
pub use remote::{
    read_word, write_word, BreakpointKind, BreakpointSlot, RemoteBreakpoint, RemoteError,
    RemoteErrorKind, RemoteResult, RemoteTarget, SessionId, StdinMode,
};

/// The polling loop.
pub mod session;
pub use session::{Session, SessionExit};

/// Target status words.
pub mod state;
pub use state::{SessionState, TerminalOwner};

/// Terminal access.
pub mod terminal;
pub use terminal::{CrosstermTerminal, ScriptedTerminal, TerminalChannel, TerminalMode};

// Binary-only dependencies.
use clap as _;
use tracing_subscriber as _;
#[cfg(feature = "serde")]
use serde as _;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use serde_json as _;
#[cfg(test)]
use tempfile as _;
