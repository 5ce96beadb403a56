//! Procedural interface to the target-resident monitor.
//!
//! The transport underneath (serial line, shared memory, message passing)
//! is owned by the implementor. Every call is synchronous and bounded.

use std::fmt;
use std::time::Duration;

use am29k_isa::{Space, TargetConfig};
use thiserror::Error;

/// Session handle returned by [`RemoteTarget::init`].
pub type SessionId = u32;

/// Result alias for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure category of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RemoteErrorKind {
    /// The monitor rejected the request with its own error code.
    Failed(i32),
    /// No reply within the transport timeout.
    Timeout,
    /// The session is gone and cannot be recovered.
    SessionLost,
    /// The monitor does not implement the request.
    Unsupported,
}

/// Error returned by a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[error("{kind}")]
pub struct RemoteError {
    /// What went wrong.
    pub kind: RemoteErrorKind,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(code) => write!(f, "monitor error {code}"),
            Self::Timeout => f.write_str("monitor timed out"),
            Self::SessionLost => f.write_str("monitor session lost"),
            Self::Unsupported => f.write_str("request not supported by monitor"),
        }
    }
}

impl RemoteError {
    /// Creates an error of the given kind.
    #[must_use]
    pub const fn new(kind: RemoteErrorKind) -> Self {
        Self { kind }
    }

    /// Returns `true` when the session cannot continue.
    #[must_use]
    pub const fn is_session_lost(self) -> bool {
        matches!(self.kind, RemoteErrorKind::SessionLost)
    }
}

impl From<RemoteErrorKind> for RemoteError {
    fn from(kind: RemoteErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Breakpoint variant understood by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum BreakpointKind {
    /// Instruction replaced by a trap.
    #[default]
    Software = 0,
    /// Am29050 hardware breakpoint on a virtual address.
    Am29050Virtual = 1,
    /// Am29050 hardware breakpoint on a physical address.
    Am29050Physical = 2,
}

impl BreakpointKind {
    /// Converts a wire code.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Software),
            1 => Some(Self::Am29050Virtual),
            2 => Some(Self::Am29050Physical),
            _ => None,
        }
    }

    /// Short name used in listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Software => "sw",
            Self::Am29050Virtual => "050v",
            Self::Am29050Physical => "050p",
        }
    }
}

/// One breakpoint as reported by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RemoteBreakpoint {
    /// Address space of the breakpoint.
    pub space: Space,
    /// Breakpoint address.
    pub address: u32,
    /// Passes before the breakpoint triggers.
    pub pass_count: i32,
    /// Passes taken so far.
    pub current_count: i32,
    /// Breakpoint variant.
    pub kind: BreakpointKind,
}

/// Reply to a breakpoint slot query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointSlot {
    /// The slot holds a breakpoint.
    Active(RemoteBreakpoint),
    /// No slots at or beyond this index.
    NoMore,
    /// This slot is empty.
    Invalid,
}

/// Input discipline requested by the target program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StdinMode {
    /// Line-buffered, echoed by the host.
    #[default]
    Cooked,
    /// Unbuffered bytes.
    Raw,
    /// Unbuffered bytes, program does not block.
    Async,
}

impl StdinMode {
    /// Maps a raw mode word, `None` if unrecognized.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Cooked),
            1 => Some(Self::Raw),
            2 => Some(Self::Async),
            _ => None,
        }
    }

    /// Raw mode word.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Cooked => 0,
            Self::Raw => 1,
            Self::Async => 2,
        }
    }
}

/// Calls consumed from the monitor.
///
/// Memory transfers count in units of `unit_size` bytes. With `host_endian`
/// the monitor converts each unit to host byte order; otherwise bytes are
/// returned in target (big-endian) order.
pub trait RemoteTarget {
    /// Opens a session on the monitor named by `connection`.
    fn init(&mut self, connection: &str) -> RemoteResult<SessionId>;
    /// Makes `id` the current session.
    fn select_session(&mut self, id: SessionId) -> RemoteResult<()>;
    /// Detaches, leaving the target program as it is.
    fn disconnect(&mut self) -> RemoteResult<()>;
    /// Destroys the target process.
    fn destroy_process(&mut self) -> RemoteResult<()>;
    /// Closes the session.
    fn exit_session(&mut self) -> RemoteResult<()>;

    /// Reads `count` units; returns the bytes and the number of units read.
    fn read_memory(
        &mut self,
        space: Space,
        address: u32,
        count: u32,
        unit_size: u32,
        host_endian: bool,
    ) -> RemoteResult<(Vec<u8>, u32)>;
    /// Writes `count` units from `bytes`; returns the number of units written.
    fn write_memory(
        &mut self,
        space: Space,
        address: u32,
        count: u32,
        unit_size: u32,
        bytes: &[u8],
        host_endian: bool,
    ) -> RemoteResult<u32>;
    /// Copies `byte_count` bytes between spaces.
    fn copy_memory(
        &mut self,
        src_space: Space,
        src_address: u32,
        dst_space: Space,
        dst_address: u32,
        byte_count: u32,
    ) -> RemoteResult<()>;
    /// Repeats `pattern` over `count` units.
    fn fill_memory(
        &mut self,
        space: Space,
        address: u32,
        count: u32,
        unit_size: u32,
        pattern: &[u8],
    ) -> RemoteResult<()>;

    /// Creates a breakpoint; returns the monitor-assigned id.
    fn set_breakpoint(
        &mut self,
        space: Space,
        address: u32,
        pass_count: i32,
        kind: BreakpointKind,
    ) -> RemoteResult<i32>;
    /// Removes breakpoint `id`.
    fn remove_breakpoint(&mut self, id: i32) -> RemoteResult<()>;
    /// Queries breakpoint slot `slot`.
    fn breakpoint_status(&mut self, slot: u32) -> RemoteResult<BreakpointSlot>;

    /// Starts or continues execution.
    fn run(&mut self) -> RemoteResult<()>;
    /// Executes `count` instructions.
    fn step(&mut self, count: u32) -> RemoteResult<()>;
    /// Stops execution.
    fn halt(&mut self) -> RemoteResult<()>;
    /// Resets the processor.
    fn reset_processor(&mut self) -> RemoteResult<()>;
    /// Waits at most `timeout` for a status change; returns the raw status word.
    fn poll_status(&mut self, timeout: Duration) -> RemoteResult<u32>;

    /// Takes up to `max_bytes` of program stdout.
    fn get_stdout(&mut self, max_bytes: usize) -> RemoteResult<Vec<u8>>;
    /// Takes up to `max_bytes` of program stderr.
    fn get_stderr(&mut self, max_bytes: usize) -> RemoteResult<Vec<u8>>;
    /// Delivers bytes to program stdin.
    fn put_stdin(&mut self, bytes: &[u8]) -> RemoteResult<()>;
    /// Returns the raw stdin mode word requested by the program.
    fn query_stdin_mode(&mut self) -> RemoteResult<u32>;

    /// Reports processor and memory configuration.
    fn query_config(&mut self) -> RemoteResult<TargetConfig>;
}

/// Reads one big-endian word.
///
/// # Errors
///
/// The remote error, or [`RemoteErrorKind::Failed`] with code `-1` on a short read.
pub fn read_word(remote: &mut dyn RemoteTarget, space: Space, address: u32) -> RemoteResult<u32> {
    let (bytes, done) = remote.read_memory(space, address, 1, 4, false)?;
    match (done, bytes.as_slice()) {
        (1, [b0, b1, b2, b3, ..]) => Ok(u32::from_be_bytes([*b0, *b1, *b2, *b3])),
        _ => Err(RemoteErrorKind::Failed(-1).into()),
    }
}

/// Writes one big-endian word.
///
/// # Errors
///
/// The remote error, or [`RemoteErrorKind::Failed`] with code `-1` on a short write.
pub fn write_word(
    remote: &mut dyn RemoteTarget,
    space: Space,
    address: u32,
    value: u32,
) -> RemoteResult<()> {
    match remote.write_memory(space, address, 1, 4, &value.to_be_bytes(), false)? {
        1 => Ok(()),
        _ => Err(RemoteErrorKind::Failed(-1).into()),
    }
}
