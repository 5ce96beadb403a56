//! Command-level error taxonomy.

use am29k_isa::IsaError;
use thiserror::Error;

use crate::remote::RemoteError;

/// How the command loop reports an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Reported with a reason; nothing was changed.
    Warning,
    /// Reported as a failed command.
    Failure,
}

/// Errors returned by command handlers and the session loop.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Malformed command or operand text.
    #[error("syntax error")]
    Syntax,
    /// Value out of range for its field.
    #[error("operand out of range")]
    BadOperand,
    /// Register outside the connected processor's register files.
    #[error("invalid register")]
    BadRegister,
    /// Address outside the target's memory windows.
    #[error("address out of range")]
    BadAddress,
    /// A breakpoint already exists at that address.
    #[error("breakpoint already set")]
    AlreadySet,
    /// No breakpoint at that address.
    #[error("no breakpoint at that address")]
    NotFound,
    /// The monitor rejected or timed out a request.
    #[error("remote failure: {0}")]
    RemoteFailure(RemoteError),
    /// Unknown command keyword.
    #[error("no such command: {0}")]
    NoSuchCommand(String),
    /// Local terminal or file error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The session cannot continue.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CommandError {
    /// Returns `true` for errors that end the command loop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Reporting class for the command loop.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::NoSuchCommand(_) | Self::AlreadySet | Self::NotFound => Severity::Warning,
            _ => Severity::Failure,
        }
    }
}

impl From<IsaError> for CommandError {
    fn from(err: IsaError) -> Self {
        match err {
            IsaError::Syntax => Self::Syntax,
            IsaError::BadOperand => Self::BadOperand,
            IsaError::BadRegister => Self::BadRegister,
            IsaError::BadAddress => Self::BadAddress,
        }
    }
}

impl From<RemoteError> for CommandError {
    fn from(err: RemoteError) -> Self {
        if err.is_session_lost() {
            Self::Fatal(err.to_string())
        } else {
            Self::RemoteFailure(err)
        }
    }
}
