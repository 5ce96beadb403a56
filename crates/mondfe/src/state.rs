//! Target execution status as reported by the monitor.

use std::fmt;

/// Decoded status word from a remote poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u32)]
pub enum SessionState {
    /// No program is executing.
    #[default]
    NotExecuting = 0,
    /// The target is executing.
    Running = 1,
    /// Stopped on request.
    Stopped = 2,
    /// Stopped at a breakpoint.
    Break = 3,
    /// A step request completed.
    Stepped = 4,
    /// Halted by a halt request or a `halt` instruction.
    Halted = 5,
    /// Stopped with a monitor warning.
    Warned = 6,
    /// Stopped on an unexpected trap.
    Trapped = 7,
    /// The program exited.
    Exited = 8,
    /// Program output is waiting on stdout.
    StdoutReady = 9,
    /// Program output is waiting on stderr.
    StderrReady = 10,
    /// The program is blocked reading stdin.
    StdinNeeded = 11,
    /// The program changed its stdin mode.
    StdinModeExchange = 12,
}

impl SessionState {
    /// Maps a raw status word, `None` if the monitor sent an unknown value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::NotExecuting),
            1 => Some(Self::Running),
            2 => Some(Self::Stopped),
            3 => Some(Self::Break),
            4 => Some(Self::Stepped),
            5 => Some(Self::Halted),
            6 => Some(Self::Warned),
            7 => Some(Self::Trapped),
            8 => Some(Self::Exited),
            9 => Some(Self::StdoutReady),
            10 => Some(Self::StderrReady),
            11 => Some(Self::StdinNeeded),
            12 => Some(Self::StdinModeExchange),
            _ => None,
        }
    }

    /// Raw status word.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// States that end execution and print a status banner.
    #[must_use]
    pub const fn is_stop(self) -> bool {
        matches!(
            self,
            Self::Stopped | Self::Break | Self::Stepped | Self::Halted | Self::Warned | Self::Trapped
        )
    }

    /// Banner label for stop states and exit.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotExecuting => "not executing",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Break => "breakpoint hit",
            Self::Stepped => "stepped",
            Self::Halted => "halted",
            Self::Warned => "stopped with warning",
            Self::Trapped => "trapped",
            Self::Exited => "program exited",
            Self::StdoutReady => "stdout ready",
            Self::StderrReady => "stderr ready",
            Self::StdinNeeded => "stdin needed",
            Self::StdinModeExchange => "stdin mode change",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which side currently reads the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TerminalOwner {
    /// Keystrokes form debugger commands.
    #[default]
    User,
    /// Keystrokes are relayed to the target program.
    Target,
}

#[cfg(test)]
mod tests {
    use super::SessionState;

    #[test]
    fn raw_words_roundtrip() {
        for raw in 0..=12 {
            let state = SessionState::from_raw(raw).expect("known status");
            assert_eq!(state.as_raw(), raw);
        }
        assert_eq!(SessionState::from_raw(13), None);
    }

    #[test]
    fn stop_group_excludes_io_and_exit() {
        assert!(SessionState::Break.is_stop());
        assert!(SessionState::Warned.is_stop());
        assert!(!SessionState::Running.is_stop());
        assert!(!SessionState::Exited.is_stop());
        assert!(!SessionState::StdoutReady.is_stop());
    }

    #[test]
    fn default_is_not_executing() {
        assert_eq!(SessionState::default(), SessionState::NotExecuting);
    }
}
