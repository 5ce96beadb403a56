//! Debugger front-end configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Escape byte that returns the keyboard to the debugger (Ctrl-]).
pub const DEFAULT_ESCAPE_BYTE: u8 = 0x1d;

/// Upper bound on tokens per command line.
pub const DEFAULT_MAX_TOKENS: usize = 25;

/// Chunk size for draining program output.
pub const IO_BUFFER_SIZE: usize = 1024;

/// Session configuration, built from command-line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DebuggerConfig {
    /// Monitor connection string.
    pub connection: String,
    /// Byte that hands the terminal back from the target.
    pub escape_byte: u8,
    /// Timeout for each status poll.
    pub poll_interval: Duration,
    /// Tokens kept per command line.
    pub max_tokens: usize,
    /// Commands and program input read before the keyboard.
    pub command_file: Option<PathBuf>,
    /// Command prompt.
    pub prompt: String,
    /// Instructions shown by a bare `l`.
    pub listing_length: u32,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            connection: "loopback".to_owned(),
            escape_byte: DEFAULT_ESCAPE_BYTE,
            poll_interval: Duration::from_millis(50),
            max_tokens: DEFAULT_MAX_TOKENS,
            command_file: None,
            prompt: "mondfe> ".to_owned(),
            listing_length: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DebuggerConfig::default();
        assert_eq!(config.connection, "loopback");
        assert_eq!(config.escape_byte, 0x1d);
        assert_eq!(config.max_tokens, 25);
        assert!(config.command_file.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_string(&DebuggerConfig::default()).expect("serialize");
        let back: DebuggerConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, DebuggerConfig::default());
    }
}
