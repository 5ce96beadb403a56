//! The polling loop that couples the monitor, the terminal and the command table.
//!
//! Each [`Session::iterate`] call:
//! - services a pending interrupt (halt a running target, else reprompt)
//! - polls the monitor once and applies the resulting state transition
//! - reads input for whichever side owns the terminal

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use am29k_isa::{Address, DisassemblyRow, Instruction, Space, TargetConfig};
use tracing::{debug, info, warn};

use crate::breakpoints::BreakpointTable;
use crate::commands::COMMANDS;
use crate::config::{DebuggerConfig, IO_BUFFER_SIZE};
use crate::dispatcher::{normalize, tokenize};
use crate::error::{CommandError, Severity};
use crate::remote::{read_word, RemoteTarget, StdinMode};
use crate::state::{SessionState, TerminalOwner};
use crate::terminal::{TerminalChannel, TerminalMode};

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

/// How the command loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionExit {
    /// Quit: the target process and the session were torn down.
    Quit,
    /// Detached; the target was left as it was.
    Disconnected,
}

/// Which program output stream to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// One debugging session against a connected monitor.
pub struct Session {
    pub(crate) remote: Box<dyn RemoteTarget>,
    pub(crate) terminal: Box<dyn TerminalChannel>,
    pub(crate) breakpoints: BreakpointTable,
    pub(crate) target_config: TargetConfig,
    pub(crate) config: DebuggerConfig,
    command_file: Option<Box<dyn BufRead>>,
    interrupt: Arc<AtomicBool>,
    owner: TerminalOwner,
    state: SessionState,
    target_running: bool,
    banner_shown: bool,
    escape_override: bool,
    stdin_override: Option<TerminalOwner>,
    pending_line: Vec<u8>,
    prompt_shown: bool,
    exit: Option<SessionExit>,
}

impl Session {
    /// Opens a monitor session and mirrors its configuration and breakpoints.
    ///
    /// # Errors
    ///
    /// Any remote failure during setup, or [`CommandError::Io`] if the
    /// configured command file cannot be opened.
    pub fn connect(
        mut remote: Box<dyn RemoteTarget>,
        terminal: Box<dyn TerminalChannel>,
        config: DebuggerConfig,
    ) -> Result<Self, CommandError> {
        let command_file: Option<Box<dyn BufRead>> = match &config.command_file {
            Some(path) => Some(Box::new(BufReader::new(File::open(path)?))),
            None => None,
        };
        let id = remote.init(&config.connection)?;
        remote.select_session(id)?;
        let target_config = remote.query_config()?;
        let mut breakpoints = BreakpointTable::new();
        breakpoints.refresh_from_target(remote.as_mut())?;
        info!(
            connection = %config.connection,
            session = id,
            processor = %target_config.processor(),
            breakpoints = breakpoints.len(),
            "connected"
        );
        Ok(Self {
            remote,
            terminal,
            breakpoints,
            target_config,
            config,
            command_file,
            interrupt: Arc::new(AtomicBool::new(false)),
            owner: TerminalOwner::User,
            state: SessionState::NotExecuting,
            target_running: false,
            banner_shown: false,
            escape_override: false,
            stdin_override: None,
            pending_line: Vec::new(),
            prompt_shown: false,
            exit: None,
        })
    }

    /// Replaces the interrupt flag, e.g. with one shared with the terminal.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Flag that requests an interrupt on the next iteration.
    #[must_use]
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Last state reported by the monitor.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Side that currently reads the keyboard.
    #[must_use]
    pub const fn owner(&self) -> TerminalOwner {
        self.owner
    }

    /// Whether the monitor last reported the target as running.
    #[must_use]
    pub const fn target_is_running(&self) -> bool {
        self.target_running
    }

    /// Local breakpoint mirror.
    #[must_use]
    pub const fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    /// Configuration reported by the monitor at connect or reset.
    #[must_use]
    pub const fn target_config(&self) -> &TargetConfig {
        &self.target_config
    }

    /// Runs until quit, disconnect or a fatal error.
    ///
    /// Non-fatal errors are reported on the terminal and the loop continues.
    ///
    /// # Errors
    ///
    /// [`CommandError::Fatal`], after the session has been torn down.
    pub fn run(&mut self) -> Result<SessionExit, CommandError> {
        loop {
            match self.iterate() {
                Ok(()) => {}
                Err(err) if err.is_fatal() => {
                    warn!(%err, "session aborted");
                    self.teardown();
                    return Err(err);
                }
                Err(err) => self.report(&err),
            }
            if let Some(exit) = self.exit.take() {
                if exit == SessionExit::Quit {
                    self.teardown();
                }
                return Ok(exit);
            }
        }
    }

    /// One poll of the monitor plus one round of input.
    ///
    /// # Errors
    ///
    /// Remote failures while applying the transition, command errors, and
    /// [`CommandError::Fatal`] when the session or the terminal is gone.
    pub fn iterate(&mut self) -> Result<(), CommandError> {
        if self.interrupt.swap(false, Ordering::SeqCst) {
            if self.target_running {
                info!("interrupt: halting target");
                self.remote.halt()?;
            } else {
                self.prompt_shown = false;
            }
        }

        let raw = self.remote.poll_status(self.config.poll_interval)?;
        let state = SessionState::from_raw(raw).unwrap_or_else(|| {
            warn!(raw, "unknown status word from monitor");
            SessionState::NotExecuting
        });
        if state != self.state {
            debug!(from = %self.state, to = %state, "state change");
        }
        self.state = state;
        self.apply(state)?;

        if self.exit.is_none() {
            self.service_input()?;
        }
        Ok(())
    }

    /// Rearms the stop banner; called when the target is told to go or step.
    pub(crate) fn expect_execution(&mut self) {
        self.banner_shown = false;
    }

    pub(crate) fn request_exit(&mut self, exit: SessionExit) {
        self.exit = Some(exit);
    }

    /// Next input line, from the command file while it lasts.
    pub(crate) fn next_line(&mut self) -> Result<Option<String>, CommandError> {
        if let Some(reader) = self.command_file.as_mut() {
            let mut line = String::new();
            if reader.read_line(&mut line)? > 0 {
                let line = line.trim_end_matches(['\r', '\n']).to_owned();
                writeln!(self.terminal, "{line}")?;
                return Ok(Some(line));
            }
            debug!("command file exhausted");
            self.command_file = None;
        }
        self.terminal.flush()?;
        self.terminal
            .read_line_blocking()
            .map_err(|err| CommandError::Fatal(format!("terminal: {err}")))
    }

    /// Prints a non-fatal error as a warning or failure line.
    pub(crate) fn report(&mut self, err: &CommandError) {
        let label = match err.severity() {
            Severity::Warning => "warning",
            Severity::Failure => "error",
        };
        if let Err(io) = writeln!(self.terminal, "{label}: {err}") {
            warn!(%io, "could not report command error");
        }
    }

    fn execute_line(&mut self, line: &str) -> Result<(), CommandError> {
        let tokens = normalize(tokenize(line, self.config.max_tokens));
        COMMANDS.dispatch(self, &tokens)
    }

    fn set_owner(&mut self, owner: TerminalOwner) -> Result<(), CommandError> {
        if owner != self.owner {
            debug!(?owner, "terminal owner change");
            self.owner = owner;
            let mode = match owner {
                TerminalOwner::User => TerminalMode::Cooked,
                TerminalOwner::Target => TerminalMode::Raw,
            };
            self.terminal.set_mode(mode)?;
        }
        Ok(())
    }

    fn apply(&mut self, state: SessionState) -> Result<(), CommandError> {
        match state {
            SessionState::Running => {
                self.target_running = true;
                if !self.escape_override {
                    self.set_owner(self.stdin_override.unwrap_or(TerminalOwner::Target))?;
                }
            }
            SessionState::NotExecuting => {
                self.target_running = false;
                self.set_owner(TerminalOwner::User)?;
            }
            SessionState::Exited => {
                self.stop_target()?;
                if !self.banner_shown {
                    self.banner_shown = true;
                    writeln!(self.terminal, "{}", state.label())?;
                }
            }
            SessionState::StdoutReady => self.drain(OutputStream::Stdout)?,
            SessionState::StderrReady => self.drain(OutputStream::Stderr)?,
            SessionState::StdinNeeded => {
                let line = self.next_line()?;
                let bytes = line.map(|line| line + "\n").unwrap_or_default();
                self.remote.put_stdin(bytes.as_bytes())?;
            }
            SessionState::StdinModeExchange => {
                let raw = self.remote.query_stdin_mode()?;
                let mode = StdinMode::from_raw(raw).unwrap_or_else(|| {
                    warn!(raw, "unrecognized stdin mode, using cooked");
                    StdinMode::Cooked
                });
                let owner = match mode {
                    StdinMode::Cooked => TerminalOwner::User,
                    StdinMode::Raw | StdinMode::Async => TerminalOwner::Target,
                };
                debug!(?mode, "stdin mode exchange");
                self.stdin_override = Some(owner);
                self.set_owner(owner)?;
            }
            stop => {
                self.stop_target()?;
                if !self.banner_shown {
                    self.banner_shown = true;
                    self.print_stop_banner(stop)?;
                }
            }
        }
        Ok(())
    }

    fn stop_target(&mut self) -> Result<(), CommandError> {
        self.target_running = false;
        self.escape_override = false;
        self.stdin_override = None;
        self.pending_line.clear();
        self.set_owner(TerminalOwner::User)
    }

    fn print_stop_banner(&mut self, state: SessionState) -> Result<(), CommandError> {
        let pc = read_word(self.remote.as_mut(), Space::PcSpace, 0)?;
        let word = read_word(self.remote.as_mut(), Space::InstructionMemory, pc)?;
        let marked = self
            .breakpoints
            .find(&Address::new(Space::InstructionMemory, pc))
            .is_some();
        let row = DisassemblyRow::new(pc, Instruction::from_word(word), marked);
        writeln!(self.terminal, "{} at pc {pc:08x}", state.label())?;
        writeln!(self.terminal, "{}", row.render())?;
        Ok(())
    }

    fn drain(&mut self, stream: OutputStream) -> Result<(), CommandError> {
        loop {
            let chunk = match stream {
                OutputStream::Stdout => self.remote.get_stdout(IO_BUFFER_SIZE)?,
                OutputStream::Stderr => self.remote.get_stderr(IO_BUFFER_SIZE)?,
            };
            self.terminal.write_all(&chunk)?;
            if chunk.len() < IO_BUFFER_SIZE {
                break;
            }
        }
        self.terminal.flush()?;
        Ok(())
    }

    fn service_input(&mut self) -> Result<(), CommandError> {
        match self.owner {
            TerminalOwner::User if !self.target_running => {
                if !self.prompt_shown {
                    write!(self.terminal, "{}", self.config.prompt)?;
                    self.prompt_shown = true;
                }
                let line = self.next_line()?;
                self.prompt_shown = false;
                match line {
                    Some(line) => self.execute_line(&line),
                    None => {
                        info!("end of input");
                        self.request_exit(SessionExit::Quit);
                        Ok(())
                    }
                }
            }
            TerminalOwner::User => self.accumulate_line(),
            TerminalOwner::Target => self.relay_keystrokes(),
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>, CommandError> {
        self.terminal
            .try_read_byte()
            .map_err(|err| CommandError::Fatal(format!("terminal: {err}")))
    }

    fn accumulate_line(&mut self) -> Result<(), CommandError> {
        while let Some(byte) = self.read_byte()? {
            match byte {
                b'\n' | b'\r' => {
                    let line = String::from_utf8_lossy(&self.pending_line).into_owned();
                    self.pending_line.clear();
                    return self.execute_line(&line);
                }
                BACKSPACE | DELETE => {
                    self.pending_line.pop();
                }
                _ => self.pending_line.push(byte),
            }
        }
        Ok(())
    }

    fn relay_keystrokes(&mut self) -> Result<(), CommandError> {
        while let Some(byte) = self.read_byte()? {
            if byte == self.config.escape_byte {
                debug!("escape byte: terminal returned to debugger");
                self.escape_override = true;
                self.set_owner(TerminalOwner::User)?;
                writeln!(self.terminal)?;
                return Ok(());
            }
            self.remote.put_stdin(&[byte])?;
        }
        Ok(())
    }

    /// Destroys the target process and closes the session, logging failures.
    fn teardown(&mut self) {
        if let Err(err) = self.remote.destroy_process() {
            warn!(%err, "destroy process failed");
        }
        if let Err(err) = self.remote.exit_session() {
            warn!(%err, "exit session failed");
        }
        info!("session closed");
    }
}
