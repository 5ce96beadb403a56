//! Keyboard and screen access for the session loop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use crossterm::tty::IsTty;

/// Echo discipline of the local terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TerminalMode {
    /// Host echoes typed bytes.
    #[default]
    Cooked,
    /// Bytes pass through without echo.
    Raw,
}

/// Terminal seen by the session: a writer plus line and byte input.
pub trait TerminalChannel: Write {
    /// Blocks for one line without its terminator; `None` at end of input.
    ///
    /// # Errors
    ///
    /// Underlying terminal failure.
    fn read_line_blocking(&mut self) -> io::Result<Option<String>>;

    /// Returns one pending byte without blocking.
    ///
    /// # Errors
    ///
    /// Underlying terminal failure.
    fn try_read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Switches echo discipline.
    ///
    /// # Errors
    ///
    /// Underlying terminal failure.
    fn set_mode(&mut self, mode: TerminalMode) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct Script {
    input: VecDeque<u8>,
    output: Vec<u8>,
    modes: Vec<TerminalMode>,
}

/// Terminal that replays canned input and captures everything written.
///
/// Clones share the same buffers, so a test can keep a handle after moving
/// one into a session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTerminal {
    script: Rc<RefCell<Script>>,
}

impl ScriptedTerminal {
    /// Creates a terminal with no pending input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `line` followed by a newline.
    pub fn push_line(&self, line: &str) {
        let mut script = self.script.borrow_mut();
        script.input.extend(line.bytes());
        script.input.push_back(b'\n');
    }

    /// Queues raw bytes.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.script.borrow_mut().input.extend(bytes);
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.script.borrow().output).into_owned()
    }

    /// Mode changes in the order they were requested.
    #[must_use]
    pub fn modes(&self) -> Vec<TerminalMode> {
        self.script.borrow().modes.clone()
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn pending_input(&self) -> usize {
        self.script.borrow().input.len()
    }
}

impl Write for ScriptedTerminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.script.borrow_mut().output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl TerminalChannel for ScriptedTerminal {
    fn read_line_blocking(&mut self) -> io::Result<Option<String>> {
        let mut script = self.script.borrow_mut();
        if script.input.is_empty() {
            return Ok(None);
        }
        let mut line = Vec::new();
        while let Some(byte) = script.input.pop_front() {
            if byte == b'\n' {
                break;
            }
            line.push(byte);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    fn try_read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.script.borrow_mut().input.pop_front())
    }

    fn set_mode(&mut self, mode: TerminalMode) -> io::Result<()> {
        self.script.borrow_mut().modes.push(mode);
        Ok(())
    }
}

/// Interactive terminal on the process's stdin and stdout.
///
/// On a tty the terminal runs in raw mode and does its own line editing;
/// Ctrl-C raises the shared interrupt flag instead of killing the process.
/// Redirected stdin is read line by line and never yields single bytes.
pub struct CrosstermTerminal {
    interrupt: Arc<AtomicBool>,
    interactive: bool,
    mode: TerminalMode,
    pending: VecDeque<u8>,
    stdout: io::Stdout,
}

impl CrosstermTerminal {
    /// Opens the terminal; Ctrl-C will set `interrupt`.
    ///
    /// # Errors
    ///
    /// Raw mode could not be enabled.
    pub fn new(interrupt: Arc<AtomicBool>) -> io::Result<Self> {
        let interactive = io::stdin().is_tty();
        if interactive {
            terminal::enable_raw_mode()?;
        }
        Ok(Self {
            interrupt,
            interactive,
            mode: TerminalMode::Cooked,
            pending: VecDeque::new(),
            stdout: io::stdout(),
        })
    }

    fn next_key(timeout: Option<Duration>) -> io::Result<Option<KeyEvent>> {
        if let Some(timeout) = timeout {
            if !event::poll(timeout)? {
                return Ok(None);
            }
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key)),
            _ => Ok(None),
        }
    }

    fn is_ctrl_c(key: &KeyEvent) -> bool {
        key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
    }

    fn key_bytes(key: &KeyEvent, out: &mut VecDeque<u8>) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char(c) if ctrl => {
                if let Ok(byte) = u8::try_from(c) {
                    out.push_back(byte & 0x1f);
                }
            }
            KeyCode::Char(c) => {
                let mut buf = [0; 4];
                out.extend(c.encode_utf8(&mut buf).bytes());
            }
            KeyCode::Enter => out.push_back(b'\n'),
            KeyCode::Tab => out.push_back(b'\t'),
            KeyCode::Backspace => out.push_back(0x08),
            KeyCode::Esc => out.push_back(0x1b),
            _ => {}
        }
    }

    fn echo(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }

    fn edit_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        loop {
            let Some(key) = Self::next_key(None)? else {
                continue;
            };
            if Self::is_ctrl_c(&key) {
                self.interrupt.store(true, Ordering::SeqCst);
                self.echo(b"^C\n")?;
                return Ok(Some(String::new()));
            }
            let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
            match key.code {
                KeyCode::Char('d') if ctrl && line.is_empty() => return Ok(None),
                KeyCode::Enter => {
                    self.echo(b"\n")?;
                    return Ok(Some(line));
                }
                KeyCode::Backspace => {
                    if line.pop().is_some() {
                        self.echo(b"\x08 \x08")?;
                    }
                }
                KeyCode::Char(c) if !ctrl => {
                    line.push(c);
                    let mut buf = [0; 4];
                    self.echo(c.encode_utf8(&mut buf).as_bytes())?;
                }
                _ => {}
            }
        }
    }
}

impl Drop for CrosstermTerminal {
    fn drop(&mut self) {
        if self.interactive {
            let _ = terminal::disable_raw_mode();
        }
    }
}

impl Write for CrosstermTerminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.interactive {
            return self.stdout.write(buf);
        }
        // Raw mode does not translate newlines.
        for chunk in buf.split_inclusive(|byte| *byte == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(body) => {
                    self.stdout.write_all(body)?;
                    self.stdout.write_all(b"\r\n")?;
                }
                None => self.stdout.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

impl TerminalChannel for CrosstermTerminal {
    fn read_line_blocking(&mut self) -> io::Result<Option<String>> {
        if self.interactive {
            return self.edit_line();
        }
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    fn try_read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(byte) = self.pending.pop_front() {
            return Ok(Some(byte));
        }
        if !self.interactive {
            return Ok(None);
        }
        let Some(key) = Self::next_key(Some(Duration::ZERO))? else {
            return Ok(None);
        };
        if Self::is_ctrl_c(&key) {
            self.interrupt.store(true, Ordering::SeqCst);
            return Ok(None);
        }
        let mut bytes = VecDeque::new();
        Self::key_bytes(&key, &mut bytes);
        if self.mode == TerminalMode::Cooked {
            let shown: Vec<u8> = bytes
                .iter()
                .copied()
                .filter(|byte| *byte >= 0x20 || *byte == b'\n')
                .collect();
            self.echo(&shown)?;
        }
        let first = bytes.pop_front();
        self.pending.extend(bytes);
        Ok(first)
    }

    fn set_mode(&mut self, mode: TerminalMode) -> io::Result<()> {
        self.mode = mode;
        Ok(())
    }
}
