use am29k_asm as _;
use am29k_isa as _;
use clap as _;
use crossterm as _;
use proptest as _;
use rstest as _;
use serde_json as _;
use thiserror as _;
use tracing as _;
use tracing_subscriber as _;
#[cfg(feature = "serde")]
use serde as _;

use std::io::Write;

use am29k_isa::Space;
use mondfe::{
    CommandError, DebuggerConfig, LoopbackTarget, RemoteErrorKind, RemoteOp, ScriptedTerminal,
    Session, SessionExit, SessionState, TerminalMode, TerminalOwner,
};

fn connect(remote: &LoopbackTarget, terminal: &ScriptedTerminal) -> Session {
    connect_with(remote, terminal, DebuggerConfig::default())
}

fn connect_with(
    remote: &LoopbackTarget,
    terminal: &ScriptedTerminal,
    config: DebuggerConfig,
) -> Session {
    Session::connect(Box::new(remote.clone()), Box::new(terminal.clone()), config)
        .expect("loopback connects")
}

#[test]
fn connect_opens_session_and_mirrors_target() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    let session = connect(&remote, &terminal);
    assert_eq!(
        remote.calls(),
        [
            RemoteOp::Init,
            RemoteOp::SelectSession,
            RemoteOp::QueryConfig,
            RemoteOp::BreakpointStatus,
        ]
    );
    assert_eq!(session.state(), SessionState::NotExecuting);
    assert_eq!(session.owner(), TerminalOwner::User);
}

#[test]
fn running_then_stopped_prints_one_banner() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    for state in [
        SessionState::Running,
        SessionState::Running,
        SessionState::Stopped,
    ] {
        remote.push_status(state);
    }
    let mut session = connect(&remote, &terminal);

    session.iterate().expect("running");
    assert_eq!(session.owner(), TerminalOwner::Target);
    session.iterate().expect("still running");
    assert_eq!(session.run().expect("ends at end of input"), SessionExit::Quit);

    assert_eq!(session.owner(), TerminalOwner::User);
    assert!(!session.target_is_running());
    assert_eq!(terminal.output().matches("stopped at pc").count(), 1);
    assert_eq!(terminal.modes(), [TerminalMode::Raw, TerminalMode::Cooked]);
}

#[test]
fn repeated_stop_status_does_not_repeat_banner() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.push_status(SessionState::Halted);
    remote.push_status(SessionState::Halted);
    terminal.push_line("");
    terminal.push_line("");
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("first halt");
    session.iterate().expect("second halt");
    assert_eq!(terminal.output().matches("halted at pc").count(), 1);
}

#[test]
fn stop_banner_shows_decoded_instruction_at_pc() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.load(Space::InstructionMemory, 0x40, &[0x14, 0x01, 0x02, 0x03]);
    remote.set_pc(0x40);
    remote.push_status(SessionState::Break);
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("break");
    let output = terminal.output();
    assert!(output.contains("breakpoint hit at pc 00000040"), "{output}");
    assert!(output.contains(" 00000040  14010203  add gr01,gr02,gr03"), "{output}");
}

#[test]
fn exit_status_is_announced_once() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.push_status(SessionState::Exited);
    remote.push_status(SessionState::Exited);
    terminal.push_line("");
    let mut session = connect(&remote, &terminal);
    assert_eq!(session.run().expect("quit"), SessionExit::Quit);
    assert_eq!(terminal.output().matches("program exited").count(), 1);
}

#[test]
fn stdout_is_drained_in_chunks_until_short_read() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    let payload: Vec<u8> = (0..2500u32).map(|i| b'a' + (i % 26) as u8).collect();
    remote.push_stdout(&payload);
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("drain");
    assert_eq!(session.state(), SessionState::StdoutReady);
    assert_eq!(remote.call_count(RemoteOp::GetStdout), 3);
    let output = terminal.output();
    assert!(output.starts_with(std::str::from_utf8(&payload).expect("ascii")));
}

#[test]
fn stderr_is_drained_to_the_terminal() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.push_stderr(b"fault\n");
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("drain");
    assert!(terminal.output().starts_with("fault\n"));
    assert_eq!(remote.call_count(RemoteOp::GetStderr), 1);
}

#[test]
fn stdin_request_relays_one_line() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.push_status(SessionState::Running);
    remote.push_status(SessionState::StdinNeeded);
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("running");
    terminal.push_line("hello");
    session.iterate().expect("stdin needed");
    assert_eq!(remote.stdin(), b"hello\n");
}

#[test]
fn stdin_request_prefers_command_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "from file").expect("write");
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    terminal.push_line("cfg");
    remote.push_status(SessionState::StdinNeeded);
    let config = DebuggerConfig {
        command_file: Some(file.path().to_path_buf()),
        ..DebuggerConfig::default()
    };
    let mut session = connect_with(&remote, &terminal, config);
    session.iterate().expect("stdin needed");
    assert_eq!(remote.stdin(), b"from file\n");
    assert!(terminal.output().contains("processor: Am29000"));
}

#[test]
fn keystrokes_relay_until_escape_byte() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.push_status(SessionState::Running);
    remote.push_status(SessionState::Running);
    terminal.push_bytes(b"ab\x1dk\n");
    let mut session = connect(&remote, &terminal);

    session.iterate().expect("relay");
    assert_eq!(remote.stdin(), b"ab");
    assert_eq!(session.owner(), TerminalOwner::User);

    session.iterate().expect("command while running");
    assert_eq!(session.owner(), TerminalOwner::User);
    assert_eq!(remote.call_count(RemoteOp::Halt), 1);
    assert_eq!(remote.stdin(), b"ab");
}

#[test]
fn custom_escape_byte_is_honoured() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.push_status(SessionState::Running);
    terminal.push_bytes(b"x\x1d~");
    let config = DebuggerConfig {
        escape_byte: b'~',
        ..DebuggerConfig::default()
    };
    let mut session = connect_with(&remote, &terminal, config);
    session.iterate().expect("relay");
    assert_eq!(remote.stdin(), b"x\x1d");
    assert_eq!(session.owner(), TerminalOwner::User);
}

#[test]
fn raw_stdin_mode_gives_terminal_to_target() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.set_stdin_mode(1);
    remote.push_status(SessionState::StdinModeExchange);
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("mode exchange");
    assert_eq!(session.owner(), TerminalOwner::Target);
    assert_eq!(terminal.modes(), [TerminalMode::Raw]);
}

#[test]
fn cooked_stdin_mode_keeps_terminal_while_running() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.set_stdin_mode(0);
    remote.push_status(SessionState::StdinModeExchange);
    remote.push_status(SessionState::Running);
    terminal.push_line("");
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("mode exchange");
    session.iterate().expect("running");
    assert!(session.target_is_running());
    assert_eq!(session.owner(), TerminalOwner::User);
}

#[test]
fn unrecognized_stdin_mode_falls_back_to_cooked() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.set_stdin_mode(7);
    remote.push_status(SessionState::StdinModeExchange);
    remote.push_status(SessionState::Running);
    terminal.push_line("");
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("fallback is recoverable");
    session.iterate().expect("running");
    assert_eq!(session.owner(), TerminalOwner::User);
}

#[test]
fn unknown_status_word_is_treated_as_not_executing() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.push_raw_status(99);
    terminal.push_line("");
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("unknown status tolerated");
    assert_eq!(session.state(), SessionState::NotExecuting);
}

#[test]
fn interrupt_halts_running_target() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.push_status(SessionState::Running);
    remote.push_status(SessionState::Running);
    let mut session = connect(&remote, &terminal);
    session.iterate().expect("running");
    session
        .interrupt_handle()
        .store(true, std::sync::atomic::Ordering::SeqCst);
    session.iterate().expect("interrupted");
    assert_eq!(remote.call_count(RemoteOp::Halt), 1);
    assert!(!session
        .interrupt_handle()
        .load(std::sync::atomic::Ordering::SeqCst));
}

#[test]
fn interrupt_while_stopped_only_reprompts() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    terminal.push_line("");
    let mut session = connect(&remote, &terminal);
    session
        .interrupt_handle()
        .store(true, std::sync::atomic::Ordering::SeqCst);
    session.iterate().expect("interrupt");
    assert_eq!(remote.call_count(RemoteOp::Halt), 0);
    assert!(terminal.output().contains("mondfe> "));
}

#[test]
fn lost_session_tears_down_in_order() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.fail_next(RemoteOp::PollStatus, RemoteErrorKind::SessionLost);
    remote.fail_next(RemoteOp::DestroyProcess, RemoteErrorKind::Timeout);
    let mut session = connect(&remote, &terminal);
    let err = session.run().expect_err("fatal");
    assert!(matches!(err, CommandError::Fatal(_)));
    let calls = remote.calls();
    assert_eq!(
        calls[calls.len() - 3..],
        [
            RemoteOp::PollStatus,
            RemoteOp::DestroyProcess,
            RemoteOp::ExitSession
        ]
    );
}

#[test]
fn recoverable_poll_failure_is_reported() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    remote.fail_next(RemoteOp::PollStatus, RemoteErrorKind::Timeout);
    let mut session = connect(&remote, &terminal);
    assert_eq!(session.run().expect("recovers"), SessionExit::Quit);
    assert!(terminal
        .output()
        .contains("error: remote failure: monitor timed out"));
}

#[test]
fn quit_destroys_process_then_exits_session() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    terminal.push_line("q");
    terminal.push_line("h");
    let mut session = connect(&remote, &terminal);
    assert_eq!(session.run().expect("quit"), SessionExit::Quit);
    let calls = remote.calls();
    assert_eq!(
        calls[calls.len() - 2..],
        [RemoteOp::DestroyProcess, RemoteOp::ExitSession]
    );
    assert!(terminal.pending_input() > 0);
}

#[test]
fn disconnect_leaves_target_alone() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    terminal.push_line("disc");
    let mut session = connect(&remote, &terminal);
    assert_eq!(session.run().expect("disc"), SessionExit::Disconnected);
    assert_eq!(remote.call_count(RemoteOp::Disconnect), 1);
    assert_eq!(remote.call_count(RemoteOp::DestroyProcess), 0);
    assert_eq!(remote.call_count(RemoteOp::ExitSession), 0);
}

#[test]
fn unknown_command_is_a_warning() {
    let remote = LoopbackTarget::new();
    let terminal = ScriptedTerminal::new();
    terminal.push_line("zz 1 2");
    let mut session = connect(&remote, &terminal);
    assert_eq!(session.run().expect("continues"), SessionExit::Quit);
    assert!(terminal.output().contains("warning: no such command: zz"));
}
