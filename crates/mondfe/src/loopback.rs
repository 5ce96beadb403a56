//! In-process monitor for tests and offline use.
//!
//! Memory is sparse and per space. Register spaces are indexed by register
//! number, four bytes each. Execution is simulated just far enough to move
//! the PC: `run` walks instruction memory until it reaches a breakpoint or a
//! `halt` instruction.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use am29k_isa::{MemoryRange, Space, TargetConfig};

use crate::remote::{
    BreakpointKind, BreakpointSlot, RemoteBreakpoint, RemoteErrorKind, RemoteResult,
    RemoteTarget, SessionId, StdinMode,
};
use crate::state::SessionState;

/// Opcode of the `halt` instruction.
const HALT_OPCODE: u8 = 0x89;

/// Instructions simulated per status poll while running.
const RUN_BUDGET: usize = 256;

/// Remote calls, for failure injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RemoteOp {
    Init,
    SelectSession,
    Disconnect,
    DestroyProcess,
    ExitSession,
    ReadMemory,
    WriteMemory,
    CopyMemory,
    FillMemory,
    SetBreakpoint,
    RemoveBreakpoint,
    BreakpointStatus,
    Run,
    Step,
    Halt,
    ResetProcessor,
    PollStatus,
    GetStdout,
    GetStderr,
    PutStdin,
    QueryStdinMode,
    QueryConfig,
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    op: RemoteOp,
    at_call: usize,
    kind: RemoteErrorKind,
}

#[derive(Debug)]
struct Monitor {
    config: TargetConfig,
    memory: HashMap<(Space, u32), u8>,
    pc: u32,
    running: bool,
    last_stop: SessionState,
    statuses: VecDeque<u32>,
    slots: Vec<Option<RemoteBreakpoint>>,
    stdout: VecDeque<u8>,
    stderr: VecDeque<u8>,
    stdin: Vec<u8>,
    stdin_mode: u32,
    calls: HashMap<RemoteOp, usize>,
    log: Vec<RemoteOp>,
    failures: Vec<Failure>,
    next_session: SessionId,
}

impl Monitor {
    fn new(config: TargetConfig) -> Self {
        Self {
            config,
            memory: HashMap::new(),
            pc: 0,
            running: false,
            last_stop: SessionState::NotExecuting,
            statuses: VecDeque::new(),
            slots: Vec::new(),
            stdout: VecDeque::new(),
            stderr: VecDeque::new(),
            stdin: Vec::new(),
            stdin_mode: StdinMode::Cooked.as_raw(),
            calls: HashMap::new(),
            log: Vec::new(),
            failures: Vec::new(),
            next_session: 1,
        }
    }

    /// Counts the call and fires any failure scheduled for it.
    fn enter(&mut self, op: RemoteOp) -> RemoteResult<()> {
        let count = self.calls.entry(op).or_insert(0);
        let call = *count;
        *count += 1;
        self.log.push(op);
        if let Some(index) = self
            .failures
            .iter()
            .position(|failure| failure.op == op && failure.at_call == call)
        {
            return Err(self.failures.remove(index).kind.into());
        }
        Ok(())
    }

    fn byte_key(space: Space, address: u32) -> (Space, u32) {
        if space.is_register() {
            (space, address.wrapping_mul(4))
        } else {
            (space, address)
        }
    }

    fn read_byte(&self, space: Space, byte_address: u32) -> u8 {
        if space == Space::PcSpace {
            let pc = self.pc.to_be_bytes();
            return usize::try_from(byte_address)
                .ok()
                .and_then(|index| pc.get(index).copied())
                .unwrap_or(0);
        }
        self.memory
            .get(&(space, byte_address))
            .copied()
            .unwrap_or(0)
    }

    fn write_byte(&mut self, space: Space, byte_address: u32, value: u8) {
        if space == Space::PcSpace {
            if let Ok(index @ 0..=3) = usize::try_from(byte_address) {
                let mut pc = self.pc.to_be_bytes();
                pc[index] = value;
                self.pc = u32::from_be_bytes(pc);
            }
            return;
        }
        self.memory.insert((space, byte_address), value);
    }

    fn fetch(&self, address: u32) -> [u8; 4] {
        let mut word = [0; 4];
        for (offset, byte) in (0u32..).zip(word.iter_mut()) {
            *byte = self.read_byte(Space::InstructionMemory, address.wrapping_add(offset));
        }
        word
    }

    fn breakpoint_at(&self, address: u32) -> bool {
        self.slots.iter().flatten().any(|bp| {
            bp.address == address
                && matches!(bp.space, Space::InstructionMemory | Space::InstructionRom)
        })
    }

    fn simulate(&mut self) -> SessionState {
        for executed in 0..RUN_BUDGET {
            if executed > 0 && self.breakpoint_at(self.pc) {
                return self.stop(SessionState::Break);
            }
            if self.fetch(self.pc)[0] == HALT_OPCODE {
                return self.stop(SessionState::Halted);
            }
            self.pc = self.pc.wrapping_add(4);
        }
        SessionState::Running
    }

    fn stop(&mut self, state: SessionState) -> SessionState {
        self.running = false;
        self.last_stop = state;
        state
    }
}

/// Loopback implementation of [`RemoteTarget`].
///
/// Clones share one monitor, so tests keep a handle for scripting and
/// inspection after handing a clone to the session.
#[derive(Debug, Clone)]
pub struct LoopbackTarget {
    monitor: Rc<RefCell<Monitor>>,
}

impl Default for LoopbackTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTarget {
    /// Am29000 with 1 MiB windows of instruction memory, data memory and ROM.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TargetConfig {
            processor_id: 0x00,
            coprocessor_id: None,
            rom: MemoryRange::new(0x0080_0000, 0x0010_0000),
            instruction_memory: MemoryRange::new(0, 0x0010_0000),
            data_memory: MemoryRange::new(0x0040_0000, 0x0010_0000),
        })
    }

    /// Monitor reporting `config`.
    #[must_use]
    pub fn with_config(config: TargetConfig) -> Self {
        Self {
            monitor: Rc::new(RefCell::new(Monitor::new(config))),
        }
    }

    /// Queues a status to be returned by the next poll.
    pub fn push_status(&self, state: SessionState) {
        self.push_raw_status(state.as_raw());
    }

    /// Queues a raw status word, which may be one the session does not know.
    pub fn push_raw_status(&self, raw: u32) {
        self.monitor.borrow_mut().statuses.push_back(raw);
    }

    /// Adds program output on stdout.
    pub fn push_stdout(&self, bytes: &[u8]) {
        self.monitor.borrow_mut().stdout.extend(bytes);
    }

    /// Adds program output on stderr.
    pub fn push_stderr(&self, bytes: &[u8]) {
        self.monitor.borrow_mut().stderr.extend(bytes);
    }

    /// Bytes delivered to program stdin so far.
    #[must_use]
    pub fn stdin(&self) -> Vec<u8> {
        self.monitor.borrow().stdin.clone()
    }

    /// Sets the raw stdin mode word returned by `query_stdin_mode`.
    pub fn set_stdin_mode(&self, raw: u32) {
        self.monitor.borrow_mut().stdin_mode = raw;
    }

    /// Replaces the breakpoint slots; `None` is an empty slot.
    pub fn set_breakpoint_slots(&self, slots: Vec<Option<RemoteBreakpoint>>) {
        self.monitor.borrow_mut().slots = slots;
    }

    /// Fails the next call of `op` with `kind`.
    pub fn fail_next(&self, op: RemoteOp, kind: RemoteErrorKind) {
        self.fail_nth(op, 0, kind);
    }

    /// Fails the call of `op` after `skip` further successful calls.
    pub fn fail_nth(&self, op: RemoteOp, skip: usize, kind: RemoteErrorKind) {
        let mut monitor = self.monitor.borrow_mut();
        let at_call = monitor.calls.get(&op).copied().unwrap_or(0) + skip;
        monitor.failures.push(Failure { op, at_call, kind });
    }

    /// Number of calls of `op` so far, failed ones included.
    #[must_use]
    pub fn call_count(&self, op: RemoteOp) -> usize {
        self.monitor.borrow().calls.get(&op).copied().unwrap_or(0)
    }

    /// Every call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteOp> {
        self.monitor.borrow().log.clone()
    }

    /// Current program counter.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.monitor.borrow().pc
    }

    /// Moves the program counter.
    pub fn set_pc(&self, pc: u32) {
        self.monitor.borrow_mut().pc = pc;
    }

    /// Whether a `run` is still in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.monitor.borrow().running
    }

    /// Stores `bytes` at `address` without going through the remote interface.
    pub fn load(&self, space: Space, address: u32, bytes: &[u8]) {
        let mut monitor = self.monitor.borrow_mut();
        for (offset, byte) in (0u32..).zip(bytes) {
            monitor.write_byte(space, address.wrapping_add(offset), *byte);
        }
    }

    /// Reads `len` bytes at `address` without going through the remote interface.
    #[must_use]
    pub fn peek(&self, space: Space, address: u32, len: u32) -> Vec<u8> {
        let monitor = self.monitor.borrow();
        (0..len)
            .map(|offset| monitor.read_byte(space, address.wrapping_add(offset)))
            .collect()
    }
}

fn swap_units(bytes: &mut [u8], unit_size: usize, host_endian: bool) {
    if host_endian && cfg!(target_endian = "little") && unit_size > 1 {
        for unit in bytes.chunks_exact_mut(unit_size) {
            unit.reverse();
        }
    }
}

fn unit_bytes(count: u32, unit_size: u32) -> RemoteResult<(usize, usize)> {
    let unit = usize::try_from(unit_size).map_err(|_| RemoteErrorKind::Failed(-3))?;
    if unit == 0 {
        return Err(RemoteErrorKind::Failed(-3).into());
    }
    let total = usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(unit))
        .ok_or(RemoteErrorKind::Failed(-3))?;
    Ok((unit, total))
}

fn drain(queue: &mut VecDeque<u8>, max_bytes: usize) -> Vec<u8> {
    let take = max_bytes.min(queue.len());
    queue.drain(..take).collect()
}

impl RemoteTarget for LoopbackTarget {
    fn init(&mut self, _connection: &str) -> RemoteResult<SessionId> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::Init)?;
        let id = monitor.next_session;
        monitor.next_session += 1;
        Ok(id)
    }

    fn select_session(&mut self, _id: SessionId) -> RemoteResult<()> {
        self.monitor.borrow_mut().enter(RemoteOp::SelectSession)
    }

    fn disconnect(&mut self) -> RemoteResult<()> {
        self.monitor.borrow_mut().enter(RemoteOp::Disconnect)
    }

    fn destroy_process(&mut self) -> RemoteResult<()> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::DestroyProcess)?;
        monitor.stop(SessionState::NotExecuting);
        Ok(())
    }

    fn exit_session(&mut self) -> RemoteResult<()> {
        self.monitor.borrow_mut().enter(RemoteOp::ExitSession)
    }

    fn read_memory(
        &mut self,
        space: Space,
        address: u32,
        count: u32,
        unit_size: u32,
        host_endian: bool,
    ) -> RemoteResult<(Vec<u8>, u32)> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::ReadMemory)?;
        let (unit, total) = unit_bytes(count, unit_size)?;
        let (space, base) = Monitor::byte_key(space, address);
        let mut bytes: Vec<u8> = (0u32..)
            .take(total)
            .map(|offset| monitor.read_byte(space, base.wrapping_add(offset)))
            .collect();
        swap_units(&mut bytes, unit, host_endian);
        Ok((bytes, count))
    }

    fn write_memory(
        &mut self,
        space: Space,
        address: u32,
        count: u32,
        unit_size: u32,
        bytes: &[u8],
        host_endian: bool,
    ) -> RemoteResult<u32> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::WriteMemory)?;
        let (unit, total) = unit_bytes(count, unit_size)?;
        let mut data = bytes.get(..total).ok_or(RemoteErrorKind::Failed(-4))?.to_vec();
        swap_units(&mut data, unit, host_endian);
        let (space, base) = Monitor::byte_key(space, address);
        for (offset, byte) in (0u32..).zip(data) {
            monitor.write_byte(space, base.wrapping_add(offset), byte);
        }
        Ok(count)
    }

    fn copy_memory(
        &mut self,
        src_space: Space,
        src_address: u32,
        dst_space: Space,
        dst_address: u32,
        byte_count: u32,
    ) -> RemoteResult<()> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::CopyMemory)?;
        let (src_space, src) = Monitor::byte_key(src_space, src_address);
        let (dst_space, dst) = Monitor::byte_key(dst_space, dst_address);
        let data: Vec<u8> = (0..byte_count)
            .map(|offset| monitor.read_byte(src_space, src.wrapping_add(offset)))
            .collect();
        for (offset, byte) in (0u32..).zip(data) {
            monitor.write_byte(dst_space, dst.wrapping_add(offset), byte);
        }
        Ok(())
    }

    fn fill_memory(
        &mut self,
        space: Space,
        address: u32,
        count: u32,
        unit_size: u32,
        pattern: &[u8],
    ) -> RemoteResult<()> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::FillMemory)?;
        let (_, total) = unit_bytes(count, unit_size)?;
        if pattern.is_empty() {
            return Err(RemoteErrorKind::Failed(-4).into());
        }
        let (space, base) = Monitor::byte_key(space, address);
        for (offset, byte) in (0u32..).zip(pattern.iter().cycle().take(total)) {
            monitor.write_byte(space, base.wrapping_add(offset), *byte);
        }
        Ok(())
    }

    fn set_breakpoint(
        &mut self,
        space: Space,
        address: u32,
        pass_count: i32,
        kind: BreakpointKind,
    ) -> RemoteResult<i32> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::SetBreakpoint)?;
        let breakpoint = RemoteBreakpoint {
            space,
            address,
            pass_count,
            current_count: 0,
            kind,
        };
        let slot = match monitor.slots.iter().position(Option::is_none) {
            Some(slot) => {
                monitor.slots[slot] = Some(breakpoint);
                slot
            }
            None => {
                monitor.slots.push(Some(breakpoint));
                monitor.slots.len() - 1
            }
        };
        i32::try_from(slot).map_err(|_| RemoteErrorKind::Failed(-5).into())
    }

    fn remove_breakpoint(&mut self, id: i32) -> RemoteResult<()> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::RemoveBreakpoint)?;
        let slot = usize::try_from(id)
            .ok()
            .and_then(|index| monitor.slots.get_mut(index))
            .ok_or(RemoteErrorKind::Failed(-2))?;
        slot.take().ok_or(RemoteErrorKind::Failed(-2))?;
        Ok(())
    }

    fn breakpoint_status(&mut self, slot: u32) -> RemoteResult<BreakpointSlot> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::BreakpointStatus)?;
        let entry = usize::try_from(slot)
            .ok()
            .and_then(|index| monitor.slots.get(index));
        Ok(match entry {
            Some(Some(bp)) => BreakpointSlot::Active(*bp),
            Some(None) => BreakpointSlot::Invalid,
            None => BreakpointSlot::NoMore,
        })
    }

    fn run(&mut self) -> RemoteResult<()> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::Run)?;
        monitor.running = true;
        Ok(())
    }

    fn step(&mut self, count: u32) -> RemoteResult<()> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::Step)?;
        monitor.pc = monitor.pc.wrapping_add(count.wrapping_mul(4));
        monitor.stop(SessionState::Stepped);
        Ok(())
    }

    fn halt(&mut self) -> RemoteResult<()> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::Halt)?;
        monitor.stop(SessionState::Halted);
        Ok(())
    }

    fn reset_processor(&mut self) -> RemoteResult<()> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::ResetProcessor)?;
        monitor.pc = 0;
        monitor.stop(SessionState::NotExecuting);
        Ok(())
    }

    fn poll_status(&mut self, timeout: Duration) -> RemoteResult<u32> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::PollStatus)?;
        if let Some(raw) = monitor.statuses.pop_front() {
            return Ok(raw);
        }
        let state = if !monitor.stdout.is_empty() {
            SessionState::StdoutReady
        } else if !monitor.stderr.is_empty() {
            SessionState::StderrReady
        } else if monitor.running {
            let state = monitor.simulate();
            if state == SessionState::Running {
                std::thread::sleep(timeout);
            }
            state
        } else {
            monitor.last_stop
        };
        Ok(state.as_raw())
    }

    fn get_stdout(&mut self, max_bytes: usize) -> RemoteResult<Vec<u8>> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::GetStdout)?;
        Ok(drain(&mut monitor.stdout, max_bytes))
    }

    fn get_stderr(&mut self, max_bytes: usize) -> RemoteResult<Vec<u8>> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::GetStderr)?;
        Ok(drain(&mut monitor.stderr, max_bytes))
    }

    fn put_stdin(&mut self, bytes: &[u8]) -> RemoteResult<()> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::PutStdin)?;
        monitor.stdin.extend_from_slice(bytes);
        Ok(())
    }

    fn query_stdin_mode(&mut self) -> RemoteResult<u32> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::QueryStdinMode)?;
        Ok(monitor.stdin_mode)
    }

    fn query_config(&mut self) -> RemoteResult<TargetConfig> {
        let mut monitor = self.monitor.borrow_mut();
        monitor.enter(RemoteOp::QueryConfig)?;
        Ok(monitor.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{read_word, write_word};

    #[test]
    fn words_are_stored_big_endian() {
        let mut target = LoopbackTarget::new();
        write_word(&mut target, Space::InstructionMemory, 0x100, 0x1401_0203).expect("write");
        assert_eq!(
            target.peek(Space::InstructionMemory, 0x100, 4),
            [0x14, 0x01, 0x02, 0x03]
        );
        assert_eq!(
            read_word(&mut target, Space::InstructionMemory, 0x100).expect("read"),
            0x1401_0203
        );
    }

    #[test]
    fn pc_space_reads_and_writes_the_program_counter() {
        let mut target = LoopbackTarget::new();
        write_word(&mut target, Space::PcSpace, 0, 0x40).expect("write pc");
        assert_eq!(target.pc(), 0x40);
        assert_eq!(read_word(&mut target, Space::PcSpace, 0).expect("read pc"), 0x40);
    }

    #[test]
    fn registers_do_not_alias_neighbours() {
        let mut target = LoopbackTarget::new();
        write_word(&mut target, Space::GlobalReg, 1, 0xaaaa_aaaa).expect("gr1");
        write_word(&mut target, Space::GlobalReg, 2, 0x5555_5555).expect("gr2");
        assert_eq!(
            read_word(&mut target, Space::GlobalReg, 1).expect("gr1"),
            0xaaaa_aaaa
        );
    }

    #[test]
    fn run_stops_at_breakpoint_then_halt() {
        let mut target = LoopbackTarget::new();
        target.load(Space::InstructionMemory, 0x10, &[HALT_OPCODE, 0, 0, 0]);
        target
            .set_breakpoint(Space::InstructionMemory, 0x8, 1, BreakpointKind::Software)
            .expect("bp");
        target.run().expect("run");
        let status = target.poll_status(Duration::ZERO).expect("poll");
        assert_eq!(SessionState::from_raw(status), Some(SessionState::Break));
        assert_eq!(target.pc(), 0x8);
        target.run().expect("continue");
        let status = target.poll_status(Duration::ZERO).expect("poll");
        assert_eq!(SessionState::from_raw(status), Some(SessionState::Halted));
        assert_eq!(target.pc(), 0x10);
    }

    #[test]
    fn scripted_statuses_come_first() {
        let mut target = LoopbackTarget::new();
        target.push_raw_status(99);
        target.push_stdout(b"hi");
        assert_eq!(target.poll_status(Duration::ZERO).expect("poll"), 99);
        assert_eq!(
            target.poll_status(Duration::ZERO).expect("poll"),
            SessionState::StdoutReady.as_raw()
        );
        assert_eq!(target.get_stdout(1).expect("out"), b"h");
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut target = LoopbackTarget::new();
        target.fail_next(RemoteOp::Halt, RemoteErrorKind::Timeout);
        assert!(target.halt().is_err());
        assert!(target.halt().is_ok());
        assert_eq!(target.call_count(RemoteOp::Halt), 2);
    }

    #[test]
    fn fill_repeats_pattern() {
        let mut target = LoopbackTarget::new();
        target
            .fill_memory(Space::DataMemory, 0x40_0000, 3, 2, &[0xab, 0xcd])
            .expect("fill");
        assert_eq!(
            target.peek(Space::DataMemory, 0x40_0000, 6),
            [0xab, 0xcd, 0xab, 0xcd, 0xab, 0xcd]
        );
    }
}
