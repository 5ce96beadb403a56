//! Command handlers bound to the session's keyword table.
//!
//! Every numeric argument is hexadecimal. Code commands (`a`, `l`, `b`, `bc`,
//! `y`) default to instruction memory; memory commands default to data memory.

use std::io::Write;

use am29k_asm::parse_instruction;
use am29k_isa::{
    disassemble_range, format_special_register, parse_hex, resolve, validate, Address, Space,
};
use tracing::{debug, info};

use crate::config::IO_BUFFER_SIZE;
use crate::dispatcher::{normalize, tokenize, CommandTable, CommandTableEntry};
use crate::error::CommandError;
use crate::remote::{read_word, write_word, BreakpointKind};
use crate::session::{Session, SessionExit};

/// Upper bound on words read by a single `l` or `d`.
const MAX_LISTING_WORDS: u32 = 0x1000;

/// Upper bound on bytes touched by a single `f` or `m`.
const MAX_BLOCK_BYTES: u32 = 0x10_0000;

/// Bytes shown by `d` without an end address.
const DEFAULT_DUMP_BYTES: u32 = 0x40;

/// Keyword table used by [`Session`].
pub static COMMANDS: CommandTable<Session> = CommandTable::new(ENTRIES);

static ENTRIES: &[CommandTableEntry<Session>] = &[
    CommandTableEntry {
        keyword: "a",
        summary: "a addr [instr]     assemble at addr, interactive until '.'",
        handler: assemble,
    },
    CommandTableEntry {
        keyword: "l",
        summary: "l [addr [end]]     disassemble",
        handler: list,
    },
    CommandTableEntry {
        keyword: "b",
        summary: "b [addr [pass]]    set breakpoint, or list breakpoints",
        handler: set_software_breakpoint,
    },
    CommandTableEntry {
        keyword: "b050",
        summary: "b050 addr [pass]   Am29050 hardware breakpoint",
        handler: set_virtual_breakpoint,
    },
    CommandTableEntry {
        keyword: "b050v",
        summary: "b050v addr [pass]  Am29050 breakpoint, virtual address",
        handler: set_virtual_breakpoint,
    },
    CommandTableEntry {
        keyword: "b050p",
        summary: "b050p addr [pass]  Am29050 breakpoint, physical address",
        handler: set_physical_breakpoint,
    },
    CommandTableEntry {
        keyword: "bc",
        summary: "bc [addr]          clear breakpoint, or all breakpoints",
        handler: clear_breakpoint,
    },
    CommandTableEntry {
        keyword: "g",
        summary: "g                  run target",
        handler: go,
    },
    CommandTableEntry {
        keyword: "t",
        summary: "t [count]          step instructions",
        handler: step,
    },
    CommandTableEntry {
        keyword: "k",
        summary: "k                  halt target",
        handler: kill,
    },
    CommandTableEntry {
        keyword: "r",
        summary: "r                  reset processor",
        handler: reset,
    },
    CommandTableEntry {
        keyword: "x",
        summary: "x                  show pc and special registers",
        handler: show_registers,
    },
    CommandTableEntry {
        keyword: "d",
        summary: "d addr [end]       dump memory words",
        handler: dump,
    },
    CommandTableEntry {
        keyword: "s",
        summary: "s addr word..      set memory words",
        handler: set_words,
    },
    CommandTableEntry {
        keyword: "f",
        summary: "f addr end word    fill memory",
        handler: fill,
    },
    CommandTableEntry {
        keyword: "m",
        summary: "m src end dst      move memory",
        handler: move_memory,
    },
    CommandTableEntry {
        keyword: "y",
        summary: "y file [addr]      load raw image into instruction memory",
        handler: yank,
    },
    CommandTableEntry {
        keyword: "cfg",
        summary: "cfg                show target configuration",
        handler: show_config,
    },
    CommandTableEntry {
        keyword: "h",
        summary: "h                  list commands",
        handler: help,
    },
    CommandTableEntry {
        keyword: "q",
        summary: "q                  quit, ending the target process",
        handler: quit,
    },
    CommandTableEntry {
        keyword: "ex",
        summary: "ex                 same as q",
        handler: quit,
    },
    CommandTableEntry {
        keyword: "disc",
        summary: "disc               disconnect, leaving the target running",
        handler: disconnect,
    },
];

fn arg(tokens: &[String], index: usize) -> Result<&str, CommandError> {
    tokens
        .get(index)
        .map(String::as_str)
        .ok_or(CommandError::Syntax)
}

fn current_pc(session: &mut Session) -> Result<u32, CommandError> {
    Ok(read_word(session.remote.as_mut(), Space::PcSpace, 0)?)
}

/// Resolves and validates an operand; `.offset` becomes an instruction address.
fn operand(session: &mut Session, token: &str, default: Space) -> Result<Address, CommandError> {
    let mut address = resolve(token, default)?;
    if address.space == Space::PcRelative {
        let pc = current_pc(session)?;
        address = Address::new(Space::InstructionMemory, pc.wrapping_add(address.offset));
    }
    validate(&address, &session.target_config)?;
    Ok(address)
}

/// Like [`operand`], but `pc` also means the instruction at the program counter.
fn code_address(session: &mut Session, token: &str) -> Result<Address, CommandError> {
    let address = operand(session, token, Space::InstructionMemory)?;
    if address.space == Space::PcSpace {
        let pc = current_pc(session)?;
        return Ok(Address::new(Space::InstructionMemory, pc));
    }
    Ok(address)
}

/// Address stride of one word: registers are numbered, memory is byte addressed.
const fn stride(space: Space) -> u32 {
    if space.is_register() || matches!(space, Space::PcSpace) {
        1
    } else {
        4
    }
}

/// Distance from `start` to `end` in one space.
fn span(start: Address, end: Address) -> Result<u32, CommandError> {
    if end.space != start.space || end.offset < start.offset {
        return Err(CommandError::BadOperand);
    }
    Ok(end.offset - start.offset)
}

/// Words covered by `start..=end`, at most `limit`.
fn word_count(start: Address, end: Address, limit: u32) -> Result<u32, CommandError> {
    (span(start, end)? / stride(start.space))
        .checked_add(1)
        .filter(|count| *count <= limit)
        .ok_or(CommandError::BadOperand)
}

/// Bytes covered by `start..=end`, at most [`MAX_BLOCK_BYTES`].
fn byte_count(start: Address, end: Address) -> Result<u32, CommandError> {
    span(start, end)?
        .checked_add(1)
        .filter(|count| *count <= MAX_BLOCK_BYTES)
        .ok_or(CommandError::BadOperand)
}

fn write_instruction(
    session: &mut Session,
    address: Address,
    tokens: &[String],
) -> Result<(), CommandError> {
    let instr = parse_instruction(tokens, Some(&session.target_config))?;
    write_word(
        session.remote.as_mut(),
        address.space,
        address.offset,
        instr.word(),
    )?;
    debug!(%address, word = instr.word(), "assembled");
    Ok(())
}

fn assemble(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    let mut address = code_address(session, arg(tokens, 1)?)?;
    if tokens.len() > 2 {
        return write_instruction(session, address, &tokens[2..]);
    }
    loop {
        write!(session.terminal, "{:08x}: ", address.offset)?;
        let Some(line) = session.next_line()? else {
            return Ok(());
        };
        let tokens = normalize(tokenize(&line, session.config.max_tokens));
        match tokens.first().map(String::as_str) {
            Some(".") => return Ok(()),
            Some("") | None => continue,
            Some(_) => {}
        }
        match write_instruction(session, address, &tokens) {
            Ok(()) => address = address.wrapping_add(4),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => session.report(&err),
        }
    }
}

fn list(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    let start = match tokens.get(1) {
        Some(token) => code_address(session, token)?,
        None => Address::new(Space::InstructionMemory, current_pc(session)?),
    };
    let count = match tokens.get(2) {
        Some(token) => {
            let end = operand(session, token, start.space)?;
            word_count(start, end, MAX_LISTING_WORDS)?
        }
        None => session.config.listing_length,
    };
    let (bytes, _) = session
        .remote
        .read_memory(start.space, start.offset, count, 4, false)?;
    let rows = disassemble_range(&bytes, start.offset, |offset| {
        session
            .breakpoints
            .find(&Address::new(start.space, offset))
            .is_some()
    });
    for row in rows {
        writeln!(session.terminal, "{}", row.render())?;
    }
    Ok(())
}

fn list_breakpoints(session: &mut Session) -> Result<(), CommandError> {
    if session.breakpoints.is_empty() {
        writeln!(session.terminal, "no breakpoints")?;
    }
    for record in session.breakpoints.iter() {
        writeln!(session.terminal, "{record}")?;
    }
    Ok(())
}

fn set_breakpoint(
    session: &mut Session,
    tokens: &[String],
    kind: BreakpointKind,
) -> Result<(), CommandError> {
    if tokens.len() < 2 {
        return if kind == BreakpointKind::Software {
            list_breakpoints(session)
        } else {
            Err(CommandError::Syntax)
        };
    }
    let address = code_address(session, &tokens[1])?;
    let pass_count = match tokens.get(2) {
        Some(token) => i32::try_from(parse_hex(token)?).map_err(|_| CommandError::BadOperand)?,
        None => 1,
    };
    let id = session
        .breakpoints
        .set(session.remote.as_mut(), address, pass_count, kind)?;
    writeln!(session.terminal, "breakpoint {id} at {address}")?;
    Ok(())
}

fn set_software_breakpoint(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    set_breakpoint(session, tokens, BreakpointKind::Software)
}

fn set_virtual_breakpoint(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    set_breakpoint(session, tokens, BreakpointKind::Am29050Virtual)
}

fn set_physical_breakpoint(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    set_breakpoint(session, tokens, BreakpointKind::Am29050Physical)
}

fn clear_breakpoint(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    match tokens.get(1) {
        Some(token) => {
            let address = code_address(session, token)?;
            session
                .breakpoints
                .clear(session.remote.as_mut(), address)?;
        }
        None => session.breakpoints.clear_all(session.remote.as_mut())?,
    }
    Ok(())
}

fn go(session: &mut Session, _tokens: &[String]) -> Result<(), CommandError> {
    session.remote.run()?;
    session.expect_execution();
    Ok(())
}

fn step(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    let count = match tokens.get(1) {
        Some(token) => parse_hex(token)?,
        None => 1,
    };
    if count == 0 {
        return Err(CommandError::BadOperand);
    }
    session.remote.step(count)?;
    session.expect_execution();
    Ok(())
}

fn kill(session: &mut Session, _tokens: &[String]) -> Result<(), CommandError> {
    session.remote.halt()?;
    Ok(())
}

fn reset(session: &mut Session, _tokens: &[String]) -> Result<(), CommandError> {
    session.remote.reset_processor()?;
    session.target_config = session.remote.query_config()?;
    session
        .breakpoints
        .refresh_from_target(session.remote.as_mut())?;
    info!(processor = %session.target_config.processor(), "processor reset");
    writeln!(session.terminal, "processor reset")?;
    Ok(())
}

fn show_registers(session: &mut Session, _tokens: &[String]) -> Result<(), CommandError> {
    let pc = current_pc(session)?;
    writeln!(session.terminal, "pc     {pc:08x}")?;
    let profile = session.target_config.processor().profile();
    let mut column = 0;
    for index in profile.special_register_indices() {
        let value = read_word(session.remote.as_mut(), Space::SpecialReg, index)?;
        let name = u8::try_from(index).map_or_else(|_| format!("sr{index}"), format_special_register);
        write!(session.terminal, "{name:<6} {value:08x}")?;
        column += 1;
        if column % 4 == 0 {
            writeln!(session.terminal)?;
        } else {
            write!(session.terminal, "   ")?;
        }
    }
    if column % 4 != 0 {
        writeln!(session.terminal)?;
    }
    Ok(())
}

fn dump(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    let start = operand(session, arg(tokens, 1)?, Space::DataMemory)?;
    let count = match tokens.get(2) {
        Some(token) => {
            let end = operand(session, token, start.space)?;
            word_count(start, end, MAX_LISTING_WORDS)?
        }
        None if stride(start.space) == 1 => 1,
        None => DEFAULT_DUMP_BYTES / 4,
    };
    let (bytes, done) = session
        .remote
        .read_memory(start.space, start.offset, count, 4, false)?;
    let step = stride(start.space);
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .take(usize::try_from(done).unwrap_or(usize::MAX))
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    for (line, row) in (0u32..).zip(words.chunks(4)) {
        let offset = start.offset.wrapping_add(line * 4 * step);
        write!(session.terminal, "{}:{offset:08x} ", start.space)?;
        for word in row {
            write!(session.terminal, " {word:08x}")?;
        }
        writeln!(session.terminal)?;
    }
    Ok(())
}

fn set_words(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    let start = operand(session, arg(tokens, 1)?, Space::DataMemory)?;
    let values = tokens
        .get(2..)
        .filter(|values| !values.is_empty())
        .ok_or(CommandError::Syntax)?
        .iter()
        .map(|token| parse_hex(token))
        .collect::<Result<Vec<u32>, _>>()?;
    let step = stride(start.space);
    for (index, value) in (0u32..).zip(values) {
        let offset = start.offset.wrapping_add(index * step);
        write_word(session.remote.as_mut(), start.space, offset, value)?;
    }
    Ok(())
}

fn fill(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    let start = operand(session, arg(tokens, 1)?, Space::DataMemory)?;
    let end = operand(session, arg(tokens, 2)?, start.space)?;
    let pattern = parse_hex(arg(tokens, 3)?)?;
    let count = word_count(start, end, MAX_BLOCK_BYTES / 4)?;
    session.remote.fill_memory(
        start.space,
        start.offset,
        count,
        4,
        &pattern.to_be_bytes(),
    )?;
    Ok(())
}

fn move_memory(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    let source = operand(session, arg(tokens, 1)?, Space::DataMemory)?;
    let end = operand(session, arg(tokens, 2)?, source.space)?;
    let destination = operand(session, arg(tokens, 3)?, source.space)?;
    let count = byte_count(source, end)?;
    session.remote.copy_memory(
        source.space,
        source.offset,
        destination.space,
        destination.offset,
        count,
    )?;
    Ok(())
}

fn yank(session: &mut Session, tokens: &[String]) -> Result<(), CommandError> {
    let path = arg(tokens, 1)?;
    let start = match tokens.get(2) {
        Some(token) => code_address(session, token)?,
        None => Address::new(
            Space::InstructionMemory,
            session.target_config.instruction_memory.start,
        ),
    };
    let image = std::fs::read(path)?;
    let mut offset = start.offset;
    for chunk in image.chunks(IO_BUFFER_SIZE) {
        let len = u32::try_from(chunk.len()).map_err(|_| CommandError::BadOperand)?;
        let done = session
            .remote
            .write_memory(start.space, offset, len, 1, chunk, false)?;
        if done != len {
            return Err(CommandError::BadAddress);
        }
        offset = offset.wrapping_add(len);
    }
    info!(path, bytes = image.len(), %start, "image loaded");
    writeln!(
        session.terminal,
        "loaded {} bytes at {start}",
        image.len()
    )?;
    Ok(())
}

fn show_config(session: &mut Session, _tokens: &[String]) -> Result<(), CommandError> {
    write!(session.terminal, "{}", session.target_config)?;
    Ok(())
}

fn help(session: &mut Session, _tokens: &[String]) -> Result<(), CommandError> {
    for entry in COMMANDS.entries() {
        writeln!(session.terminal, "{}", entry.summary)?;
    }
    Ok(())
}

fn quit(session: &mut Session, _tokens: &[String]) -> Result<(), CommandError> {
    session.request_exit(SessionExit::Quit);
    Ok(())
}

fn disconnect(session: &mut Session, _tokens: &[String]) -> Result<(), CommandError> {
    session.remote.disconnect()?;
    session.request_exit(SessionExit::Disconnected);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_arguments() {
        assert_eq!(parse_hex("0x1f").expect("hex"), 0x1f);
        assert_eq!(parse_hex("ff").expect("hex"), 0xff);
        for bad in ["0x", "123456789", "g", "+1", "-1"] {
            assert!(
                matches!(parse_hex(bad).map_err(CommandError::from), Err(CommandError::Syntax)),
                "{bad}"
            );
        }
    }

    #[test]
    fn word_count_is_inclusive_and_bounded() {
        let start = Address::new(Space::DataMemory, 0x100);
        assert_eq!(
            word_count(start, Address::new(Space::DataMemory, 0x10c), 16).expect("range"),
            4
        );
        assert_eq!(
            word_count(
                Address::new(Space::GlobalReg, 1),
                Address::new(Space::GlobalReg, 4),
                16
            )
            .expect("registers"),
            4
        );
        assert!(word_count(start, Address::new(Space::DataMemory, 0xfc), 16).is_err());
        assert!(word_count(start, Address::new(Space::InstructionMemory, 0x200), 16).is_err());
        assert!(word_count(start, Address::new(Space::DataMemory, 0x200), 16).is_err());
    }

    #[test]
    fn whole_space_ranges_do_not_overflow() {
        let start = Address::new(Space::Io, 0);
        let end = Address::new(Space::Io, u32::MAX);
        assert!(word_count(start, end, u32::MAX).is_ok());
        assert!(matches!(
            word_count(
                Address::new(Space::GlobalReg, 0),
                Address::new(Space::GlobalReg, u32::MAX),
                u32::MAX
            ),
            Err(CommandError::BadOperand)
        ));
        assert!(matches!(
            byte_count(start, end),
            Err(CommandError::BadOperand)
        ));
        assert_eq!(
            byte_count(start, Address::new(Space::Io, 0xff)).expect("small block"),
            0x100
        );
    }

    #[test]
    fn keywords_are_unique() {
        let entries = COMMANDS.entries();
        for (i, entry) in entries.iter().enumerate() {
            assert!(
                entries[i + 1..].iter().all(|other| other.keyword != entry.keyword),
                "duplicate {}",
                entry.keyword
            );
        }
    }
}
