//! Listing generation over a block of instruction memory.

use crate::decoder::Decoder;
use crate::encoding::Instruction;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bytes per instruction.
pub const INSTRUCTION_BYTES: u32 = 4;

/// A single disassembled instruction row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisassemblyRow {
    /// Address of the instruction.
    pub address: u32,
    /// Raw instruction word.
    pub raw_word: u32,
    /// Assembler text, e.g. `add gr01,gr02,gr03`.
    pub text: String,
    /// Whether the opcode byte is unassigned.
    pub is_illegal: bool,
    /// Whether a breakpoint is set at this address.
    pub has_breakpoint: bool,
}

impl DisassemblyRow {
    /// Disassembles one instruction at `address`.
    #[must_use]
    pub fn new(address: u32, instr: Instruction, has_breakpoint: bool) -> Self {
        let outcome = Decoder::decode(instr, address);
        Self {
            address,
            raw_word: instr.word(),
            is_illegal: outcome.is_illegal(),
            text: outcome.to_string(),
            has_breakpoint,
        }
    }

    /// Formats the row for a listing, marking breakpoints with `*`.
    #[must_use]
    pub fn render(&self) -> String {
        let mark = if self.has_breakpoint { '*' } else { ' ' };
        format!(
            "{mark}{:08x}  {:08x}  {}",
            self.address, self.raw_word, self.text
        )
    }
}

/// Disassembles `memory`, which was read starting at `base`.
///
/// A trailing partial word is ignored. `has_breakpoint` is asked once per
/// instruction address.
#[must_use]
pub fn disassemble_range(
    memory: &[u8],
    base: u32,
    has_breakpoint: impl Fn(u32) -> bool,
) -> Vec<DisassemblyRow> {
    memory
        .chunks_exact(INSTRUCTION_BYTES as usize)
        .zip((0u32..).map(|i| base.wrapping_add(i.wrapping_mul(INSTRUCTION_BYTES))))
        .map(|(chunk, address)| {
            let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
            DisassemblyRow::new(
                address,
                Instruction::from_be_bytes(bytes),
                has_breakpoint(address),
            )
        })
        .collect()
}
