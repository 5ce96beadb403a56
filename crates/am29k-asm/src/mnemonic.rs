//! Mnemonic resolution against the opcode table, plus synthetic aliases.

use am29k_isa::{lookup_mnemonic, Instruction, OpcodeDescriptor, NOP_INSTRUCTION};

/// Lookup result for a mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    /// A real opcode; M-bit formats resolve to the even opcode.
    Opcode(&'static OpcodeDescriptor),
    /// A synthetic instruction with a fixed encoding and no operands.
    Alias(&'static str, Instruction),
}

impl Mnemonic {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Opcode(descriptor) => descriptor.mnemonic,
            Self::Alias(name, _) => name,
        }
    }
}

const ALIASES: &[(&str, Instruction)] = &[("nop", NOP_INSTRUCTION)];

/// Resolves a mnemonic, ASCII case-insensitively and by whole name only.
#[must_use]
pub fn resolve_mnemonic(name: &str) -> Option<Mnemonic> {
    if let Some(&(alias, instr)) = ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
    {
        return Some(Mnemonic::Alias(alias, instr));
    }
    lookup_mnemonic(name).map(Mnemonic::Opcode)
}
