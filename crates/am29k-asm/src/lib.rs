//! Am29000 single-instruction assembler.

/// Instruction encoding per operand format.
pub mod encoder;
pub use encoder::{encode, encode_opcode};

/// Mnemonic resolution against the opcode table.
pub mod mnemonic;
pub use mnemonic::{resolve_mnemonic, Mnemonic};

/// Token-level instruction parsing.
pub mod parser;
pub use parser::{parse_instruction, parse_line, parse_operands, MAX_INSTRUCTION_TOKENS};

#[cfg(test)]
use proptest as _;
