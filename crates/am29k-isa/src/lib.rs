//! Am29000 instruction-set support for the monitor front-end.

/// Address spaces, memory windows and per-processor register bounds.
pub mod address;
pub use address::{
    Address, MemoryRange, Processor, ProcessorProfile, Space, TargetConfig,
    ABSOLUTE_REGISTER_COUNT, COPROCESSOR_REGISTER_COUNT, GLOBAL_REGISTER_COUNT,
    LOCAL_REGISTER_COUNT, LOCAL_REGISTER_FLAG,
};

/// Operand token resolution and range validation.
pub mod operand;
pub use operand::{
    format_register_field, format_special_register, parse_hex, resolve, resolve_checked,
    special_register_by_name, validate, SPECIAL_REGISTER_ALIASES,
};

/// Instruction layout and the static opcode table.
pub mod encoding;
pub use encoding::{
    descriptor, lookup_mnemonic, Instruction, InstructionFormat, OpcodeDescriptor,
    NOP_INSTRUCTION, OPCODE_TABLE,
};

/// Instruction decoder.
pub mod decoder;
pub use decoder::{branch_target, decode, DecodeOutcome, DecodedInstruction, Decoder, Operand};

/// Memory listings.
pub mod disasm;
pub use disasm::{disassemble_range, DisassemblyRow};

/// Local validation errors.
pub mod error;
pub use error::IsaError;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use serde_json as _;
