//! Instruction decoder: raw [`Instruction`] to structured operands and text.

use std::fmt;

use crate::encoding::{descriptor, Instruction, InstructionFormat, OpcodeDescriptor};
use crate::operand::{format_register_field, format_special_register};

/// Width of a branch target field in bits.
pub const TARGET_BITS: u32 = 18;
const TARGET_SIGN: u32 = 1 << (TARGET_BITS - 1);
const TARGET_MASK: u32 = (1 << TARGET_BITS) - 1;

/// One decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// General register field; bit 7 selects the local file.
    Register(u8),
    /// Special register number.
    Special(u8),
    /// Immediate value.
    Immediate(u32),
    /// Absolute branch target address.
    Target(u32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Register(field) => f.write_str(&format_register_field(field)),
            Self::Special(index) => f.write_str(&format_special_register(index)),
            Self::Immediate(value) | Self::Target(value) => write!(f, "0x{value:x}"),
        }
    }
}

/// A legal instruction with its operands unpacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Opcode table entry.
    pub descriptor: OpcodeDescriptor,
    /// Printed mnemonic; differs from the descriptor for the `nop` alias.
    pub mnemonic: &'static str,
    /// Operands in assembler order.
    pub operands: Vec<Operand>,
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { "," })?;
            write!(f, "{operand}")?;
        }
        Ok(())
    }
}

/// Result of decoding one instruction word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The opcode is assigned.
    Instruction(DecodedInstruction),
    /// The opcode byte is unassigned.
    Illegal(Instruction),
}

impl DecodeOutcome {
    /// Returns `true` for an unassigned opcode.
    #[must_use]
    pub const fn is_illegal(&self) -> bool {
        matches!(self, Self::Illegal(_))
    }
}

impl fmt::Display for DecodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instruction(decoded) => decoded.fmt(f),
            Self::Illegal(instr) => write!(f, ".word 0x{:08x}", instr.word()),
        }
    }
}

/// Stateless instruction decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder;

impl Decoder {
    /// Decodes `instr` located at `pc`.
    ///
    /// `pc` only matters for relative branch targets, which are returned as absolute addresses.
    #[must_use]
    pub fn decode(instr: Instruction, pc: u32) -> DecodeOutcome {
        let Some(descriptor) = descriptor(instr.op) else {
            return DecodeOutcome::Illegal(instr);
        };

        if instr.op == 0x70 && instr.a == instr.b {
            return DecodeOutcome::Instruction(DecodedInstruction {
                descriptor: *descriptor,
                mnemonic: "nop",
                operands: Vec::new(),
            });
        }

        DecodeOutcome::Instruction(DecodedInstruction {
            descriptor: *descriptor,
            mnemonic: descriptor.mnemonic,
            operands: decode_operands(descriptor.format, instr, pc),
        })
    }
}

fn operand_b(instr: Instruction) -> Operand {
    if instr.m_bit() {
        Operand::Immediate(u32::from(instr.b))
    } else {
        Operand::Register(instr.b)
    }
}

const fn const16(instr: Instruction) -> u32 {
    ((instr.c as u32) << 8) | instr.b as u32
}

/// Branch target of a jump/call form; relative targets are sign-extended and added to `pc`.
#[must_use]
pub const fn branch_target(instr: Instruction, pc: u32) -> u32 {
    let field = (((instr.c as u32) << 10) | ((instr.b as u32) << 2)) & TARGET_MASK;
    if instr.m_bit() {
        field
    } else if field & TARGET_SIGN != 0 {
        pc.wrapping_add(field | !TARGET_MASK)
    } else {
        pc.wrapping_add(field)
    }
}

fn decode_operands(format: InstructionFormat, instr: Instruction, pc: u32) -> Vec<Operand> {
    use Operand::{Immediate, Register, Special, Target};

    match format {
        InstructionFormat::ArithLogic => {
            vec![Register(instr.c), Register(instr.a), operand_b(instr)]
        }
        InstructionFormat::Vector => vec![
            Immediate(u32::from(instr.c)),
            Register(instr.a),
            operand_b(instr),
        ],
        InstructionFormat::LoadStore => vec![
            Immediate(u32::from(instr.c >> 7)),
            Immediate(u32::from(instr.c & 0x7f)),
            Register(instr.a),
            operand_b(instr),
        ],
        InstructionFormat::NoOperands => Vec::new(),
        InstructionFormat::InvalidateCache => {
            if instr.c == 0 {
                Vec::new()
            } else {
                vec![Immediate(u32::from(instr.c))]
            }
        }
        InstructionFormat::Float => {
            vec![Register(instr.c), Register(instr.a), Register(instr.b)]
        }
        InstructionFormat::CallJump => {
            vec![Register(instr.a), Target(branch_target(instr, pc))]
        }
        InstructionFormat::Jump => vec![Target(branch_target(instr, pc))],
        InstructionFormat::JumpIndirect => vec![Register(instr.b)],
        InstructionFormat::CallJumpIndirect | InstructionFormat::Mttlb => {
            vec![Register(instr.a), Register(instr.b)]
        }
        InstructionFormat::Class | InstructionFormat::Sqrt => vec![
            Register(instr.c),
            Register(instr.a),
            Immediate(u32::from(instr.b)),
        ],
        InstructionFormat::CountLeadingZeros | InstructionFormat::Div0 => {
            vec![Register(instr.c), operand_b(instr)]
        }
        InstructionFormat::Const => vec![Register(instr.a), Immediate(const16(instr))],
        InstructionFormat::ConstN => {
            vec![Register(instr.a), Immediate(0xffff_0000 | const16(instr))]
        }
        InstructionFormat::ConstH => vec![Register(instr.a), Immediate(const16(instr) << 16)],
        InstructionFormat::Convert => vec![
            Register(instr.c),
            Register(instr.a),
            Immediate(u32::from(instr.b >> 7)),
            Immediate(u32::from((instr.b >> 4) & 0x7)),
            Immediate(u32::from((instr.b >> 2) & 0x3)),
            Immediate(u32::from(instr.b & 0x3)),
        ],
        InstructionFormat::Exhws | InstructionFormat::Mftlb => {
            vec![Register(instr.c), Register(instr.a)]
        }
        InstructionFormat::Mfsr => vec![Register(instr.c), Special(instr.a)],
        InstructionFormat::Mtsr => vec![Special(instr.a), Register(instr.b)],
        InstructionFormat::Mtsrim => vec![Special(instr.a), Immediate(const16(instr))],
        InstructionFormat::Emulate => vec![
            Immediate(u32::from(instr.c)),
            Register(instr.a),
            Register(instr.b),
        ],
    }
}

/// Decodes `instr` at `pc` to assembler text, or `.word 0x........` if illegal.
#[must_use]
pub fn decode(instr: Instruction, pc: u32) -> String {
    Decoder::decode(instr, pc).to_string()
}
