//! Instruction encoding: mnemonic plus resolved operands to an [`Instruction`].
//!
//! Operand counts and space combinations are checked first (`Syntax`), then
//! every field value against its width (`BadOperand`). Nothing is truncated.

use am29k_isa::{
    Address, Instruction, InstructionFormat, IsaError, OpcodeDescriptor, Space,
    LOCAL_REGISTER_FLAG,
};

use crate::mnemonic::{resolve_mnemonic, Mnemonic};

/// Field limits.
mod limit {
    pub const REGISTER: u32 = 0x7f;
    pub const SPECIAL: u32 = 0xff;
    pub const IMM8: u32 = 0xff;
    pub const CE: u32 = 0x1;
    pub const CNTL: u32 = 0x7f;
    pub const UI: u32 = 0x1;
    pub const RND: u32 = 0x7;
    pub const FD: u32 = 0x3;
    pub const FS: u32 = 0x3;
    pub const CONST16: u32 = 0xffff;
    pub const CONSTN_LOW: u32 = 0xffff_0000;
    pub const CACHE_SELECT: u32 = 0x3;
    pub const ABS_TARGET: u32 = 0x3_fffc;
    pub const REL_TARGET_MIN: i64 = -0x2_0000;
    pub const REL_TARGET_MAX: i64 = 0x1_fffc;
}

/// Operand B in M-bit formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldB {
    Register(u8),
    Immediate(u8),
}

/// Encodes one instruction.
///
/// # Errors
///
/// [`IsaError::Syntax`] for an unknown mnemonic, a wrong operand count or an
/// operand from the wrong space; [`IsaError::BadOperand`] for a value that
/// does not fit its field.
pub fn encode(mnemonic: &str, operands: &[Address]) -> Result<Instruction, IsaError> {
    match resolve_mnemonic(mnemonic).ok_or(IsaError::Syntax)? {
        Mnemonic::Alias(_, instr) => {
            expect_count(operands, 0)?;
            Ok(instr)
        }
        Mnemonic::Opcode(descriptor) => encode_opcode(descriptor, operands),
    }
}

/// Encodes operands for a known opcode descriptor.
///
/// # Errors
///
/// As for [`encode`].
pub fn encode_opcode(
    descriptor: &OpcodeDescriptor,
    operands: &[Address],
) -> Result<Instruction, IsaError> {
    let op = descriptor.opcode;
    match descriptor.format {
        InstructionFormat::ArithLogic => {
            let [rc, ra, rb] = take::<3>(operands)?;
            Ok(with_b(op, general(rc)?, general(ra)?, field_b(rb)?))
        }
        InstructionFormat::Vector => {
            let [vn, ra, rb] = take::<3>(operands)?;
            Ok(with_b(
                op,
                bounded(vn, limit::IMM8)?,
                general(ra)?,
                field_b(rb)?,
            ))
        }
        InstructionFormat::LoadStore => {
            let [ce, cntl, ra, rb] = take::<4>(operands)?;
            let c = (bounded(ce, limit::CE)? << 7) | bounded(cntl, limit::CNTL)?;
            Ok(with_b(op, c, general(ra)?, field_b(rb)?))
        }
        InstructionFormat::NoOperands => {
            expect_count(operands, 0)?;
            Ok(Instruction::new(op, 0, 0, 0))
        }
        InstructionFormat::InvalidateCache => match operands {
            [] => Ok(Instruction::new(op, 0, 0, 0)),
            [select] => Ok(Instruction::new(
                op,
                bounded(select, limit::CACHE_SELECT)?,
                0,
                0,
            )),
            _ => Err(IsaError::Syntax),
        },
        InstructionFormat::Float => {
            let [rc, ra, rb] = take::<3>(operands)?;
            Ok(Instruction::new(op, general(rc)?, general(ra)?, general(rb)?))
        }
        InstructionFormat::CallJump => {
            let [ra, target] = take::<2>(operands)?;
            let a = general(ra)?;
            encode_target(op, a, target)
        }
        InstructionFormat::Jump => {
            let [target] = take::<1>(operands)?;
            encode_target(op, 0, target)
        }
        InstructionFormat::JumpIndirect => {
            let [rb] = take::<1>(operands)?;
            Ok(Instruction::new(op, 0, 0, general(rb)?))
        }
        InstructionFormat::CallJumpIndirect | InstructionFormat::Mttlb => {
            let [ra, rb] = take::<2>(operands)?;
            Ok(Instruction::new(op, 0, general(ra)?, general(rb)?))
        }
        InstructionFormat::Class | InstructionFormat::Sqrt => {
            let [rc, ra, fs] = take::<3>(operands)?;
            Ok(Instruction::new(
                op,
                general(rc)?,
                general(ra)?,
                bounded(fs, limit::FS)?,
            ))
        }
        InstructionFormat::CountLeadingZeros | InstructionFormat::Div0 => {
            let [rc, rb] = take::<2>(operands)?;
            Ok(with_b(op, general(rc)?, 0, field_b(rb)?))
        }
        InstructionFormat::Const => {
            let [ra, value] = take::<2>(operands)?;
            let value = immediate(value)?;
            if value > limit::CONST16 {
                return Err(IsaError::BadOperand);
            }
            Ok(with_const16(op, general(ra)?, value))
        }
        InstructionFormat::ConstN => {
            let [ra, value] = take::<2>(operands)?;
            let value = immediate(value)?;
            if value > limit::CONST16 && value < limit::CONSTN_LOW {
                return Err(IsaError::BadOperand);
            }
            Ok(with_const16(op, general(ra)?, value & limit::CONST16))
        }
        InstructionFormat::ConstH => {
            let [ra, value] = take::<2>(operands)?;
            let value = immediate(value)?;
            Ok(with_const16(op, general(ra)?, value >> 16))
        }
        InstructionFormat::Convert => {
            let [rc, ra, ui, rnd, fd, fs] = take::<6>(operands)?;
            let b = (bounded(ui, limit::UI)? << 7)
                | (bounded(rnd, limit::RND)? << 4)
                | (bounded(fd, limit::FD)? << 2)
                | bounded(fs, limit::FS)?;
            Ok(Instruction::new(op, general(rc)?, general(ra)?, b))
        }
        InstructionFormat::Exhws | InstructionFormat::Mftlb => {
            let [rc, ra] = take::<2>(operands)?;
            Ok(Instruction::new(op, general(rc)?, general(ra)?, 0))
        }
        InstructionFormat::Mfsr => {
            let [rc, sa] = take::<2>(operands)?;
            Ok(Instruction::new(op, general(rc)?, special(sa)?, 0))
        }
        InstructionFormat::Mtsr => {
            let [sa, rb] = take::<2>(operands)?;
            Ok(Instruction::new(op, 0, special(sa)?, general(rb)?))
        }
        InstructionFormat::Mtsrim => {
            let [sa, value] = take::<2>(operands)?;
            let sa = special(sa)?;
            let value = immediate(value)?;
            if value > limit::CONST16 {
                return Err(IsaError::BadOperand);
            }
            Ok(with_const16(op, sa, value))
        }
        InstructionFormat::Emulate => {
            let [vn, ra, rb] = take::<3>(operands)?;
            Ok(Instruction::new(
                op,
                bounded(vn, limit::IMM8)?,
                general(ra)?,
                general(rb)?,
            ))
        }
    }
}

fn expect_count(operands: &[Address], count: usize) -> Result<(), IsaError> {
    if operands.len() == count {
        Ok(())
    } else {
        Err(IsaError::Syntax)
    }
}

fn take<const N: usize>(operands: &[Address]) -> Result<[&Address; N], IsaError> {
    operands
        .iter()
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|_| IsaError::Syntax)
}

/// Register field for a local or global register operand.
fn general(operand: &Address) -> Result<u8, IsaError> {
    let flag = match operand.space {
        Space::GlobalReg => 0,
        Space::LocalReg => LOCAL_REGISTER_FLAG,
        _ => return Err(IsaError::Syntax),
    };
    if operand.offset > limit::REGISTER {
        return Err(IsaError::BadOperand);
    }
    Ok(narrow(operand.offset)? | flag)
}

fn special(operand: &Address) -> Result<u8, IsaError> {
    if operand.space != Space::SpecialReg {
        return Err(IsaError::Syntax);
    }
    if operand.offset > limit::SPECIAL {
        return Err(IsaError::BadOperand);
    }
    narrow(operand.offset)
}

/// Value of a numeric operand.
fn immediate(operand: &Address) -> Result<u32, IsaError> {
    if operand.space.is_memory() && operand.space != Space::PcRelative {
        Ok(operand.offset)
    } else {
        Err(IsaError::Syntax)
    }
}

fn bounded(operand: &Address, max: u32) -> Result<u8, IsaError> {
    let value = immediate(operand)?;
    if value > max {
        return Err(IsaError::BadOperand);
    }
    narrow(value)
}

fn narrow(value: u32) -> Result<u8, IsaError> {
    u8::try_from(value).map_err(|_| IsaError::BadOperand)
}

fn field_b(operand: &Address) -> Result<FieldB, IsaError> {
    if operand.space.is_general() {
        general(operand).map(FieldB::Register)
    } else {
        bounded(operand, limit::IMM8).map(FieldB::Immediate)
    }
}

const fn with_b(op: u8, c: u8, a: u8, b: FieldB) -> Instruction {
    match b {
        FieldB::Register(b) => Instruction::new(op & !1, c, a, b),
        FieldB::Immediate(b) => Instruction::new(op | 1, c, a, b),
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn with_const16(op: u8, a: u8, value: u32) -> Instruction {
    Instruction::new(op, (value >> 8) as u8, a, value as u8)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn encode_target(op: u8, a: u8, target: &Address) -> Result<Instruction, IsaError> {
    let (op, field) = if target.space == Space::PcRelative {
        let offset = i64::from(target.offset as i32);
        if !(limit::REL_TARGET_MIN..=limit::REL_TARGET_MAX).contains(&offset) {
            return Err(IsaError::BadOperand);
        }
        (op & !1, target.offset & 0x3_ffff)
    } else {
        let value = immediate(target)?;
        if value > limit::ABS_TARGET {
            return Err(IsaError::BadOperand);
        }
        (op | 1, value)
    };
    if field & 0x3 != 0 {
        return Err(IsaError::BadOperand);
    }
    Ok(Instruction::new(op, (field >> 10) as u8, a, (field >> 2) as u8))
}
