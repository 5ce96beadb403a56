//! Assembler front end: one tokenized instruction to an [`Instruction`].

use am29k_isa::{resolve, validate, Address, Instruction, IsaError, Space, TargetConfig};

use crate::encoder::encode;
use crate::mnemonic::{resolve_mnemonic, Mnemonic};

/// Maximum tokens in one instruction: the mnemonic plus six operands (`convert`).
pub const MAX_INSTRUCTION_TOKENS: usize = 7;

/// Resolves the operand tokens of `tokens[1..]` for the mnemonic in `tokens[0]`.
///
/// Bare numbers default to instruction memory, except for the cache
/// invalidate forms where they are plain selectors.
///
/// # Errors
///
/// [`IsaError::Syntax`] for an empty or over-long token list or an unknown
/// mnemonic, otherwise any resolver error.
pub fn parse_operands<S: AsRef<str>>(tokens: &[S]) -> Result<(Mnemonic, Vec<Address>), IsaError> {
    let (first, rest) = tokens.split_first().ok_or(IsaError::Syntax)?;
    if tokens.len() > MAX_INSTRUCTION_TOKENS {
        return Err(IsaError::Syntax);
    }
    let mnemonic = resolve_mnemonic(first.as_ref()).ok_or(IsaError::Syntax)?;
    let default_space = match mnemonic {
        Mnemonic::Opcode(descriptor) => descriptor.format.default_operand_space(),
        Mnemonic::Alias(..) => Space::InstructionMemory,
    };
    let operands = rest
        .iter()
        .map(|token| resolve(token.as_ref(), default_space))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((mnemonic, operands))
}

/// Parses and encodes one instruction.
///
/// With a `config`, register operands are also range-checked against the
/// connected processor and fail with [`IsaError::BadRegister`].
///
/// # Errors
///
/// Any error of [`parse_operands`], register validation or [`encode`].
pub fn parse_instruction<S: AsRef<str>>(
    tokens: &[S],
    config: Option<&TargetConfig>,
) -> Result<Instruction, IsaError> {
    let (mnemonic, operands) = parse_operands(tokens)?;
    if let Some(config) = config {
        for operand in operands.iter().filter(|op| op.space.is_register()) {
            validate(operand, config).map_err(|_| IsaError::BadRegister)?;
        }
    }
    encode(mnemonic.name(), &operands)
}

/// Splits `line` on whitespace and commas, then parses it.
///
/// # Errors
///
/// As for [`parse_instruction`].
pub fn parse_line(line: &str, config: Option<&TargetConfig>) -> Result<Instruction, IsaError> {
    let tokens: Vec<&str> = line
        .split(|c: char| c.is_ascii_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .collect();
    parse_instruction(&tokens, config)
}
