use thiserror::Error;

/// Local validation failures raised while resolving, encoding or range-checking operands.
///
/// None of these ever reach the remote target: they are produced entirely on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum IsaError {
    /// Malformed operand text, wrong operand count, or an operand of the wrong space.
    #[error("syntax error")]
    Syntax,
    /// Immediate or field value out of range for its instruction format.
    #[error("operand out of range")]
    BadOperand,
    /// Register index malformed or outside the bound of its register file.
    #[error("invalid register")]
    BadRegister,
    /// Memory address outside the target's configured range for that space.
    #[error("address out of range")]
    BadAddress,
}

impl IsaError {
    /// Stable numeric code, matching the order of the monitor's error table.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Syntax => 1,
            Self::BadOperand => 2,
            Self::BadRegister => 3,
            Self::BadAddress => 4,
        }
    }

    /// Inverse of [`IsaError::code`].
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Syntax),
            2 => Some(Self::BadOperand),
            3 => Some(Self::BadRegister),
            4 => Some(Self::BadAddress),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IsaError;

    #[test]
    fn code_roundtrip_is_bijective() {
        for code in 1u8..=4 {
            let err = IsaError::from_code(code).expect("defined code");
            assert_eq!(err.code(), code);
        }
        assert_eq!(IsaError::from_code(0), None);
        assert_eq!(IsaError::from_code(5), None);
    }

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(IsaError::BadRegister.to_string(), "invalid register");
        assert_eq!(IsaError::BadAddress.to_string(), "address out of range");
    }
}
