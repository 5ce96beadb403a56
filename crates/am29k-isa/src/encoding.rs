//! Instruction word layout and the static opcode table.
//!
//! Every 29K instruction is four bytes `op, c, a, b`, big-endian in memory.
//! The low opcode bit is the M bit: for formats that use it, a set M bit
//! makes operand B an 8-bit immediate (or a branch target absolute).

use std::fmt;

/// One 32-bit instruction split into its byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Instruction {
    /// Opcode byte.
    pub op: u8,
    /// Field C: usually the destination register.
    pub c: u8,
    /// Field A: usually the first source register.
    pub a: u8,
    /// Field B: second source register or 8-bit immediate.
    pub b: u8,
}

impl Instruction {
    /// Creates an instruction from its fields.
    #[must_use]
    pub const fn new(op: u8, c: u8, a: u8, b: u8) -> Self {
        Self { op, c, a, b }
    }

    /// Builds an instruction from its big-endian memory image.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self {
            op: bytes[0],
            c: bytes[1],
            a: bytes[2],
            b: bytes[3],
        }
    }

    /// Big-endian memory image.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 4] {
        [self.op, self.c, self.a, self.b]
    }

    /// Builds an instruction from a 32-bit word.
    #[must_use]
    pub const fn from_word(word: u32) -> Self {
        Self::from_be_bytes(word.to_be_bytes())
    }

    /// The instruction as a 32-bit word.
    #[must_use]
    pub const fn word(self) -> u32 {
        u32::from_be_bytes(self.to_be_bytes())
    }

    /// State of the M bit (opcode bit 0).
    #[must_use]
    pub const fn m_bit(self) -> bool {
        self.op & 1 != 0
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.word())
    }
}

/// Encoding of the synthetic `nop`: `aseq 0x40,gr1,gr1`.
pub const NOP_INSTRUCTION: Instruction = Instruction::new(0x70, 0x40, 1, 1);

/// Operand layout shared by a group of opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InstructionFormat {
    /// `rc, ra, rb|imm8`.
    ArithLogic,
    /// Assert-and-trap: `vn, ra, rb|imm8`.
    Vector,
    /// `ce, cntl, ra, rb|imm8` with C packed as `ce<<7 | cntl`.
    LoadStore,
    /// No operands.
    NoOperands,
    /// Cache invalidate with an optional 0..=3 selector in C.
    InvalidateCache,
    /// Floating-point and multiply-step forms: `rc, ra, rb`.
    Float,
    /// Conditional jump or call: `ra, target`.
    CallJump,
    /// Unconditional jump: `target`.
    Jump,
    /// Indirect jump: `rb`.
    JumpIndirect,
    /// Conditional indirect jump or call: `ra, rb`.
    CallJumpIndirect,
    /// Classify: `rc, ra, fs` with the format selector in B.
    Class,
    /// Square root: `rc, ra, fs`.
    Sqrt,
    /// Count leading zeros: `rc, rb|imm8`.
    CountLeadingZeros,
    /// 16-bit constant: `ra, imm16`.
    Const,
    /// Negative 16-bit constant: `ra, imm`, upper half ones.
    ConstN,
    /// Constant high: `ra, imm`, upper half only.
    ConstH,
    /// Format conversion: `rc, ra, ui, rnd, fd, fs`.
    Convert,
    /// Divide initialize: `rc, rb|imm8`.
    Div0,
    /// Extract half-word sign-extended: `rc, ra`.
    Exhws,
    /// Move from special register: `rc, sa`.
    Mfsr,
    /// Move to special register: `sa, rb`.
    Mtsr,
    /// Move immediate to special register: `sa, imm16`.
    Mtsrim,
    /// Move from TLB: `rc, ra`.
    Mftlb,
    /// Move to TLB: `ra, rb`.
    Mttlb,
    /// Trap to an emulation vector: `vn, ra, rb`.
    Emulate,
}

impl InstructionFormat {
    /// Returns `true` when the opcode's low bit selects an immediate or absolute form.
    #[must_use]
    pub const fn uses_m_bit(self) -> bool {
        matches!(
            self,
            Self::ArithLogic
                | Self::Vector
                | Self::LoadStore
                | Self::CallJump
                | Self::Jump
                | Self::CountLeadingZeros
                | Self::Div0
        )
    }

    /// Space assumed for bare numeric operands of this format.
    #[must_use]
    pub const fn default_operand_space(self) -> crate::address::Space {
        match self {
            Self::InvalidateCache => crate::address::Space::Generic,
            _ => crate::address::Space::InstructionMemory,
        }
    }
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpcodeDescriptor {
    /// Opcode byte.
    pub opcode: u8,
    /// Canonical lowercase mnemonic.
    pub mnemonic: &'static str,
    /// Operand layout.
    pub format: InstructionFormat,
}

use InstructionFormat as F;

/// Assigned opcodes. Formats with an M bit occupy the listed even opcode and the odd one after it.
const OPCODE_DEFINITIONS: &[(u8, &str, InstructionFormat)] = &[
    (0x01, "constn", F::ConstN),
    (0x02, "consth", F::ConstH),
    (0x03, "const", F::Const),
    (0x04, "mtsrim", F::Mtsrim),
    (0x05, "consthz", F::Const),
    (0x06, "loadl", F::LoadStore),
    (0x08, "clz", F::CountLeadingZeros),
    (0x0a, "exbyte", F::ArithLogic),
    (0x0c, "inbyte", F::ArithLogic),
    (0x0e, "storel", F::LoadStore),
    (0x10, "adds", F::ArithLogic),
    (0x12, "addu", F::ArithLogic),
    (0x14, "add", F::ArithLogic),
    (0x16, "load", F::LoadStore),
    (0x18, "addcs", F::ArithLogic),
    (0x1a, "addcu", F::ArithLogic),
    (0x1c, "addc", F::ArithLogic),
    (0x1e, "store", F::LoadStore),
    (0x20, "subs", F::ArithLogic),
    (0x22, "subu", F::ArithLogic),
    (0x24, "sub", F::ArithLogic),
    (0x26, "loadset", F::LoadStore),
    (0x28, "subcs", F::ArithLogic),
    (0x2a, "subcu", F::ArithLogic),
    (0x2c, "subc", F::ArithLogic),
    (0x2e, "cpbyte", F::ArithLogic),
    (0x30, "subrs", F::ArithLogic),
    (0x32, "subru", F::ArithLogic),
    (0x34, "subr", F::ArithLogic),
    (0x36, "loadm", F::LoadStore),
    (0x38, "subrcs", F::ArithLogic),
    (0x3a, "subrcu", F::ArithLogic),
    (0x3c, "subrc", F::ArithLogic),
    (0x3e, "storem", F::LoadStore),
    (0x40, "cplt", F::ArithLogic),
    (0x42, "cpltu", F::ArithLogic),
    (0x44, "cple", F::ArithLogic),
    (0x46, "cpleu", F::ArithLogic),
    (0x48, "cpgt", F::ArithLogic),
    (0x4a, "cpgtu", F::ArithLogic),
    (0x4c, "cpge", F::ArithLogic),
    (0x4e, "cpgeu", F::ArithLogic),
    (0x50, "aslt", F::Vector),
    (0x52, "asltu", F::Vector),
    (0x54, "asle", F::Vector),
    (0x56, "asleu", F::Vector),
    (0x58, "asgt", F::Vector),
    (0x5a, "asgtu", F::Vector),
    (0x5c, "asge", F::Vector),
    (0x5e, "asgeu", F::Vector),
    (0x60, "cpeq", F::ArithLogic),
    (0x62, "cpneq", F::ArithLogic),
    (0x64, "mul", F::ArithLogic),
    (0x66, "mull", F::ArithLogic),
    (0x68, "div0", F::Div0),
    (0x6a, "div", F::ArithLogic),
    (0x6c, "divl", F::ArithLogic),
    (0x6e, "divrem", F::ArithLogic),
    (0x70, "aseq", F::Vector),
    (0x72, "asneq", F::Vector),
    (0x74, "mulu", F::ArithLogic),
    (0x78, "inhw", F::ArithLogic),
    (0x7a, "extract", F::ArithLogic),
    (0x7c, "exhw", F::ArithLogic),
    (0x7e, "exhws", F::Exhws),
    (0x80, "sll", F::ArithLogic),
    (0x82, "srl", F::ArithLogic),
    (0x86, "sra", F::ArithLogic),
    (0x88, "iret", F::NoOperands),
    (0x89, "halt", F::NoOperands),
    (0x8c, "iretinv", F::InvalidateCache),
    (0x90, "and", F::ArithLogic),
    (0x92, "or", F::ArithLogic),
    (0x94, "xor", F::ArithLogic),
    (0x96, "xnor", F::ArithLogic),
    (0x98, "nor", F::ArithLogic),
    (0x9a, "nand", F::ArithLogic),
    (0x9c, "andn", F::ArithLogic),
    (0x9e, "setip", F::Float),
    (0x9f, "inv", F::InvalidateCache),
    (0xa0, "jmp", F::Jump),
    (0xa4, "jmpf", F::CallJump),
    (0xa8, "call", F::CallJump),
    (0xaa, "orn", F::ArithLogic),
    (0xac, "jmpt", F::CallJump),
    (0xb4, "jmpfdec", F::CallJump),
    (0xb6, "mftlb", F::Mftlb),
    (0xbe, "mttlb", F::Mttlb),
    (0xc0, "jmpi", F::JumpIndirect),
    (0xc4, "jmpfi", F::CallJumpIndirect),
    (0xc6, "mfsr", F::Mfsr),
    (0xc8, "calli", F::CallJumpIndirect),
    (0xcc, "jmpti", F::CallJumpIndirect),
    (0xce, "mtsr", F::Mtsr),
    (0xd7, "emulate", F::Emulate),
    (0xde, "multm", F::Float),
    (0xdf, "multmu", F::Float),
    (0xe0, "multiply", F::Float),
    (0xe1, "divide", F::Float),
    (0xe2, "multiplu", F::Float),
    (0xe3, "dividu", F::Float),
    (0xe4, "convert", F::Convert),
    (0xe5, "sqrt", F::Sqrt),
    (0xe6, "class", F::Class),
    (0xea, "feq", F::Float),
    (0xeb, "deq", F::Float),
    (0xec, "fgt", F::Float),
    (0xed, "dgt", F::Float),
    (0xee, "fge", F::Float),
    (0xef, "dge", F::Float),
    (0xf0, "fadd", F::Float),
    (0xf1, "dadd", F::Float),
    (0xf2, "fsub", F::Float),
    (0xf3, "dsub", F::Float),
    (0xf4, "fmul", F::Float),
    (0xf5, "dmul", F::Float),
    (0xf6, "fdiv", F::Float),
    (0xf7, "ddiv", F::Float),
    (0xf9, "fdmul", F::Float),
];

const fn build_opcode_table() -> [Option<OpcodeDescriptor>; 256] {
    let mut table: [Option<OpcodeDescriptor>; 256] = [None; 256];
    let mut i = 0;
    while i < OPCODE_DEFINITIONS.len() {
        let (opcode, mnemonic, format) = OPCODE_DEFINITIONS[i];
        table[opcode as usize] = Some(OpcodeDescriptor {
            opcode,
            mnemonic,
            format,
        });
        if format.uses_m_bit() {
            table[(opcode | 1) as usize] = Some(OpcodeDescriptor {
                opcode: opcode | 1,
                mnemonic,
                format,
            });
        }
        i += 1;
    }
    table
}

const fn definitions_are_disjoint() -> bool {
    let mut seen = [false; 256];
    let mut i = 0;
    while i < OPCODE_DEFINITIONS.len() {
        let (opcode, _, format) = OPCODE_DEFINITIONS[i];
        if seen[opcode as usize] {
            return false;
        }
        seen[opcode as usize] = true;
        if format.uses_m_bit() {
            if opcode & 1 != 0 || seen[(opcode | 1) as usize] {
                return false;
            }
            seen[(opcode | 1) as usize] = true;
        }
        i += 1;
    }
    true
}

const _: () = assert!(definitions_are_disjoint());

/// Opcode byte to descriptor; `None` marks an illegal opcode.
pub static OPCODE_TABLE: [Option<OpcodeDescriptor>; 256] = build_opcode_table();

/// Returns the descriptor for an opcode byte, or `None` if it is illegal.
#[must_use]
pub fn descriptor(opcode: u8) -> Option<&'static OpcodeDescriptor> {
    OPCODE_TABLE[opcode as usize].as_ref()
}

/// Finds the base descriptor for a mnemonic, ignoring ASCII case.
///
/// Matches whole names only, so `and` never finds `andn`. For M-bit formats
/// the result is the even opcode; the encoder sets bit 0 as needed.
#[must_use]
pub fn lookup_mnemonic(name: &str) -> Option<&'static OpcodeDescriptor> {
    OPCODE_TABLE
        .iter()
        .flatten()
        .find(|descriptor| descriptor.mnemonic.eq_ignore_ascii_case(name))
}

/// Number of legal opcode bytes.
#[must_use]
pub fn legal_opcode_count() -> usize {
    OPCODE_TABLE.iter().flatten().count()
}
