//! Address spaces, target configuration and per-processor register bounds.

use std::fmt;

/// Number of local registers (`lr0`..`lr127`).
pub const LOCAL_REGISTER_COUNT: u32 = 128;
/// Number of global registers addressable by name (`gr0`..`gr127`).
pub const GLOBAL_REGISTER_COUNT: u32 = 128;
/// Number of absolute register numbers (8-bit register field).
pub const ABSOLUTE_REGISTER_COUNT: u32 = 256;
/// Number of coprocessor transfer registers when a coprocessor is present.
pub const COPROCESSOR_REGISTER_COUNT: u32 = 32;
/// Bit set in an encoded register field to select the local register file.
pub const LOCAL_REGISTER_FLAG: u8 = 0x80;

/// Address-space tag shared by the resolver, the codec and the remote interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Space {
    /// Stack-cache local registers.
    LocalReg = 0,
    /// Absolute register numbers.
    AbsoluteReg = 1,
    /// Global registers.
    GlobalReg = 2,
    /// Special-purpose registers.
    SpecialReg = 3,
    /// Translation look-aside buffer registers.
    TlbReg = 4,
    /// Coprocessor registers.
    CoprocessorReg = 5,
    /// Instruction memory.
    InstructionMemory = 6,
    /// Data memory.
    DataMemory = 7,
    /// Instruction ROM.
    InstructionRom = 8,
    /// Data ROM.
    DataRom = 9,
    /// Processor-dependent I/O space.
    Io = 10,
    /// Instruction cache.
    InstructionCache = 11,
    /// Data cache.
    DataCache = 12,
    /// Program counter pseudo-space.
    PcSpace = 13,
    /// Offset relative to the current program counter.
    PcRelative = 14,
    /// Generic or unspecified space.
    Generic = 15,
    /// Monitor version pseudo-space.
    Version = 16,
}

impl Space {
    /// Converts a wire code into a space tag.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::LocalReg),
            1 => Some(Self::AbsoluteReg),
            2 => Some(Self::GlobalReg),
            3 => Some(Self::SpecialReg),
            4 => Some(Self::TlbReg),
            5 => Some(Self::CoprocessorReg),
            6 => Some(Self::InstructionMemory),
            7 => Some(Self::DataMemory),
            8 => Some(Self::InstructionRom),
            9 => Some(Self::DataRom),
            10 => Some(Self::Io),
            11 => Some(Self::InstructionCache),
            12 => Some(Self::DataCache),
            13 => Some(Self::PcSpace),
            14 => Some(Self::PcRelative),
            15 => Some(Self::Generic),
            16 => Some(Self::Version),
            _ => None,
        }
    }

    /// Wire code of this space.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for every register file.
    #[must_use]
    pub const fn is_register(self) -> bool {
        matches!(
            self,
            Self::LocalReg
                | Self::AbsoluteReg
                | Self::GlobalReg
                | Self::SpecialReg
                | Self::TlbReg
                | Self::CoprocessorReg
        )
    }

    /// Returns `true` for the general-purpose register files (local and global).
    #[must_use]
    pub const fn is_general(self) -> bool {
        matches!(self, Self::LocalReg | Self::GlobalReg)
    }

    /// Returns `true` for the special-purpose register file.
    #[must_use]
    pub const fn is_special(self) -> bool {
        matches!(self, Self::SpecialReg)
    }

    /// Returns `true` for spaces whose offsets act as plain numbers in instructions.
    #[must_use]
    pub const fn is_memory(self) -> bool {
        matches!(
            self,
            Self::InstructionMemory
                | Self::DataMemory
                | Self::InstructionRom
                | Self::DataRom
                | Self::Io
                | Self::Generic
                | Self::PcRelative
        )
    }

    /// Short lowercase name used in listings and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LocalReg => "lr",
            Self::AbsoluteReg => "ar",
            Self::GlobalReg => "gr",
            Self::SpecialReg => "sr",
            Self::TlbReg => "tr",
            Self::CoprocessorReg => "xr",
            Self::InstructionMemory => "imem",
            Self::DataMemory => "dmem",
            Self::InstructionRom => "irom",
            Self::DataRom => "drom",
            Self::Io => "io",
            Self::InstructionCache => "icache",
            Self::DataCache => "dcache",
            Self::PcSpace => "pc",
            Self::PcRelative => "pcrel",
            Self::Generic => "generic",
            Self::Version => "version",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A `{space, offset}` pair.
///
/// Being resolved says nothing about being in range: call
/// [`crate::operand::validate`] against the live [`TargetConfig`] every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Address {
    /// Address-space tag.
    pub space: Space,
    /// Offset within the space (register index or byte address).
    pub offset: u32,
}

impl Address {
    /// Creates an address.
    #[must_use]
    pub const fn new(space: Space, offset: u32) -> Self {
        Self { space, offset }
    }

    /// Returns the same offset in another space.
    #[must_use]
    pub const fn with_space(self, space: Space) -> Self {
        Self {
            space,
            offset: self.offset,
        }
    }

    /// Adds a byte delta, wrapping at 32 bits.
    #[must_use]
    pub const fn wrapping_add(self, delta: u32) -> Self {
        Self {
            space: self.space,
            offset: self.offset.wrapping_add(delta),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{:08x}", self.space, self.offset)
    }
}

/// A `{start, size}` memory window reported by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryRange {
    /// First valid byte address.
    pub start: u32,
    /// Window size in bytes.
    pub size: u32,
}

impl MemoryRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(start: u32, size: u32) -> Self {
        Self { start, size }
    }

    /// Returns `true` when `addr` lies inside the window.
    #[must_use]
    pub const fn contains(self, addr: u32) -> bool {
        addr >= self.start && (addr - self.start) < self.size
    }

    /// Inclusive last address, or `None` for an empty window.
    #[must_use]
    pub const fn end(self) -> Option<u32> {
        if self.size == 0 {
            None
        } else {
            Some(self.start.wrapping_add(self.size - 1))
        }
    }
}

/// Processor family member, selected by the high nibble of the PRL byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum Processor {
    Am29000,
    Am29005,
    Am29050,
    Am29035,
    Am29030,
    Am29200,
    Am29205,
    Am29240,
    Unknown,
}

impl Processor {
    /// Decodes the processor from its PRL (processor release level) byte.
    #[must_use]
    pub const fn from_prl(prl: u8) -> Self {
        match prl >> 4 {
            0x0 => Self::Am29000,
            0x1 => Self::Am29005,
            0x2 => Self::Am29050,
            0x3 => Self::Am29035,
            0x4 => Self::Am29030,
            0x5 => Self::Am29200,
            0x6 => Self::Am29205,
            0x7 => Self::Am29240,
            _ => Self::Unknown,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Am29000 => "Am29000",
            Self::Am29005 => "Am29005",
            Self::Am29050 => "Am29050",
            Self::Am29035 => "Am29035",
            Self::Am29030 => "Am29030",
            Self::Am29200 => "Am29200",
            Self::Am29205 => "Am29205",
            Self::Am29240 => "Am29240",
            Self::Unknown => "unknown 29K",
        }
    }

    /// Register-file bounds for this processor.
    #[must_use]
    pub const fn profile(self) -> &'static ProcessorProfile {
        match self {
            Self::Am29000 | Self::Unknown => &AM29000_PROFILE,
            Self::Am29005 => &AM29005_PROFILE,
            Self::Am29050 => &AM29050_PROFILE,
            Self::Am29030 | Self::Am29035 => &AM2903X_PROFILE,
            Self::Am29200 | Self::Am29205 | Self::Am29240 => &AM292X0_PROFILE,
        }
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Implemented special registers and TLB size for one processor family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorProfile {
    /// Inclusive `(first, last)` special-register index ranges.
    pub special_registers: &'static [(u32, u32)],
    /// Number of TLB registers (two per TLB entry).
    pub tlb_registers: u32,
}

impl ProcessorProfile {
    /// Returns `true` when special register `index` is implemented.
    #[must_use]
    pub fn has_special_register(&self, index: u32) -> bool {
        self.special_registers
            .iter()
            .any(|&(first, last)| index >= first && index <= last)
    }

    /// Returns `true` when TLB register `index` is implemented.
    #[must_use]
    pub const fn has_tlb_register(&self, index: u32) -> bool {
        index < self.tlb_registers
    }

    /// Iterates over every implemented special register index.
    pub fn special_register_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.special_registers
            .iter()
            .flat_map(|&(first, last)| first..=last)
    }
}

/// Am29000 register bounds.
pub const AM29000_PROFILE: ProcessorProfile = ProcessorProfile {
    special_registers: &[(0, 14), (128, 135)],
    tlb_registers: 128,
};

/// Am29005 register bounds (no MMU).
pub const AM29005_PROFILE: ProcessorProfile = ProcessorProfile {
    special_registers: &[(0, 12), (128, 135)],
    tlb_registers: 0,
};

/// Am29050 register bounds, including the floating-point environment registers.
pub const AM29050_PROFILE: ProcessorProfile = ProcessorProfile {
    special_registers: &[(0, 14), (128, 135), (160, 162), (164, 164)],
    tlb_registers: 128,
};

/// Am29030/Am29035 register bounds, including the cache interface registers.
pub const AM2903X_PROFILE: ProcessorProfile = ProcessorProfile {
    special_registers: &[(0, 14), (29, 30), (128, 135)],
    tlb_registers: 64,
};

/// Am292x0 microcontroller register bounds.
pub const AM292X0_PROFILE: ProcessorProfile = ProcessorProfile {
    special_registers: &[(0, 14), (128, 135)],
    tlb_registers: 64,
};

/// Target configuration reported by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TargetConfig {
    /// PRL byte of the `CFG` special register.
    pub processor_id: u8,
    /// Coprocessor identifier, `None` when no coprocessor is attached.
    pub coprocessor_id: Option<u8>,
    /// ROM window.
    pub rom: MemoryRange,
    /// Instruction memory window.
    pub instruction_memory: MemoryRange,
    /// Data memory window.
    pub data_memory: MemoryRange,
}

impl TargetConfig {
    /// Processor decoded from [`TargetConfig::processor_id`].
    #[must_use]
    pub const fn processor(&self) -> Processor {
        Processor::from_prl(self.processor_id)
    }

    /// Memory window for a memory space, or `None` if the space is unbounded.
    #[must_use]
    pub const fn range_for(&self, space: Space) -> Option<MemoryRange> {
        match space {
            Space::InstructionMemory => Some(self.instruction_memory),
            Space::DataMemory => Some(self.data_memory),
            Space::InstructionRom | Space::DataRom => Some(self.rom),
            _ => None,
        }
    }
}

impl fmt::Display for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "processor: {} (PRL 0x{:02x})",
            self.processor(),
            self.processor_id
        )?;
        match self.coprocessor_id {
            Some(id) => writeln!(f, "coprocessor: 0x{id:02x}")?,
            None => writeln!(f, "coprocessor: none")?,
        }
        for (label, range) in [
            ("rom", self.rom),
            ("imem", self.instruction_memory),
            ("dmem", self.data_memory),
        ] {
            match range.end() {
                Some(end) => writeln!(f, "{label}: 0x{:08x}-0x{end:08x}", range.start)?,
                None => writeln!(f, "{label}: none")?,
            }
        }
        Ok(())
    }
}
