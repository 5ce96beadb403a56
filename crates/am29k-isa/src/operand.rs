//! Operand resolver: token text to [`Address`], and range validation against a target.
//!
//! Accepted token forms, tried in order:
//!
//! - special-register alias (`cps`, `pc1`, `lru`, ...) or the literal `pc`
//! - register: `lr`/`ar`/`gr`/`sr`/`tr`/`xr` followed by one to three decimal digits
//! - PC-relative: `.` followed by an optionally signed hex offset
//! - number: `[0x]<hex>[m|i|r|p|u]`, the suffix selecting the memory space

use crate::address::{
    Address, Space, TargetConfig, ABSOLUTE_REGISTER_COUNT, COPROCESSOR_REGISTER_COUNT,
    GLOBAL_REGISTER_COUNT, LOCAL_REGISTER_COUNT, LOCAL_REGISTER_FLAG,
};
use crate::error::IsaError;

/// Maximum decimal digits in a register index.
pub const MAX_REGISTER_DIGITS: usize = 3;
/// Maximum hex digits in a numeric operand.
pub const MAX_HEX_DIGITS: usize = 8;

/// Special-register alias names and their register numbers.
///
/// Shared by the resolver and the decoder so printed text resolves back to the same register.
pub const SPECIAL_REGISTER_ALIASES: &[(&str, u8)] = &[
    ("vab", 0),
    ("ops", 1),
    ("cps", 2),
    ("cfg", 3),
    ("cha", 4),
    ("chd", 5),
    ("chc", 6),
    ("rbp", 7),
    ("tmc", 8),
    ("tmr", 9),
    ("pc0", 10),
    ("pc1", 11),
    ("pc2", 12),
    ("mmu", 13),
    ("lru", 14),
    ("cir", 29),
    ("cdr", 30),
    ("ipc", 128),
    ("ipa", 129),
    ("ipb", 130),
    ("q", 131),
    ("alu", 132),
    ("bp", 133),
    ("fc", 134),
    ("cr", 135),
    ("fpe", 160),
    ("inte", 161),
    ("fps", 162),
    ("exop", 164),
];

const REGISTER_PREFIXES: &[(&str, Space)] = &[
    ("lr", Space::LocalReg),
    ("ar", Space::AbsoluteReg),
    ("gr", Space::GlobalReg),
    ("sr", Space::SpecialReg),
    ("tr", Space::TlbReg),
    ("xr", Space::CoprocessorReg),
];

/// Looks up a special-register alias, ignoring ASCII case.
#[must_use]
pub fn special_register_by_name(name: &str) -> Option<u8> {
    SPECIAL_REGISTER_ALIASES
        .iter()
        .find_map(|(alias, index)| alias.eq_ignore_ascii_case(name).then_some(*index))
}

/// Returns the alias of special register `index`, or `srNN` when it has none.
#[must_use]
pub fn format_special_register(index: u8) -> String {
    SPECIAL_REGISTER_ALIASES
        .iter()
        .find_map(|(alias, i)| (*i == index).then(|| (*alias).to_string()))
        .unwrap_or_else(|| format!("sr{index:02}"))
}

/// Formats an encoded register field: bit 7 selects `lrNN`, otherwise `grNN`.
#[must_use]
pub fn format_register_field(field: u8) -> String {
    if field & LOCAL_REGISTER_FLAG == 0 {
        format!("gr{field:02}")
    } else {
        format!("lr{:02}", field & !LOCAL_REGISTER_FLAG)
    }
}

/// Resolves one operand token.
///
/// `default_space` applies to bare numbers without a space suffix.
///
/// # Errors
///
/// [`IsaError::BadRegister`] for a register prefix with a malformed index,
/// [`IsaError::Syntax`] for anything that is not a register, alias or hex number.
pub fn resolve(token: &str, default_space: Space) -> Result<Address, IsaError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(IsaError::Syntax);
    }
    let lower = token.to_ascii_lowercase();

    // Aliases first: `lru` shares the `lr` prefix.
    if lower == "pc" {
        return Ok(Address::new(Space::PcSpace, 0));
    }
    if let Some(index) = special_register_by_name(&lower) {
        return Ok(Address::new(Space::SpecialReg, u32::from(index)));
    }

    if let Some(address) = resolve_register(&lower)? {
        return Ok(address);
    }

    if let Some(rest) = lower.strip_prefix('.') {
        return resolve_pc_relative(rest);
    }

    resolve_number(&lower, default_space)
}

fn resolve_register(token: &str) -> Result<Option<Address>, IsaError> {
    let Some((digits, space)) = REGISTER_PREFIXES
        .iter()
        .find_map(|(prefix, space)| token.strip_prefix(prefix).map(|rest| (rest, *space)))
    else {
        return Ok(None);
    };

    if digits.is_empty()
        || digits.len() > MAX_REGISTER_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(IsaError::BadRegister);
    }
    let index = digits.parse::<u32>().map_err(|_| IsaError::BadRegister)?;
    Ok(Some(Address::new(space, index)))
}

fn resolve_pc_relative(rest: &str) -> Result<Address, IsaError> {
    let (negative, magnitude) = match rest.as_bytes().first() {
        Some(b'-') => (true, &rest[1..]),
        Some(b'+') => (false, &rest[1..]),
        _ => (false, rest),
    };
    let value = parse_hex(magnitude)?;
    let offset = if negative {
        value.wrapping_neg()
    } else {
        value
    };
    Ok(Address::new(Space::PcRelative, offset))
}

fn resolve_number(token: &str, default_space: Space) -> Result<Address, IsaError> {
    let (body, space) = match token.as_bytes().last() {
        Some(b'm') => (&token[..token.len() - 1], Space::DataMemory),
        Some(b'i') => (&token[..token.len() - 1], Space::InstructionMemory),
        Some(b'r') => (&token[..token.len() - 1], Space::InstructionRom),
        Some(b'p') => (&token[..token.len() - 1], Space::Io),
        Some(b'u') => (&token[..token.len() - 1], Space::Generic),
        _ => (token, default_space),
    };
    Ok(Address::new(space, parse_hex(body)?))
}

/// Parses an unsigned hex number with an optional `0x` prefix and at most eight digits.
///
/// # Errors
///
/// [`IsaError::Syntax`] for an empty, signed, over-long or non-hex token.
pub fn parse_hex(text: &str) -> Result<u32, IsaError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.is_empty()
        || digits.len() > MAX_HEX_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return Err(IsaError::Syntax);
    }
    u32::from_str_radix(digits, 16).map_err(|_| IsaError::Syntax)
}

/// Range-checks an address against the live target configuration.
///
/// # Errors
///
/// [`IsaError::BadRegister`] for a register index outside its file on this
/// processor, [`IsaError::BadAddress`] for memory outside the configured window.
pub fn validate(address: &Address, config: &TargetConfig) -> Result<(), IsaError> {
    let profile = config.processor().profile();
    let index = address.offset;
    let register_ok = match address.space {
        Space::LocalReg => index < LOCAL_REGISTER_COUNT,
        Space::GlobalReg => index < GLOBAL_REGISTER_COUNT,
        Space::AbsoluteReg => index < ABSOLUTE_REGISTER_COUNT,
        Space::SpecialReg => profile.has_special_register(index),
        Space::TlbReg => profile.has_tlb_register(index),
        Space::CoprocessorReg => {
            config.coprocessor_id.is_some() && index < COPROCESSOR_REGISTER_COUNT
        }
        space => {
            return match config.range_for(space) {
                Some(range) if !range.contains(index) => Err(IsaError::BadAddress),
                _ => Ok(()),
            };
        }
    };
    if register_ok {
        Ok(())
    } else {
        Err(IsaError::BadRegister)
    }
}

/// Resolves a token and validates it in one step.
///
/// # Errors
///
/// Any error of [`resolve`] or [`validate`].
pub fn resolve_checked(
    token: &str,
    default_space: Space,
    config: &TargetConfig,
) -> Result<Address, IsaError> {
    let address = resolve(token, default_space)?;
    validate(&address, config)?;
    Ok(address)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::address::MemoryRange;

    fn am29000() -> TargetConfig {
        TargetConfig {
            processor_id: 0x03,
            coprocessor_id: None,
            rom: MemoryRange::new(0, 0x0010_0000),
            instruction_memory: MemoryRange::new(0x0010_0000, 0x0010_0000),
            data_memory: MemoryRange::new(0x4000_0000, 0x0010_0000),
        }
    }

    #[rstest]
    #[case("gr1", Space::GlobalReg, 1)]
    #[case("GR01", Space::GlobalReg, 1)]
    #[case("lr127", Space::LocalReg, 127)]
    #[case("ar255", Space::AbsoluteReg, 255)]
    #[case("sr3", Space::SpecialReg, 3)]
    #[case("tr12", Space::TlbReg, 12)]
    #[case("xr0", Space::CoprocessorReg, 0)]
    #[case("cps", Space::SpecialReg, 2)]
    #[case("FPE", Space::SpecialReg, 160)]
    #[case("pc", Space::PcSpace, 0)]
    #[case("pc1", Space::SpecialReg, 11)]
    #[case("lru", Space::SpecialReg, 14)]
    #[case("LRU", Space::SpecialReg, 14)]
    #[case("1000", Space::InstructionMemory, 0x1000)]
    #[case("0x1000i", Space::InstructionMemory, 0x1000)]
    #[case("0x1000m", Space::DataMemory, 0x1000)]
    #[case("20r", Space::InstructionRom, 0x20)]
    #[case("80p", Space::Io, 0x80)]
    #[case("ffu", Space::Generic, 0xff)]
    #[case(".10", Space::PcRelative, 0x10)]
    #[case(".-4", Space::PcRelative, 0xffff_fffc)]
    #[case(".+0x8", Space::PcRelative, 8)]
    fn resolves_token_forms(#[case] token: &str, #[case] space: Space, #[case] offset: u32) {
        assert_eq!(
            resolve(token, Space::InstructionMemory),
            Ok(Address::new(space, offset))
        );
    }

    #[rstest]
    #[case("gr", IsaError::BadRegister)]
    #[case("gr1x", IsaError::BadRegister)]
    #[case("lr1000", IsaError::BadRegister)]
    #[case("sr-1", IsaError::BadRegister)]
    #[case("", IsaError::Syntax)]
    #[case("0x", IsaError::Syntax)]
    #[case("zz", IsaError::Syntax)]
    #[case("123456789", IsaError::Syntax)]
    #[case(".", IsaError::Syntax)]
    #[case("m", IsaError::Syntax)]
    fn rejects_malformed_tokens(#[case] token: &str, #[case] error: IsaError) {
        assert_eq!(resolve(token, Space::DataMemory), Err(error));
    }

    #[rstest]
    #[case("ff", Ok(0xff))]
    #[case("0xdeadbeef", Ok(0xdead_beef))]
    #[case("+1", Err(IsaError::Syntax))]
    #[case("-1", Err(IsaError::Syntax))]
    #[case("0x+1", Err(IsaError::Syntax))]
    #[case("100000000", Err(IsaError::Syntax))]
    fn hex_values_are_unsigned(#[case] text: &str, #[case] expected: Result<u32, IsaError>) {
        assert_eq!(parse_hex(text), expected);
    }

    #[test]
    fn bare_number_uses_default_space() {
        assert_eq!(
            resolve("40", Space::Generic),
            Ok(Address::new(Space::Generic, 0x40))
        );
    }

    #[test]
    fn special_register_text_roundtrips_through_resolver() {
        for index in 0u8..=255 {
            let text = format_special_register(index);
            let address = resolve(&text, Space::Generic).expect("special register text");
            assert_eq!(address, Address::new(Space::SpecialReg, u32::from(index)));
        }
    }

    #[test]
    fn register_field_text_roundtrips_through_resolver() {
        for field in 0u8..=255 {
            let text = format_register_field(field);
            let address = resolve(&text, Space::Generic).expect("register text");
            let expected_space = if field & LOCAL_REGISTER_FLAG == 0 {
                Space::GlobalReg
            } else {
                Space::LocalReg
            };
            assert_eq!(address.space, expected_space);
            assert_eq!(address.offset, u32::from(field & 0x7f));
        }
    }

    #[rstest]
    #[case(Space::LocalReg, 128)]
    #[case(Space::GlobalReg, 128)]
    #[case(Space::AbsoluteReg, 256)]
    #[case(Space::TlbReg, 128)]
    fn register_bounds_accept_exactly_the_file(#[case] space: Space, #[case] bound: u32) {
        let config = am29000();
        for index in 0..bound {
            assert_eq!(validate(&Address::new(space, index), &config), Ok(()));
        }
        assert_eq!(
            validate(&Address::new(space, bound), &config),
            Err(IsaError::BadRegister)
        );
    }

    #[rstest]
    #[case(0x03, 14, true)]
    #[case(0x03, 15, false)]
    #[case(0x03, 160, false)]
    #[case(0x21, 160, true)]
    #[case(0x21, 163, false)]
    #[case(0x21, 164, true)]
    #[case(0x13, 13, false)]
    #[case(0x41, 29, true)]
    #[case(0x51, 29, false)]
    fn special_register_bounds_follow_processor(
        #[case] prl: u8,
        #[case] index: u32,
        #[case] ok: bool,
    ) {
        let config = TargetConfig {
            processor_id: prl,
            ..am29000()
        };
        let result = validate(&Address::new(Space::SpecialReg, index), &config);
        assert_eq!(result.is_ok(), ok, "prl {prl:#x} sr{index}");
    }

    #[test]
    fn tlb_bounds_follow_processor() {
        let am29030 = TargetConfig {
            processor_id: 0x40,
            ..am29000()
        };
        assert_eq!(validate(&Address::new(Space::TlbReg, 63), &am29030), Ok(()));
        assert_eq!(
            validate(&Address::new(Space::TlbReg, 64), &am29030),
            Err(IsaError::BadRegister)
        );
    }

    #[test]
    fn coprocessor_registers_need_a_coprocessor() {
        let mut config = am29000();
        let xr0 = Address::new(Space::CoprocessorReg, 0);
        assert_eq!(validate(&xr0, &config), Err(IsaError::BadRegister));
        config.coprocessor_id = Some(0x20);
        assert_eq!(validate(&xr0, &config), Ok(()));
        assert_eq!(
            validate(&Address::new(Space::CoprocessorReg, 32), &config),
            Err(IsaError::BadRegister)
        );
    }

    #[test]
    fn memory_is_checked_against_configured_windows() {
        let config = am29000();
        assert_eq!(
            validate(&Address::new(Space::InstructionMemory, 0x0010_0000), &config),
            Ok(())
        );
        assert_eq!(
            validate(&Address::new(Space::InstructionMemory, 0x0020_0000), &config),
            Err(IsaError::BadAddress)
        );
        assert_eq!(
            validate(&Address::new(Space::DataMemory, 0x10), &config),
            Err(IsaError::BadAddress)
        );
        assert_eq!(
            validate(&Address::new(Space::DataRom, 0x10), &config),
            Ok(())
        );
    }

    #[test]
    fn unbounded_spaces_are_always_in_range() {
        let config = am29000();
        for space in [
            Space::Io,
            Space::Generic,
            Space::PcSpace,
            Space::PcRelative,
            Space::InstructionCache,
            Space::DataCache,
            Space::Version,
        ] {
            assert_eq!(validate(&Address::new(space, u32::MAX), &config), Ok(()));
        }
    }

    #[test]
    fn validity_tracks_config_changes() {
        let mut config = am29000();
        let addr = resolve("0x0030_0000", Space::InstructionMemory);
        assert_eq!(addr, Err(IsaError::Syntax));
        let addr = resolve("300000i", Space::Generic).expect("resolves");
        assert_eq!(validate(&addr, &config), Err(IsaError::BadAddress));
        config.instruction_memory = MemoryRange::new(0x0030_0000, 0x1000);
        assert_eq!(validate(&addr, &config), Ok(()));
    }

    proptest! {
        #[test]
        fn resolved_global_registers_validate_iff_below_bound(index in 0u32..1000) {
            let address = resolve(&format!("gr{index}"), Space::Generic).expect("register");
            let result = validate(&address, &am29000());
            prop_assert_eq!(result.is_ok(), index < GLOBAL_REGISTER_COUNT);
        }

        #[test]
        fn hex_numbers_resolve_to_their_value(value in any::<u32>()) {
            let address = resolve(&format!("0x{value:x}m"), Space::Generic).expect("number");
            prop_assert_eq!(address, Address::new(Space::DataMemory, value));
        }
    }
}
