//! Concrete MCS-51 matchers, converters and operand factories, registered
//! under the names the bundled catalogs reference through `importing`
//! (`spec.md` §4.1). Grounded in
//! `examples/original_source/yay/cpus/MCS_51/matchers.py` and
//! `examples/original_source/yay/cpus/MCS_51/converters.py`.

use super::registry::Registry;
use crate::emit::ConversionContext;
use crate::error::{AsmError, Result};
use crate::operand::{Bit, Operand, Register, Sfr};

pub fn registry() -> Registry {
    Registry::builder()
        .matcher("register", is_register)
        .matcher("indirect", is_indirect)
        .matcher("indirect_dptr", is_indirect_dptr)
        .matcher("accu", is_accu)
        .matcher("dptr", is_dptr)
        .matcher("pc", is_pc)
        .matcher("dptr_offset", is_dptr_offset)
        .matcher("pc_offset", is_pc_offset)
        .matcher("carry", is_carry)
        .matcher("direct", is_direct)
        .matcher("direct_dest", is_direct)
        .matcher("direct_src", is_direct)
        .matcher("bit", is_bit)
        .matcher("not_bit", is_not_bit)
        .matcher("immediate", is_immediate)
        .matcher("immediate16", is_immediate16)
        .matcher("label", is_label)
        .matcher("addr16", is_addr16)
        .matcher("relative", is_relative)
        .matcher("addr11", is_addr11)
        .converter("addr16", "label", addr16_from_label)
        .converter("relative", "addr16", relative_from_addr16)
        .converter("relative", "label", relative_from_label)
        .converter("addr11", "addr16", addr11_from_addr16)
        .converter("addr11", "label", addr11_from_label)
        .factory("make_register", make_register)
        .factory("make_sfr", make_sfr)
        .factory("make_named_bit", make_named_bit)
        .build()
}

// ---- matchers (`is_<class>(candidate, from_alternative)`) ----
//
// `relative` and `addr11` have no operand variant of their own: they are
// only ever reached through an alternative (`addr16` or `label`), so their
// own direct matcher always fails (`examples/original_source/yay/cpus/MCS_51/matchers.py`).

fn is_register(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Register(_))
}

fn is_indirect(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::IndirectRegister(_))
}

fn is_indirect_dptr(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::IndirectDptr)
}

fn is_accu(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Accumulator)
}

fn is_dptr(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Dptr)
}

fn is_pc(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Pc)
}

fn is_dptr_offset(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::DptrOffset)
}

fn is_pc_offset(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::PcOffset)
}

fn is_carry(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Carry)
}

fn is_direct(op: &Operand, _from_alternative: bool) -> bool {
    op.byte_addr().is_some()
}

fn is_bit(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Bit(_))
}

fn is_not_bit(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::NotBit(_))
}

fn is_immediate(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Immediate(v) if (-128..=255).contains(v))
}

fn is_immediate16(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Immediate16(_))
}

fn is_label(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Label(_))
}

fn is_addr16(op: &Operand, _from_alternative: bool) -> bool {
    matches!(op, Operand::Addr16(v) if *v <= 0xFFFF)
}

fn is_relative(_op: &Operand, _from_alternative: bool) -> bool {
    false
}

fn is_addr11(_op: &Operand, _from_alternative: bool) -> bool {
    false
}

// ---- converters (`<to>_from_<from>(ctx, value) -> raw integer`) ----

fn resolve_label(ctx: &dyn ConversionContext, name: &str) -> Result<i64> {
    ctx.label_position(name)
        .map(|p| p as i64)
        .ok_or_else(|| AsmError::Label(format!("label `{name}` is never declared")))
}

fn addr16_from_label(ctx: &dyn ConversionContext, value: &Operand) -> Result<i64> {
    let name = value
        .label_name()
        .ok_or_else(|| AsmError::Type(format!("{value:?} is not a label")))?;
    resolve_label(ctx, name)
}

/// `relative = target - (position + size)` (`spec.md` §4.4, `examples/original_source/yay/cpus/MCS_51/converters.py`).
fn relative_from_addr16(ctx: &dyn ConversionContext, value: &Operand) -> Result<i64> {
    let target = match value {
        Operand::Addr16(v) => *v as i64,
        other => return Err(AsmError::Type(format!("{other:?} is not an absolute address"))),
    };
    Ok(target - (ctx.position() + ctx.size()) as i64)
}

fn relative_from_label(ctx: &dyn ConversionContext, value: &Operand) -> Result<i64> {
    let name = value
        .label_name()
        .ok_or_else(|| AsmError::Type(format!("{value:?} is not a label")))?;
    let target = resolve_label(ctx, name)?;
    Ok(target - (ctx.position() + ctx.size()) as i64)
}

/// `addr11` shares its low 11 bits with the jump target; the instruction
/// after the 2-byte opcode must land in the same 2KiB page as the target
/// (`spec.md` §4.4 edge case, `examples/original_source/yay/cpus/MCS_51/converters.py`).
fn addr11_from_addr16(ctx: &dyn ConversionContext, value: &Operand) -> Result<i64> {
    let target = match value {
        Operand::Addr16(v) => *v as i64,
        other => return Err(AsmError::Type(format!("{other:?} is not an absolute address"))),
    };
    let next = (ctx.position() + ctx.size()) as i64;
    if (next >> 11) != (target >> 11) {
        return Err(AsmError::Range {
            mnemonic: ctx.mnemonic().to_owned(),
            position: Some(ctx.position()),
            message: format!(
                "target {target:#06x} is not in the same 2KiB page as the instruction following {next:#06x}"
            ),
        });
    }
    Ok(target & 0x7FF)
}

fn addr11_from_label(ctx: &dyn ConversionContext, value: &Operand) -> Result<i64> {
    let name = value
        .label_name()
        .ok_or_else(|| AsmError::Type(format!("{value:?} is not a label")))?;
    let target = resolve_label(ctx, name)?;
    addr11_from_addr16(ctx, &Operand::Addr16(target as u32))
}

// ---- operand factories (`spec.md` §4.1, catalog `registers`/`sfrs`/`named_bits`) ----

fn value_as_u64(value: &serde_yaml::Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| AsmError::Config(format!("expected an integer, got {value:?}")))
}

fn value_as_str(value: &serde_yaml::Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| AsmError::Config(format!("expected a string, got {value:?}")))
}

fn make_register(args: &[serde_yaml::Value]) -> Result<Operand> {
    let [number, can_indirect] = args else {
        return Err(AsmError::Config("make_register expects [number, can_indirect]".into()));
    };
    let number = value_as_u64(number)?;
    let can_indirect = can_indirect
        .as_bool()
        .ok_or_else(|| AsmError::Config(format!("expected a bool, got {can_indirect:?}")))?;
    Ok(Operand::Register(Register::new(number as u8, can_indirect)))
}

fn make_sfr(args: &[serde_yaml::Value]) -> Result<Operand> {
    let [name, addr] = args else {
        return Err(AsmError::Config("make_sfr expects [name, addr]".into()));
    };
    let name = value_as_str(name)?;
    let addr = value_as_u64(addr)?;
    Ok(Operand::Sfr(Sfr::new(name, addr as u8)?))
}

fn make_named_bit(args: &[serde_yaml::Value]) -> Result<Operand> {
    let [_name, addr] = args else {
        return Err(AsmError::Config("make_named_bit expects [name, addr]".into()));
    };
    let addr = value_as_u64(addr)?;
    Ok(Operand::Bit(Bit::new(addr as u8)))
}
