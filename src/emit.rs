//! C4 — the opcode emitter.
//!
//! Turns a matched [`Signature`](crate::catalog::Signature) and its operand
//! [`Binding`]s into concrete bytes: whole-byte slots are projected or
//! converted to an integer and normalized mod 256; bit-format bytes OR
//! their eight cells together (`spec.md` §4.4).

use crate::catalog::{BitCell, ByteTemplate, BytePart, CpuSpec};
use crate::dispatch::Binding;
use crate::error::{AsmError, Result};
use crate::operand::Operand;

/// What a converter needs to know about the instruction it is being
/// invoked for — the label table and the instruction's own position and
/// size, both fixed by the time pass 2 emits bytes (`spec.md` §4.4, §5).
pub trait ConversionContext {
    /// Byte offset of this instruction within the (unrelocated) program.
    fn position(&self) -> usize;
    /// Size in bytes of this instruction's opcode.
    fn size(&self) -> usize;
    /// Resolves a label to its byte offset, if declared.
    fn label_position(&self, name: &str) -> Option<usize>;
    /// Mnemonic name, for error messages.
    fn mnemonic(&self) -> &str;
}

/// Encodes one matched signature's opcode bytes.
pub fn encode(
    cpu: &CpuSpec,
    mnemonic: &str,
    opcode: &[ByteTemplate],
    bindings: &[Binding],
    ctx: &dyn ConversionContext,
) -> Result<Vec<u8>> {
    opcode
        .iter()
        .map(|template| encode_byte(cpu, mnemonic, template, bindings, ctx))
        .collect()
}

fn encode_byte(
    cpu: &CpuSpec,
    mnemonic: &str,
    template: &ByteTemplate,
    bindings: &[Binding],
    ctx: &dyn ConversionContext,
) -> Result<u8> {
    match template {
        ByteTemplate::Literal(b) => Ok(*b),
        ByteTemplate::Slot(slot) => {
            let binding = find_binding(mnemonic, bindings, &slot.name)?;
            let value = resolve(cpu, binding, ctx)?;
            let byte = match slot.part {
                None => value,
                Some(BytePart::Hi) => value >> 8,
                Some(BytePart::Lo) => value & 0xFF,
            };
            to_byte(mnemonic, ctx.position(), byte)
        }
        ByteTemplate::Bits(cells) => {
            let mut out = 0u8;
            for (i, cell) in cells.iter().enumerate() {
                let bit = match cell {
                    BitCell::Literal(b) => *b,
                    BitCell::Slot { short, bit } => {
                        let class = cpu.short_to_class.get(short).ok_or_else(|| {
                            AsmError::Config(format!("bit template references unknown short code `{short}`"))
                        })?;
                        let binding = find_binding(mnemonic, bindings, class)?;
                        let value = resolve(cpu, binding, ctx)?;
                        (value >> bit) & 1 != 0
                    }
                };
                if bit {
                    out |= 1 << (7 - i);
                }
            }
            Ok(out)
        }
    }
}

fn find_binding<'a>(mnemonic: &str, bindings: &'a [Binding], class: &str) -> Result<&'a Binding> {
    bindings
        .iter()
        .find(|b| b.class == class)
        .ok_or_else(|| AsmError::Config(format!("`{mnemonic}` opcode references unbound slot `{class}`")))
}

/// Resolves one bound operand to its raw (not yet mod-256-normalized)
/// integer value: either a direct structural projection of its class, or —
/// if it was matched through an alternative — the registered converter
/// `<class>_from_<alternative>` (`spec.md` §4.3/§4.4).
fn resolve(cpu: &CpuSpec, binding: &Binding, ctx: &dyn ConversionContext) -> Result<i64> {
    match &binding.alternative_from {
        Some(alternative) => {
            let converter = cpu.registry.converter(&binding.class, alternative)?;
            converter(ctx, &binding.operand)
        }
        None => project(&binding.class, &binding.operand),
    }
}

/// Structural integer projection for a class matched directly — the
/// Rust equivalent of `int(candidate)` on the original's operand types
/// (`examples/original_source/yay/cpus/MCS_51/__init__.py`).
pub fn project(class: &str, operand: &Operand) -> Result<i64> {
    let value = match class {
        "register" | "indirect" => operand
            .register()
            .ok_or_else(|| AsmError::Type(format!("{operand:?} is not a register")))?
            .number as i64,
        "indirect_dptr" | "accu" | "dptr" | "pc" | "dptr_offset" | "pc_offset" | "carry" => 0,
        "direct" | "direct_dest" | "direct_src" => operand
            .byte_addr()
            .ok_or_else(|| AsmError::Type(format!("{operand:?} is not direct-addressable")))? as i64,
        "bit" => operand
            .bit_addr()
            .ok_or_else(|| AsmError::Type(format!("{operand:?} is not a bit")))? as i64,
        "not_bit" => operand
            .not_bit_addr()
            .ok_or_else(|| AsmError::Type(format!("{operand:?} is not a complemented bit")))? as i64,
        "immediate" => match operand {
            Operand::Immediate(v) => *v as i64,
            _ => return Err(AsmError::Type(format!("{operand:?} is not an immediate"))),
        },
        "immediate16" => match operand {
            Operand::Immediate16(v) => *v as i64,
            _ => return Err(AsmError::Type(format!("{operand:?} is not a 16-bit immediate"))),
        },
        "addr16" => match operand {
            Operand::Addr16(v) => *v as i64,
            _ => return Err(AsmError::Type(format!("{operand:?} is not an absolute address"))),
        },
        other => {
            return Err(AsmError::Config(format!(
                "operand class `{other}` has no direct structural projection; it is only reachable through an alternative conversion"
            )))
        }
    };
    Ok(value)
}

/// Normalizes a signed value into one byte via two's-complement mod 256,
/// rejecting anything that does not fit `-128..=255` (`spec.md` §4.4,
/// §7 RangeError).
pub fn to_byte(mnemonic: &str, position: usize, value: i64) -> Result<u8> {
    if !(-128..=255).contains(&value) {
        return Err(AsmError::Range {
            mnemonic: mnemonic.to_owned(),
            position: Some(position),
            message: format!("value {value} does not fit in one byte"),
        });
    }
    Ok((value & 0xFF) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        position: usize,
        size: usize,
        labels: std::collections::BTreeMap<String, usize>,
    }

    impl ConversionContext for Fixed {
        fn position(&self) -> usize {
            self.position
        }
        fn size(&self) -> usize {
            self.size
        }
        fn label_position(&self, name: &str) -> Option<usize> {
            self.labels.get(name).copied()
        }
        fn mnemonic(&self) -> &str {
            "test"
        }
    }

    #[test]
    fn to_byte_wraps_negative_values() {
        assert_eq!(to_byte("sjmp", 0, -1).unwrap(), 0xFF);
        assert_eq!(to_byte("sjmp", 0, -128).unwrap(), 0x80);
        assert!(to_byte("sjmp", 0, 256).is_err());
        assert!(to_byte("sjmp", 0, -129).is_err());
    }

    #[test]
    fn project_register_class() {
        use crate::operand::Register;
        let r3 = Operand::Register(Register::new(3, false));
        assert_eq!(project("register", &r3).unwrap(), 3);
    }

    #[test]
    fn encode_bit_template_ors_register_slot_into_one_byte() {
        use crate::operand::Register;

        let cpu = crate::catalog::CpuSpec::load_named("AT89S8253").unwrap();
        let ctx = Fixed {
            position: 0,
            size: 1,
            labels: std::collections::BTreeMap::new(),
        };
        let bindings = vec![Binding {
            class: "register".to_owned(),
            alternative_from: None,
            operand: Operand::Register(Register::new(3, false)),
        }];
        let opcode = [
            ByteTemplate::Bits([
                BitCell::Literal(false),
                BitCell::Literal(false),
                BitCell::Literal(true),
                BitCell::Literal(false),
                BitCell::Literal(true),
                BitCell::Slot {
                    short: 'r',
                    bit: 2,
                },
                BitCell::Slot {
                    short: 'r',
                    bit: 1,
                },
                BitCell::Slot {
                    short: 'r',
                    bit: 0,
                },
            ]),
            ByteTemplate::Literal(0x2A),
        ];
        let bytes = encode(&cpu, "add", &opcode, &bindings, &ctx).unwrap();
        assert_eq!(bytes, vec![0b0010_1011, 0x2A]);
    }
}
