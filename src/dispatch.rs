//! C3 — the mnemonic dispatcher.
//!
//! Selects the first catalog signature whose operand classes match a call,
//! recording which operands were matched through an alternative type
//! (`spec.md` §4.3).

use crate::catalog::{CpuSpec, Signature};
use crate::error::{AsmError, Result};
use crate::operand::Operand;

/// One matched-and-bound operand: its class in the signature, the operand
/// value itself, and — if matched through an alternative — the class it
/// was actually supplied as.
#[derive(Debug, Clone)]
pub struct Binding {
    pub class: String,
    pub alternative_from: Option<String>,
    pub operand: Operand,
}

/// The result of a successful dispatch: the chosen signature and its
/// operand bindings, in signature order.
#[derive(Debug)]
pub struct Dispatched<'a> {
    pub signature: &'a Signature,
    pub bindings: Vec<Binding>,
}

/// Either a positional or a keyword call — mixing the two is rejected
/// (`spec.md` §4.3 step 1), matching
/// `examples/original_source/yay/mnemonic.py::Mnemonic.__init__`.
pub enum Call<'a> {
    Positional(&'a [Operand]),
    Keyword(&'a [(&'a str, Operand)]),
}

pub fn dispatch<'a>(cpu: &'a CpuSpec, mnemonic: &str, call: &Call) -> Result<Dispatched<'a>> {
    let signatures = cpu.mnemonics.get(mnemonic).ok_or_else(|| {
        AsmError::Config(format!("catalog has no mnemonic named `{mnemonic}`"))
    })?;

    for signature in signatures {
        if let Some(bindings) = try_match(cpu, signature, call)? {
            return Ok(Dispatched { signature, bindings });
        }
    }

    Err(AsmError::Signature {
        mnemonic: mnemonic.to_owned(),
        operands: describe_call(call),
    })
}

fn describe_call(call: &Call) -> String {
    match call {
        Call::Positional(ops) => format!("{ops:?}"),
        Call::Keyword(kv) => format!("{kv:?}"),
    }
}

fn try_match(cpu: &CpuSpec, signature: &Signature, call: &Call) -> Result<Option<Vec<Binding>>> {
    let ordered: Vec<Operand> = match call {
        Call::Positional(ops) => {
            if ops.len() != signature.params.len() {
                return Ok(None);
            }
            ops.to_vec()
        }
        Call::Keyword(kv) => {
            if signature.params.is_empty() {
                return Ok(None);
            }
            let mut keys: Vec<&str> = kv.iter().map(|(k, _)| *k).collect();
            let mut wanted: Vec<&str> = signature.params.iter().map(String::as_str).collect();
            keys.sort_unstable();
            wanted.sort_unstable();
            if keys != wanted {
                return Ok(None);
            }
            signature
                .params
                .iter()
                .map(|name| {
                    kv.iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v.clone())
                        .expect("checked by set-equality above")
                })
                .collect()
        }
    };

    let mut bindings = Vec::with_capacity(ordered.len());
    for (class, operand) in signature.params.iter().zip(ordered) {
        match classify(cpu, class, &operand)? {
            Some(alternative_from) => bindings.push(Binding {
                class: class.clone(),
                alternative_from,
                operand,
            }),
            None => return Ok(None),
        }
    }
    Ok(Some(bindings))
}

/// Classifies `operand` against class `name`: either it matches the class
/// directly, matches one of its declared alternatives (returned as
/// `Some(Some(alt))`), or matches nothing (`None`).
fn classify(cpu: &CpuSpec, name: &str, operand: &Operand) -> Result<Option<Option<String>>> {
    let matcher = cpu.registry.matcher(name)?;
    if matcher(operand, false) {
        return Ok(Some(None));
    }

    let desc = cpu
        .signature_contents
        .get(name)
        .ok_or_else(|| AsmError::Config(format!("unknown operand class `{name}`")))?;

    for alternative in &desc.alternatives {
        let alt_matcher = cpu.registry.matcher(alternative)?;
        if alt_matcher(operand, true) {
            return Ok(Some(Some(alternative.clone())));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CpuSpec;
    use crate::operand::{Byte, Register};

    fn cpu() -> CpuSpec {
        CpuSpec::load_named("AT89S8253").expect("bundled catalog loads")
    }

    #[test]
    fn add_dispatches_register_then_direct() {
        let cpu = cpu();
        let r3 = Operand::Register(Register::new(3, false));
        let dispatched = dispatch(&cpu, "add", &Call::Positional(&[r3])).unwrap();
        assert_eq!(dispatched.bindings[0].class, "register");

        let direct = Operand::Byte(Byte::new(42));
        let dispatched = dispatch(&cpu, "add", &Call::Positional(&[direct])).unwrap();
        assert_eq!(dispatched.bindings[0].class, "direct");
    }

    #[test]
    fn wrong_arity_is_signature_error() {
        let cpu = cpu();
        let err = dispatch(&cpu, "nop", &Call::Positional(&[Operand::Immediate(1)])).unwrap_err();
        assert!(matches!(err, AsmError::Signature { .. }));
    }
}
