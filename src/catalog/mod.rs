//! C1 — the CPU catalog loader.
//!
//! Loads a declarative MCS-51 CPU description from YAML (`catalogs/*.yml`),
//! resolves `inherit_from` chains with deep-merge semantics, and resolves
//! the pluggable `importing` mechanism (`spec.md` §4.1) against a
//! [`registry::Registry`] of Rust-side matcher/converter/factory functions
//! that stand in for the original's dynamic Python imports (`spec.md` §9
//! "Dynamic namespace injection").

pub mod mcs51;
pub mod registry;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AsmError, Result};
use crate::operand::Operand;
use registry::Registry;

/// One allowed operand-class tuple for a mnemonic, paired with its opcode
/// template (`spec.md` §3 "Signature").
#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<String>,
    pub opcode: Vec<ByteTemplate>,
}

/// The encoding of one output byte: a literal, a reference to a bound
/// operand slot (optionally its high/low half, for 16-bit slots split
/// across two template entries), or eight bit-format cells.
#[derive(Debug, Clone)]
pub enum ByteTemplate {
    Literal(u8),
    Slot(SlotRef),
    Bits([BitCell; 8]),
}

/// A reference to an operand slot inside a whole-byte template entry.
/// `part` selects the high or low half of a 16-bit-valued slot — the
/// mechanism `LCALL addr16` and `MOV DPTR, #addr16` use to split one
/// 16-bit operand across two opcode bytes (see `DESIGN.md`).
#[derive(Debug, Clone)]
pub struct SlotRef {
    pub name: String,
    pub part: Option<BytePart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytePart {
    Hi,
    Lo,
}

/// One bit of a bit-format byte template: either a fixed `0`/`1`, or a
/// short-code + bit-index reference into an operand slot's projected
/// integer (`spec.md` §3/§4.4, e.g. `"r2"`).
#[derive(Debug, Clone, Copy)]
pub enum BitCell {
    Literal(bool),
    Slot { short: char, bit: u8 },
}

/// Descriptor for one operand class: its single-character short code
/// (used in bit templates) and the other classes that may substitute
/// for it (`spec.md` §3).
#[derive(Debug, Clone, Default)]
pub struct OperandClassDesc {
    pub short: Option<char>,
    pub alternatives: Vec<String>,
}

/// The immutable, fully-resolved CPU description (`spec.md` §3 "CpuSpec").
pub struct CpuSpec {
    pub name: String,
    pub mnemonics: BTreeMap<String, Vec<Signature>>,
    pub signature_contents: BTreeMap<String, OperandClassDesc>,
    pub short_to_class: BTreeMap<char, String>,
    pub registers: BTreeMap<String, Operand>,
    pub sfrs: BTreeMap<String, Operand>,
    pub named_bits: BTreeMap<String, Operand>,
    pub registry: Registry,
}

impl CpuSpec {
    /// Resolves a CPU name to its bundled catalog file and loads it,
    /// following `inherit_from` chains (`examples/original_source/yay/cpu.py::get_cpu_definition`).
    pub fn load_named(name: &str) -> Result<CpuSpec> {
        let dir = catalogs_dir();
        Self::load_path(&dir.join(format!("{name}.yml")))
    }

    /// Loads a catalog from an explicit path.
    pub fn load_path(path: &Path) -> Result<CpuSpec> {
        let registry = Registry::mcs51();
        let raw = load_raw_merged(path)?;
        tracing::debug!(cpu = %raw.name, "loaded CPU catalog");
        build_spec(raw, registry)
    }
}

fn catalogs_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("catalogs")
}

/// Deep-merged, not-yet-resolved catalog document (`spec.md` §4.1).
struct RawCatalog {
    name: String,
    doc: RawDoc,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawDoc {
    inherit_from: Option<String>,
    #[serde(default)]
    importing: BTreeMap<String, String>,
    #[serde(default)]
    signature_contents: BTreeMap<String, RawOperandClass>,
    #[serde(default)]
    mnemonics: BTreeMap<String, Vec<RawSignature>>,
    #[serde(default)]
    registers: serde_yaml::Value,
    #[serde(default)]
    sfrs: serde_yaml::Value,
    #[serde(default)]
    named_bits: serde_yaml::Value,
    #[serde(default)]
    matchers: serde_yaml::Value,
    #[serde(default)]
    converters: serde_yaml::Value,
    #[serde(default)]
    macros_from: serde_yaml::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct RawOperandClass {
    short: Option<char>,
    #[serde(default)]
    alternatives: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSignature {
    signature: Vec<String>,
    opcode: Vec<RawByteTemplate>,
}

#[derive(Debug, Clone)]
struct RawByteTemplate(Vec<RawCell>);

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawCell {
    Int(i64),
    Str(String),
}

impl<'de> Deserialize<'de> for RawByteTemplate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let cells = Vec::<RawCell>::deserialize(deserializer)?;
        Ok(RawByteTemplate(cells))
    }
}

/// An `importing` entry: `{ import, from?, call?, call_many?, with_key? }`
/// (`spec.md` §4.1).
#[derive(Debug, Clone, Deserialize)]
struct ImportSpec {
    import: String,
    #[serde(default)]
    #[allow(dead_code)]
    from: Option<String>,
    #[serde(default)]
    call: Option<Vec<serde_yaml::Value>>,
    #[serde(default)]
    call_many: Option<BTreeMap<String, Vec<serde_yaml::Value>>>,
    #[serde(default)]
    with_key: bool,
}

fn load_raw_merged(path: &Path) -> Result<RawCatalog> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_owned();
    let text = std::fs::read_to_string(path)
        .map_err(|e| AsmError::Config(format!("cannot read catalog {path:?}: {e}")))?;
    let doc: RawDoc = serde_yaml::from_str(&text)
        .map_err(|e| AsmError::Config(format!("malformed catalog {path:?}: {e}")))?;

    if let Some(parent_name) = doc.inherit_from.clone() {
        let parent_path = path.with_file_name(format!("{parent_name}.yml"));
        let parent = load_raw_merged(&parent_path)?;
        let merged = merge_docs(parent.doc, doc);
        Ok(RawCatalog { name, doc: merged })
    } else {
        Ok(RawCatalog { name, doc })
    }
}

/// Deep-merge `child` over `base`: scalars overwrite, mappings merge
/// key-wise, lists replace (`spec.md` §4.1).
fn merge_docs(base: RawDoc, child: RawDoc) -> RawDoc {
    let mut signature_contents = base.signature_contents;
    signature_contents.extend(child.signature_contents);

    let mut mnemonics = base.mnemonics;
    for (name, sigs) in child.mnemonics {
        mnemonics.insert(name, sigs);
    }

    RawDoc {
        inherit_from: child.inherit_from.or(base.inherit_from),
        importing: {
            let mut m = base.importing;
            m.extend(child.importing);
            m
        },
        signature_contents,
        mnemonics,
        registers: merge_values(base.registers, child.registers),
        sfrs: merge_values(base.sfrs, child.sfrs),
        named_bits: merge_values(base.named_bits, child.named_bits),
        matchers: if child.matchers.is_null() { base.matchers } else { child.matchers },
        converters: if child.converters.is_null() { base.converters } else { child.converters },
        macros_from: if child.macros_from.is_null() { base.macros_from } else { child.macros_from },
    }
}

fn merge_values(base: serde_yaml::Value, child: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value;
    match (base, child) {
        (Value::Mapping(mut base_map), Value::Mapping(child_map)) => {
            for (k, v) in child_map {
                let merged = match base_map.remove(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => v,
                };
                base_map.insert(k, merged);
            }
            Value::Mapping(base_map)
        }
        (base, Value::Null) => base,
        (_, child) => child,
    }
}

fn build_spec(raw: RawCatalog, registry: Registry) -> Result<CpuSpec> {
    let doc = raw.doc;

    let mut short_to_class = BTreeMap::new();
    let mut signature_contents = BTreeMap::new();
    for (class_name, desc) in doc.signature_contents {
        if let Some(short) = desc.short {
            if short_to_class.insert(short, class_name.clone()).is_some() {
                return Err(AsmError::Config(format!(
                    "duplicate short code `{short}` in catalog `{}`",
                    raw.name
                )));
            }
        }
        signature_contents.insert(
            class_name,
            OperandClassDesc {
                short: desc.short,
                alternatives: desc.alternatives,
            },
        );
    }

    let mut mnemonics = BTreeMap::new();
    for (mnemonic, sigs) in doc.mnemonics {
        let mut signatures = Vec::with_capacity(sigs.len());
        for sig in sigs {
            signatures.push(Signature {
                params: sig.signature,
                opcode: sig
                    .opcode
                    .into_iter()
                    .map(|t| byte_template_from_raw(t, &short_to_class))
                    .collect::<Result<Vec<_>>>()?,
            });
        }
        mnemonics.insert(mnemonic, signatures);
    }

    let registers = resolve_value_section(doc.registers, &registry)?;
    let sfrs = resolve_value_section(doc.sfrs, &registry)?;
    let named_bits = resolve_value_section(doc.named_bits, &registry)?;

    Ok(CpuSpec {
        name: raw.name,
        mnemonics,
        signature_contents,
        short_to_class,
        registers,
        sfrs,
        named_bits,
        registry,
    })
}

fn byte_template_from_raw(
    raw: RawByteTemplate,
    short_to_class: &BTreeMap<char, String>,
) -> Result<ByteTemplate> {
    match raw.0.len() {
        1 => match &raw.0[0] {
            RawCell::Int(n) => Ok(ByteTemplate::Literal(
                u8::try_from(*n).map_err(|_| AsmError::Config(format!("byte literal {n} out of range")))?,
            )),
            RawCell::Str(s) => Ok(slot_template(s)),
        },
        8 => {
            let mut cells = [BitCell::Literal(false); 8];
            for (i, cell) in raw.0.iter().enumerate() {
                cells[i] = bit_cell_from_raw(cell, short_to_class)?;
            }
            Ok(ByteTemplate::Bits(cells))
        }
        n => Err(AsmError::Config(format!(
            "byte template length must be 1 or 8, not {n}"
        ))),
    }
}

fn slot_template(s: &str) -> ByteTemplate {
    let (name, part) = match s.split_once('.') {
        Some((n, "hi")) => (n.to_owned(), Some(BytePart::Hi)),
        Some((n, "lo")) => (n.to_owned(), Some(BytePart::Lo)),
        _ => (s.to_owned(), None),
    };
    ByteTemplate::Slot(SlotRef { name, part })
}

fn bit_cell_from_raw(cell: &RawCell, short_to_class: &BTreeMap<char, String>) -> Result<BitCell> {
    match cell {
        RawCell::Int(0) => Ok(BitCell::Literal(false)),
        RawCell::Int(1) => Ok(BitCell::Literal(true)),
        RawCell::Int(n) => Err(AsmError::Config(format!("bit cell literal must be 0 or 1, not {n}"))),
        RawCell::Str(s) => {
            if s == "0" {
                return Ok(BitCell::Literal(false));
            }
            if s == "1" {
                return Ok(BitCell::Literal(true));
            }
            let mut chars = s.chars();
            let short = chars.next().ok_or_else(|| AsmError::Config("empty bit cell".into()))?;
            let digits: String = chars.collect();
            let bit: u8 = digits
                .parse()
                .map_err(|_| AsmError::Config(format!("malformed bit cell `{s}`")))?;
            if !short_to_class.contains_key(&short) {
                return Err(AsmError::Config(format!(
                    "bit cell `{s}` references unknown short code `{short}`"
                )));
            }
            Ok(BitCell::Slot { short, bit })
        }
    }
}

fn resolve_value_section(
    value: serde_yaml::Value,
    registry: &Registry,
) -> Result<BTreeMap<String, Operand>> {
    if value.is_null() {
        return Ok(BTreeMap::new());
    }
    let spec: std::result::Result<ImportSpec, _> = serde_yaml::from_value(value.clone());
    if let Ok(spec) = spec {
        return resolve_import_spec(spec, registry);
    }

    // Not an import spec: a literal mapping of name -> already-built value is
    // not meaningful without a registry entry producing an `Operand`, so an
    // empty/absent section degrades to "no entries" rather than erroring.
    Ok(BTreeMap::new())
}

fn resolve_import_spec(spec: ImportSpec, registry: &Registry) -> Result<BTreeMap<String, Operand>> {
    let factory = registry.factory(&spec.import)?;
    let mut out = BTreeMap::new();

    if let Some(call_many) = spec.call_many {
        for (key, args) in call_many {
            let args = if spec.with_key {
                let mut a = vec![serde_yaml::Value::String(key.clone())];
                a.extend(args);
                a
            } else {
                args
            };
            let operand = factory(&args)?;
            out.insert(key, operand);
        }
    } else if let Some(args) = spec.call {
        // A single `call` on a section produces one named entry; callers
        // name it after the imported symbol, matching a plain `import`
        // with no `call_many` replacing the whole node with one value.
        out.insert(spec.import.clone(), factory(&args)?);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_simple_scalars() {
        let base = RawDoc {
            inherit_from: None,
            mnemonics: BTreeMap::from([("nop".to_owned(), vec![])]),
            ..Default::default()
        };
        let child = RawDoc {
            mnemonics: BTreeMap::from([("mov".to_owned(), vec![])]),
            ..Default::default()
        };
        let merged = merge_docs(base, child);
        assert!(merged.mnemonics.contains_key("nop"));
        assert!(merged.mnemonics.contains_key("mov"));
    }

    #[test]
    fn bit_cell_parses_short_and_digit() {
        let short_to_class = BTreeMap::from([('r', "register".to_owned())]);
        let cell = bit_cell_from_raw(&RawCell::Str("r2".to_owned()), &short_to_class).unwrap();
        assert!(matches!(cell, BitCell::Slot { short: 'r', bit: 2 }));
    }
}
