//! The Rust-side stand-in for the original's dynamic `import:` resolution
//! (`spec.md` §4.1, §9 "Dynamic namespace injection"). Python resolves
//! `{import: is_direct, from: yay.cpus.MCS_51.matchers}` via
//! `importlib.import_module`; here a [`Registry`] is a flat table of
//! named matcher/converter/factory functions that the catalog loader
//! looks symbols up in by name instead.

use std::collections::BTreeMap;

use crate::error::{AsmError, Result};
use crate::operand::Operand;

/// `is_<class>(candidate, from_alternative)` — classification predicate
/// for one operand class (`spec.md` §4.2/§4.3).
pub type MatcherFn = fn(&Operand, bool) -> bool;

/// `<to>_from_<from>(instruction, value)` — alternative-type conversion,
/// run lazily at emission time because it may need the instruction's
/// final position (`spec.md` §4.4).
pub type ConverterFn = fn(&dyn super::super::emit::ConversionContext, &Operand) -> Result<i64>;

/// Builds one `Operand` from YAML-decoded call arguments, standing in for
/// `import: make_register, call: [0, true]` (`spec.md` §4.1).
pub type OperandFactory = fn(&[serde_yaml::Value]) -> Result<Operand>;

/// A named table of matcher/converter/factory functions resolved by the
/// catalog loader's `importing` mechanism.
#[derive(Clone)]
pub struct Registry {
    matchers: BTreeMap<String, MatcherFn>,
    converters: BTreeMap<String, ConverterFn>,
    factories: BTreeMap<String, OperandFactory>,
}

impl Registry {
    /// The registry backing the `MCS_51`/`AT89S8253` catalogs.
    pub fn mcs51() -> Registry {
        super::mcs51::registry()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            matchers: BTreeMap::new(),
            converters: BTreeMap::new(),
            factories: BTreeMap::new(),
        }
    }

    pub fn matcher(&self, name: &str) -> Result<MatcherFn> {
        self.matchers
            .get(name)
            .copied()
            .ok_or_else(|| AsmError::Config(format!("no matcher registered for `is_{name}`")))
    }

    pub fn converter(&self, to: &str, from: &str) -> Result<ConverterFn> {
        let key = format!("{to}_from_{from}");
        self.converters
            .get(&key)
            .copied()
            .ok_or_else(|| AsmError::Config(format!("no converter registered for `{key}`")))
    }

    pub fn factory(&self, name: &str) -> Result<OperandFactory> {
        self.factories
            .get(name)
            .copied()
            .ok_or_else(|| AsmError::Config(format!("no factory registered for `{name}`")))
    }
}

pub struct RegistryBuilder {
    matchers: BTreeMap<String, MatcherFn>,
    converters: BTreeMap<String, ConverterFn>,
    factories: BTreeMap<String, OperandFactory>,
}

impl RegistryBuilder {
    pub fn matcher(mut self, class: &str, f: MatcherFn) -> Self {
        self.matchers.insert(class.to_owned(), f);
        self
    }

    pub fn converter(mut self, to: &str, from: &str, f: ConverterFn) -> Self {
        self.converters.insert(format!("{to}_from_{from}"), f);
        self
    }

    pub fn factory(mut self, name: &str, f: OperandFactory) -> Self {
        self.factories.insert(name.to_owned(), f);
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            matchers: self.matchers,
            converters: self.converters,
            factories: self.factories,
        }
    }
}
