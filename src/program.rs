//! C5 — the program builder, and the two-pass driver for C6.
//!
//! `Program` owns every piece of mutable assembly state (`spec.md` §5): the
//! ordered instruction list, the label table, the running position counter
//! and relocation offset, and the subroutine registry. Pass 1 is simply the
//! sequence of `emit`/`add_label` calls the caller makes (mirroring source
//! order, `examples/original_source/yay/program.py::Program.append`); pass 2
//! happens once, inside `assemble`, once every label is known.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::catalog::{ByteTemplate, CpuSpec};
use crate::dispatch::{self, Binding, Call};
use crate::emit::{self, ConversionContext};
use crate::error::{AsmError, Result};
use crate::operand::Operand;

struct Instruction {
    mnemonic: String,
    opcode: Vec<ByteTemplate>,
    bindings: Vec<Binding>,
    position: usize,
}

impl Instruction {
    fn size(&self) -> usize {
        self.opcode.len()
    }
}

type SubBody = Box<dyn Fn(&mut Program) -> Result<()>>;

/// A subroutine body registered with [`Program::define_sub`]. Emitted once,
/// after all top-level instructions, iff `called` ends up true (`spec.md`
/// §4.7).
pub struct SubDef {
    name: String,
    body: SubBody,
    called: bool,
}

/// Assembly state for one MCS-51 program (`spec.md` §3 "Program", §5).
pub struct Program {
    cpu: Rc<CpuSpec>,
    instructions: Vec<Instruction>,
    labels: BTreeMap<String, usize>,
    position: usize,
    offset: usize,
    subs: Vec<SubDef>,
    suppress_append: bool,
    assembled: Option<Vec<u8>>,
}

impl Program {
    pub fn new(cpu: CpuSpec) -> Self {
        Self {
            cpu: Rc::new(cpu),
            instructions: Vec::new(),
            labels: BTreeMap::new(),
            position: 0,
            offset: 0,
            subs: Vec::new(),
            suppress_append: false,
            assembled: None,
        }
    }

    pub fn cpu(&self) -> &CpuSpec {
        &self.cpu
    }

    /// Looks up a CPU-provided register, SFR, or named bit by name
    /// (`spec.md` §4.1 `registers`/`sfrs`/`named_bits`).
    pub fn operand(&self, name: &str) -> Result<Operand> {
        self.cpu
            .registers
            .get(name)
            .or_else(|| self.cpu.sfrs.get(name))
            .or_else(|| self.cpu.named_bits.get(name))
            .cloned()
            .ok_or_else(|| AsmError::Config(format!("CPU has no register/SFR/bit named `{name}`")))
    }

    /// Dispatches `mnemonic` against `call` and appends the matched
    /// instruction (`examples/original_source/yay/mnemonic.py::Mnemonic.__init__`).
    pub fn emit(&mut self, mnemonic: &str, call: Call) -> Result<()> {
        let cpu = Rc::clone(&self.cpu);
        let dispatched = dispatch::dispatch(&cpu, mnemonic, &call)?;
        self.append(
            mnemonic,
            dispatched.signature.opcode.clone(),
            dispatched.bindings,
        );
        Ok(())
    }

    fn append(&mut self, mnemonic: &str, opcode: Vec<ByteTemplate>, bindings: Vec<Binding>) {
        let size = opcode.len();
        if self.suppress_append {
            return;
        }
        let position = self.position;
        self.instructions.push(Instruction {
            mnemonic: mnemonic.to_owned(),
            opcode,
            bindings,
            position,
        });
        self.position += size;
    }

    /// Declares a label at the current position (`spec.md` §4.6).
    pub fn add_label(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.suppress_append {
            return Ok(());
        }
        if self.labels.contains_key(&name) {
            return Err(AsmError::Label(format!("label `{name}` is already declared")));
        }
        self.labels.insert(name, self.position);
        Ok(())
    }

    /// The byte offset at which the next instruction will be appended.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The relocation offset set by [`Program::relocate`] (`0` if unset).
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// `position - labels[label]`: how far back a label is from here
    /// (`examples/original_source/yay/program.py::Program.offsetof`).
    pub fn offsetof(&self, label: &str) -> Result<usize> {
        let target = self
            .labels
            .get(label)
            .ok_or_else(|| AsmError::Label(format!("label `{label}` is never declared")))?;
        Ok(self.position - target)
    }

    /// The first `{prefix}_{n}` not already a declared label, used by
    /// macros to avoid colliding label names across expansions
    /// (`spec.md` §4.7).
    pub fn new_label_name(&self, prefix: &str) -> String {
        for n in 0.. {
            let candidate = format!("{prefix}_{n}");
            if !self.labels.contains_key(&candidate) {
                return candidate;
            }
        }
        unreachable!()
    }

    /// Shifts the zero-pad and all subsequent label positions by `offset`
    /// (`spec.md` §4.5, supplemented by the original's
    /// `test_program_relocation`). Must be called before any instruction or
    /// label has been emitted, and never after [`Program::assemble`].
    pub fn relocate(&mut self, offset: usize) -> Result<()> {
        if self.assembled.is_some() {
            return Err(AsmError::Label("cannot relocate an already-assembled program".into()));
        }
        if !self.instructions.is_empty() || !self.labels.is_empty() {
            return Err(AsmError::Label("relocate must be called before any emission".into()));
        }
        self.position = offset;
        self.offset = offset;
        Ok(())
    }

    /// Registers a subroutine body, deferred until [`Program::assemble`]
    /// (`spec.md` §4.7). `call_sub` is the way user code invokes it.
    pub fn define_sub(&mut self, name: impl Into<String>, body: impl Fn(&mut Program) -> Result<()> + 'static) {
        self.subs.push(SubDef {
            name: name.into(),
            body: Box::new(body),
            called: false,
        });
    }

    /// Emits a call to `name`'s synthetic label and marks it as called
    /// (`examples/original_source/yay/program.py::sub.__call__`).
    pub fn call_sub(&mut self, name: &str, call_mnemonic: &str) -> Result<()> {
        let idx = self
            .subs
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| AsmError::Config(format!("no subroutine named `{name}`")))?;
        self.subs[idx].called = true;
        self.emit(call_mnemonic, Call::Positional(&[Operand::Label(name.to_owned())]))
    }

    /// Finalizes assembly: chases transitive sub calls to a fixpoint,
    /// emits the bodies of every called sub, then resolves every
    /// instruction's bytes (pass 2). One-shot — a second call is a
    /// `LabelError` (`spec.md` §5 "poisoned state").
    pub fn assemble(&mut self) -> Result<()> {
        if self.assembled.is_some() {
            return Err(AsmError::Label("program has already been assembled".into()));
        }

        self.chase_transitive_calls()?;

        let names: Vec<String> = self
            .subs
            .iter()
            .filter(|s| s.called)
            .map(|s| s.name.clone())
            .collect();
        for name in names {
            self.emit_sub_body(&name)?;
        }

        let bytes = self.resolve_bytes()?;
        self.assembled = Some(bytes);
        Ok(())
    }

    /// Worklist pass: dry-run each not-yet-called sub's body (with
    /// `append`/`add_label` suppressed) to discover calls it makes to other
    /// subs, repeating until the called set is stable
    /// (`spec.md` §4.7 "chase transitive calls").
    fn chase_transitive_calls(&mut self) -> Result<()> {
        loop {
            let uncalled: Vec<String> = self
                .subs
                .iter()
                .filter(|s| !s.called)
                .map(|s| s.name.clone())
                .collect();

            let before: Vec<bool> = self.subs.iter().map(|s| s.called).collect();

            for name in &uncalled {
                self.dry_run_sub(name)?;
            }

            let after: Vec<bool> = self.subs.iter().map(|s| s.called).collect();
            if before == after {
                return Ok(());
            }
        }
    }

    fn dry_run_sub(&mut self, name: &str) -> Result<()> {
        let idx = self.subs.iter().position(|s| s.name == name).expect("sub exists");
        tracing::trace!(sub = name, "dry-running sub body to discover transitive calls");
        self.suppress_append = true;
        let body = std::mem::replace(&mut self.subs[idx].body, Box::new(|_| Ok(())));
        let result = body(self);
        self.subs[idx].body = body;
        self.suppress_append = false;
        result
    }

    fn emit_sub_body(&mut self, name: &str) -> Result<()> {
        self.add_label(name.to_owned())?;
        let idx = self.subs.iter().position(|s| s.name == name).expect("sub exists");
        tracing::debug!(sub = name, "emitting called subroutine body");
        let body = std::mem::replace(&mut self.subs[idx].body, Box::new(|_| Ok(())));
        let result = body(self).and_then(|()| self.emit("ret", Call::Positional(&[])));
        self.subs[idx].body = body;
        result
    }

    /// Pass 2: resolve every instruction's opcode template to concrete
    /// bytes, now that every label is known.
    fn resolve_bytes(&self) -> Result<Vec<u8>> {
        tracing::debug!(count = self.instructions.len(), "resolving opcode bytes");
        let mut out = vec![0u8; self.offset];
        for instruction in &self.instructions {
            let ctx = InstructionContext {
                mnemonic: &instruction.mnemonic,
                position: instruction.position,
                size: instruction.size(),
                labels: &self.labels,
            };
            let bytes = emit::encode(&self.cpu, &instruction.mnemonic, &instruction.opcode, &instruction.bindings, &ctx)?;
            out.extend(bytes);
        }
        Ok(out)
    }

    /// The assembled byte buffer. Repeatable: calling this more than once
    /// after `assemble` returns the same bytes (`spec.md` §9 open question,
    /// resolved toward idempotence — see `DESIGN.md`).
    pub fn to_bytes(&self) -> Result<&[u8]> {
        self.assembled
            .as_deref()
            .ok_or_else(|| AsmError::Label("program has not been assembled yet".into()))
    }
}

struct InstructionContext<'a> {
    mnemonic: &'a str,
    position: usize,
    size: usize,
    labels: &'a BTreeMap<String, usize>,
}

impl ConversionContext for InstructionContext<'_> {
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
        self.mnemonic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CpuSpec;
    use crate::operand::{Byte, Register};

    fn program() -> Program {
        Program::new(CpuSpec::load_named("AT89S8253").expect("bundled catalog loads"))
    }

    #[test]
    fn relocate_before_emission_shifts_zero_pad() {
        let mut p = program();
        p.relocate(4).unwrap();
        p.emit("nop", Call::Positional(&[])).unwrap();
        p.assemble().unwrap();
        assert_eq!(p.to_bytes().unwrap().len(), 5);
        assert_eq!(&p.to_bytes().unwrap()[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn relocate_after_emission_is_label_error() {
        let mut p = program();
        p.emit("nop", Call::Positional(&[])).unwrap();
        assert!(matches!(p.relocate(4), Err(AsmError::Label(_))));
    }

    #[test]
    fn duplicate_label_is_label_error() {
        let mut p = program();
        p.add_label("here").unwrap();
        assert!(matches!(p.add_label("here"), Err(AsmError::Label(_))));
    }

    #[test]
    fn sjmp_with_forward_label_resolves_relative_offset() {
        let mut p = program();
        let r3 = Operand::Register(Register::new(3, false));
        p.emit("sjmp", Call::Positional(&[Operand::Label("end".to_owned())])).unwrap();
        p.emit("add", Call::Positional(&[r3])).unwrap();
        p.add_label("end").unwrap();
        p.assemble().unwrap();
        let bytes = p.to_bytes().unwrap();
        assert_eq!(bytes.len(), 3);
        assert_eq!(bytes[1], 1);
    }

    #[test]
    fn assemble_is_one_shot() {
        let mut p = program();
        p.emit("nop", Call::Positional(&[])).unwrap();
        p.assemble().unwrap();
        assert!(matches!(p.assemble(), Err(AsmError::Label(_))));
    }

    #[test]
    fn to_bytes_is_idempotent() {
        let mut p = program();
        p.emit("inc", Call::Positional(&[Operand::Byte(Byte::new(0x20))])).unwrap();
        p.assemble().unwrap();
        let first = p.to_bytes().unwrap().to_vec();
        let second = p.to_bytes().unwrap().to_vec();
        assert_eq!(first, second);
    }
}
