//! C7 — the macro & subroutine engine's CPU-provided bundle.
//!
//! The worklist-driven subroutine fixpoint and the raw `append`/`add_label`
//! suppression machinery live on [`Program`] itself (`program.rs`), since
//! they need direct access to its mutable state. What lives here is the
//! default macro bundle every `AT89S8253` program gets for free — block
//! macros are modeled as a setup step, a user-supplied closure for the body,
//! and a teardown step, the Rust equivalent of the original's
//! `@contextmanager`-based `block_macro` (`spec.md` §4.7,
//! `examples/original_source/yay/cpus/MCS_51/__init__.py::Macros`).

use crate::dispatch::Call;
use crate::error::Result;
use crate::operand::Operand;
use crate::program::Program;

impl Program {
    /// `new_label(prefix)` — declares and returns a prefix-unique label
    /// (`spec.md` §4.7).
    pub fn new_label(&mut self, prefix: &str) -> Result<String> {
        let name = self.new_label_name(prefix);
        self.add_label(name.clone())?;
        Ok(name)
    }

    /// `loop(register, n) { body }` — `MOV register, n` (if `n` given),
    /// then the loop head, the body, then `DJNZ register, head`.
    pub fn with_loop<F>(&mut self, register: Operand, n: Option<Operand>, body: F) -> Result<()>
    where
        F: FnOnce(&mut Program) -> Result<()>,
    {
        if let Some(n) = n {
            self.emit("mov", Call::Positional(&[register.clone(), n]))?;
        }
        let head = self.new_label(&format!("loop_head_{}", describe(&register)))?;
        body(self)?;
        self.emit("djnz", Call::Positional(&[register, Operand::Label(head)]))
    }

    /// `wait_on(bit)` — spins on `bit` being clear.
    pub fn wait_on(&mut self, bit: Operand) -> Result<()> {
        let label = self.new_label(&format!("wait_on_{}", describe(&bit)))?;
        self.emit("jnb", Call::Positional(&[bit, Operand::Label(label)]))
    }

    /// `infinitely { body }` — an unconditional loop back to its own start,
    /// using the short relative jump when the body is small enough to reach
    /// it and falling back to the long absolute jump otherwise (`spec.md`
    /// §4.7, `examples/original_source/yay/cpus/MCS_51/__init__.py::infinitely`).
    pub fn infinitely<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Program) -> Result<()>,
    {
        let head = self.new_label("infinite_loop")?;
        body(self)?;
        let offset = -(self.offsetof(&head)? as i64);
        if offset >= -126 {
            self.emit("sjmp", Call::Positional(&[Operand::Label(head)]))
        } else {
            self.emit("ljmp", Call::Positional(&[Operand::Label(head)]))
        }
    }

    /// `call(label)` — an unconditional long call to an arbitrary label,
    /// distinct from [`Program::call_sub`] (which targets a registered,
    /// deferred-emission subroutine).
    pub fn call(&mut self, label: impl Into<String>) -> Result<()> {
        self.emit("lcall", Call::Positional(&[Operand::Label(label.into())]))
    }

    pub fn clear_port(&mut self, port: Operand, bit_mask: Operand) -> Result<()> {
        self.emit("anl", Call::Positional(&[port, bit_mask]))
    }

    pub fn set_port(&mut self, port: Operand, bit_mask: Operand) -> Result<()> {
        self.emit("orl", Call::Positional(&[port, bit_mask]))
    }

    /// `xor(left, right)` — loads `left` into carry, then toggles it unless
    /// `right` is clear.
    pub fn xor(&mut self, left: Operand, right: Operand) -> Result<()> {
        self.emit("mov", Call::Positional(&[Operand::Carry, left]))?;
        let label = self.new_label_name("skip_toggle");
        self.emit("jnb", Call::Positional(&[right, Operand::Label(label.clone())]))?;
        self.emit("cpl", Call::Positional(&[Operand::Carry]))?;
        self.add_label(label)
    }

    pub fn lsl(&mut self) -> Result<()> {
        self.emit("clr", Call::Positional(&[Operand::Carry]))?;
        self.emit("rlc", Call::Positional(&[]))
    }

    pub fn lsr(&mut self) -> Result<()> {
        self.emit("clr", Call::Positional(&[Operand::Carry]))?;
        self.emit("rrc", Call::Positional(&[]))
    }
}

fn describe(operand: &Operand) -> String {
    match operand {
        Operand::Register(r) | Operand::IndirectRegister(r) => format!("r{}", r.number),
        Operand::Bit(b) => format!("bit{}", b.addr),
        Operand::Sfr(s) => s.name.clone(),
        other => format!("{other:?}"),
    }
}
