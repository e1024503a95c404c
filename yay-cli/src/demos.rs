//! Built-in demo programs.
//!
//! The original `yay` CLI instantiated a user-supplied Python class named
//! `--main_class` out of an arbitrary `.yay` source file — dynamic loading
//! of user DSL code is explicitly out of scope here (`spec.md` §1 "the DSL
//! surface ... the CLI and file I/O around it" is listed under Non-goals).
//! This registry is the Rust stand-in: `NAME` selects one of a small set of
//! compiled-in [`Program`]-building functions instead of a dynamically
//! loaded class.

use yay::{AsmError, Call, Operand, Program, Result};

/// Looks up a demo program builder by name.
pub fn lookup(name: &str) -> Option<fn(&mut Program) -> Result<()>> {
    match name {
        "blink" => Some(blink),
        "counter" => Some(counter),
        _ => None,
    }
}

/// Every registered demo name, for `--list` and error messages.
pub const NAMES: &[&str] = &["blink", "counter"];

/// Toggles `P1.0` forever, waiting on a busy loop between edges.
fn blink(p: &mut Program) -> Result<()> {
    let p1 = p.operand("P1")?;
    let bit = match p1 {
        Operand::Sfr(sfr) => Operand::Bit(sfr.bit(0)?),
        other => return Err(AsmError::Type(format!("{other:?} has no bit 0"))),
    };
    let r7 = p.operand("R7")?;
    p.infinitely(|p| {
        p.emit("cpl", Call::Positional(std::slice::from_ref(&bit)))?;
        p.with_loop(r7.clone(), Some(Operand::Immediate(0)), |_| Ok(()))
    })
}

/// Increments `R0` forever, calling a `report` subroutine once per
/// iteration.
fn counter(p: &mut Program) -> Result<()> {
    let r0 = p.operand("R0")?;
    let report_r0 = r0.clone();
    p.define_sub("report", move |p| {
        p.emit("mov", Call::Positional(&[Operand::Accumulator, report_r0.clone()]))
    });
    p.infinitely(|p| {
        p.emit("inc", Call::Positional(std::slice::from_ref(&r0)))?;
        p.call_sub("report", "lcall")
    })
}
