//! `yay` is an embedded assembler for the MCS-51 microcontroller family.
//!
//! A [`Program`] is built by calling [`Program::emit`] with a mnemonic and
//! its operands, declaring labels with [`Program::add_label`], and
//! optionally defining reachable-only subroutines with
//! [`Program::define_sub`]. [`Program::assemble`] runs the two-pass
//! resolution described in `spec.md` §5, and [`format`] turns the result
//! into raw bytes or an Intel-HEX listing.
//!
//! The instruction set itself is data, not code: [`CpuSpec`] loads a
//! CPU's mnemonics, registers, SFRs and named bits from a YAML catalog
//! under `catalogs/`, optionally inheriting from a base CPU (`spec.md`
//! §3, §4.1).

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod catalog;
pub mod dispatch;
pub mod emit;
pub mod error;
pub mod format;
pub mod macros;
pub mod operand;
pub mod program;

pub use catalog::CpuSpec;
pub use dispatch::Call;
pub use error::{AsmError, Result};
pub use operand::{at, Bit, Byte, NotBit, Operand, Register, Sfr};
pub use program::Program;
