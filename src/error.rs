//! Error taxonomy for the assembler (spec §7).

use thiserror::Error;

/// Every error the assembler can raise. Fatal to the current assembly;
/// nothing here is retried.
#[derive(Debug, Error)]
pub enum AsmError {
    /// The CPU catalog was malformed or internally inconsistent.
    #[error("config error: {0}")]
    Config(String),

    /// No signature of a mnemonic matched the supplied operands.
    #[error("no signature of `{mnemonic}` matches the given operands: {operands}")]
    Signature {
        /// Mnemonic that was called.
        mnemonic: String,
        /// Debug rendering of the offending operands.
        operands: String,
    },

    /// An operand was used in a addressing mode it does not support
    /// (e.g. `at(R2)`, which cannot be used indirectly).
    #[error("register error: {0}")]
    Register(String),

    /// A value or computed offset does not fit in its target encoding.
    #[error("range error in `{mnemonic}` at position {position:?}: {message}")]
    Range {
        /// Mnemonic whose operand or offset did not fit.
        mnemonic: String,
        /// Byte position of the offending instruction, if known yet.
        position: Option<usize>,
        /// Human-readable explanation.
        message: String,
    },

    /// A label was referenced, redeclared, or a `relocate` call came too late.
    #[error("label error: {0}")]
    Label(String),

    /// An operand of the wrong kind was supplied where a specific operand
    /// class was required.
    #[error("type error: {0}")]
    Type(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AsmError>;
