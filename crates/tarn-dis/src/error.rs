//! Disassembly error types.

use thiserror::Error;

use tarn_bytecode::BytecodeError;

/// Result type alias for disassembly operations.
pub type DisResult<T> = Result<T, DisError>;

/// Errors produced while disassembling a compiled unit.
#[derive(Debug, Error)]
pub enum DisError {
    /// An instruction referenced a local slot the unit does not have.
    #[error("local variable index out of range: {0}")]
    LocalOutOfRange(u16),

    /// An instruction referenced a global slot that does not exist.
    #[error("global variable index out of range: {0}")]
    GlobalOutOfRange(u16),

    /// An instruction referenced a constant pool entry that does not
    /// exist.
    #[error("constant index out of range: {0}")]
    ConstantOutOfRange(u16),

    /// An instruction referenced an attribute name pool entry that
    /// does not exist.
    #[error("name index out of range: {0}")]
    NameOutOfRange(u16),

    /// The instruction stream itself could not be decoded.
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
}
