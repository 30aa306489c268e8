//! Error types for tarn-bytecode
//!
//! Covers scope resolution failures, instruction decoding failures,
//! and serialization failures.

use thiserror::Error;

use crate::op::Opcode;

/// Errors produced while building, decoding, or serializing bytecode
#[derive(Error, Debug)]
pub enum BytecodeError {
    /// A scope ran out of storage slots
    #[error("compile error: too many symbols")]
    TooManySymbols,

    /// A name was declared twice in the same scope
    #[error("compile error: variable {0:?} already exists")]
    SymbolAlreadyExists(String),

    /// A value was attached to a name not declared in the scope
    #[error("compile error: variable {0:?} not found")]
    SymbolNotFound(String),

    /// A serialized code unit referenced a scope that is not in the
    /// scope tree
    #[error("symbol table not found: {0}")]
    SymbolTableNotFound(String),

    /// A serialized code unit referenced a parent unit that did not
    /// precede it
    #[error("parent code not found: {0}")]
    ParentCodeNotFound(String),

    /// A serialized code unit referenced a function constant that does
    /// not exist
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// A function constant has no code unit claiming it
    #[error("function code not found: {0}")]
    FunctionCodeNotFound(String),

    /// A serialized constant carried an unrecognized type tag
    #[error("unknown constant type: {0}")]
    UnknownConstantType(String),

    /// A serialized program held no code units at all
    #[error("no code objects in serialized state")]
    EmptyState,

    /// An instruction stream slot held no known opcode
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u16),

    /// An instruction stream ended in the middle of an instruction
    #[error("truncated instruction: {0}")]
    TruncatedInstruction(Opcode),

    /// JSON encoding or decoding failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias for bytecode operations
pub type BytecodeResult<T> = Result<T, BytecodeError>;
