//! Bytecode containers for the Tarn scripting language.
//!
//! A compiled program is a [`Code`] value: an arena of [`CodeObject`]
//! units, one per function body plus one for the top level, sharing a
//! [`SymbolTable`] scope tree. Instructions are flat `u16` slots with
//! opcodes and operands interleaved; [`InstructionIter`] walks them one
//! instruction at a time.
//!
//! Programs serialize to JSON via [`Code::to_bytes`] and rebuild with
//! [`Code::from_bytes`], round tripping to a structurally equal value,
//! so compiled code can be cached or shipped between processes.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod code;
pub mod constant;
pub mod error;
pub mod function;
pub mod iter;
pub mod op;
mod store;
pub mod symbol;
pub mod symbol_table;

pub use code::{Code, CodeId, CodeObject, MAIN_NAME};
pub use constant::Constant;
pub use error::{BytecodeError, BytecodeResult};
pub use function::{Function, FunctionOpts};
pub use iter::InstructionIter;
pub use op::{BinaryOperator, CompareOperator, Opcode};
pub use symbol::{Resolution, Scope, Symbol};
pub use symbol_table::{SymbolTable, TableId};
