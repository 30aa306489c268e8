//! Bytecode compiler for the Tarn scripting language.
//!
//! [`Compiler`] translates a parsed [`tarn_ast::Program`] into a
//! [`tarn_bytecode::Code`] artifact that a stack based virtual machine
//! can execute. Lexical scoping is resolved at compile time: every
//! name reference becomes an indexed global, local, or free variable
//! access, and closures record which enclosing slots they capture.
//!
//! The one-shot entry points are [`compile`] and [`compile_with`]. A
//! long lived [`Compiler`] supports incremental use, where successive
//! programs extend one artifact and share its globals:
//!
//! ```
//! use tarn_ast::{Expr, Program, Stmt, Var};
//! use tarn_compiler::Compiler;
//!
//! let mut compiler = Compiler::new();
//! compiler.compile(&Program::new(vec![Stmt::Var(Var {
//!     name: "x".to_string(),
//!     value: Expr::Int(42),
//!     walrus: true,
//! })]))?;
//! compiler.compile(&Program::new(vec![Stmt::Expr(Expr::Ident(
//!     tarn_ast::Ident::new("x"),
//! ))]))?;
//! # Ok::<(), tarn_compiler::CompileError>(())
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod compiler;
pub mod error;

pub use compiler::{Compiler, CompilerOptions, MAX_ARGS, PLACEHOLDER, compile, compile_with};
pub use error::{CompileError, CompileResult};
