//! Syntax tree node types for the Tarn scripting language.
//!
//! A [`Program`] is a sequence of statements as produced by a parser.
//! Statements and expressions are modeled as the [`Stmt`] and [`Expr`]
//! enums, with one struct per node kind. Every node renders back to
//! source-like text via [`std::fmt::Display`], which the compiler uses
//! when it needs the textual form of a node, such as the body source
//! attached to compiled functions.
//!
//! String literals may carry a [`template::Template`] describing their
//! `${...}` interpolation fragments.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

mod display;
pub mod node;
pub mod template;

pub use node::{
    Assign, AssignTarget, Block, Call, Case, Const, Control, ControlKind, Expr, For, FromImport,
    FuncLit, GetAttr, Ident, If, Import, In, Index, Infix, List, MapLit, MultiVar, ObjectCall,
    Param, Pipe, Postfix, Prefix, Program, RangeExpr, SetAttr, SetLit, Slice, Stmt, StringLit,
    Switch, Ternary, Var,
};
pub use template::{Fragment, Template, TemplateError};
