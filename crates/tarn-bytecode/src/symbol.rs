//! Symbols and their resolved scope classifications.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constant::Constant;

/// The storage classification of a resolved symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// The symbol is local to a function.
    Local,
    /// The symbol belongs to the top-level scope of a program.
    Global,
    /// The symbol is owned by an enclosing parent function.
    Free,
}

impl Scope {
    /// The scope name as it appears in serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::Global => "global",
            Scope::Free => "free",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identifier declared in some scope, with its storage slot index
/// and optionally a compile time value.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    name: String,
    index: u16,
    is_constant: bool,
    value: Option<Constant>,
}

impl Symbol {
    pub(crate) fn new(name: String, index: u16, is_constant: bool, value: Option<Constant>) -> Self {
        Self { name, index, is_constant, value }
    }

    /// The symbol's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The storage slot index within the claiming scope.
    #[inline]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// True if the symbol was declared as a constant.
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.is_constant
    }

    /// The value attached to this symbol, if any.
    #[inline]
    pub fn value(&self) -> Option<&Constant> {
        self.value.as_ref()
    }

    pub(crate) fn set_constant(&mut self) {
        self.is_constant = true;
    }

    pub(crate) fn set_value(&mut self, value: Option<Constant>) {
        self.value = value;
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "symbol(name: {} index: {} constant: {})",
            self.name, self.index, self.is_constant
        )
    }
}

/// Where a symbol resides relative to the scope that looked it up.
///
/// Resolving `x` from inside `inner` here yields a resolution with
/// scope `free` and depth 1, meaning `x` is defined one function level
/// up:
///
/// ```text
/// func outer() {
///     x := 1
///     func inner() {
///         print(x)
///     }
///     return inner
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    symbol: Symbol,
    scope: Scope,
    depth: usize,
    free_index: u16,
}

impl Resolution {
    pub(crate) fn new(symbol: Symbol, scope: Scope, depth: usize, free_index: u16) -> Self {
        Self { symbol, scope, depth, free_index }
    }

    /// The resolved symbol, as seen at its defining scope.
    #[inline]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// The symbol's storage classification.
    #[inline]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// How many function boundaries lie between the lookup and the
    /// definition. Zero for direct hits and for globals.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// For free variables, the slot in the resolving function's free
    /// variable list.
    #[inline]
    pub fn free_index(&self) -> u16 {
        self.free_index
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resolution(symbol: {} scope: {} depth: {})",
            self.symbol.name(),
            self.scope,
            self.depth
        )
    }
}
