//! Compile time constant values.

use std::fmt;

use crate::function::Function;

/// A value in a code object's constant pool.
///
/// Constants are produced while compiling literals and function
/// definitions and are referenced by `LOAD_CONST` operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// The nil value.
    Nil,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A string value.
    String(String),
    /// A compiled function.
    Function(Box<Function>),
}

impl Constant {
    /// Creates a string constant.
    pub fn string(value: impl Into<String>) -> Self {
        Constant::String(value.into())
    }

    /// Creates a function constant.
    pub fn function(function: Function) -> Self {
        Constant::Function(Box::new(function))
    }

    /// The constant's type name, as used in serialized form.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Constant::Nil => "nil",
            Constant::Bool(_) => "bool",
            Constant::Int(_) => "int",
            Constant::Float(_) => "float",
            Constant::String(_) => "string",
            Constant::Function(_) => "function",
        }
    }

    /// True if this is the nil constant.
    #[inline]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Constant::Nil)
    }

    /// The integer value, if this is an int constant.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// The string value, if this is a string constant.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(value) => Some(value),
            _ => None,
        }
    }

    /// The function, if this is a function constant.
    #[inline]
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Constant::Function(function) => Some(function),
            _ => None,
        }
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Constant::Bool(value)
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Constant::Int(value)
    }
}

impl From<f64> for Constant {
    fn from(value: f64) -> Self {
        Constant::Float(value)
    }
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Constant::String(value.to_string())
    }
}

impl From<String> for Constant {
    fn from(value: String) -> Self {
        Constant::String(value)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => f.write_str("nil"),
            Constant::Bool(value) => write!(f, "{value}"),
            Constant::Int(value) => write!(f, "{value}"),
            Constant::Float(value) => write!(f, "{value}"),
            Constant::String(value) => f.write_str(value),
            Constant::Function(function) => write!(f, "{function}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Constant::Nil.type_name(), "nil");
        assert_eq!(Constant::Bool(true).type_name(), "bool");
        assert_eq!(Constant::Int(3).type_name(), "int");
        assert_eq!(Constant::Float(1.5).type_name(), "float");
        assert_eq!(Constant::string("x").type_name(), "string");
    }

    #[test]
    fn test_accessors() {
        assert!(Constant::Nil.is_nil());
        assert!(!Constant::Int(0).is_nil());
        assert_eq!(Constant::Int(42).as_int(), Some(42));
        assert_eq!(Constant::string("hi").as_str(), Some("hi"));
        assert_eq!(Constant::Bool(false).as_int(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Constant::Nil.to_string(), "nil");
        assert_eq!(Constant::Int(-7).to_string(), "-7");
        assert_eq!(Constant::Float(2.5).to_string(), "2.5");
        assert_eq!(Constant::string("ok").to_string(), "ok");
    }
}
