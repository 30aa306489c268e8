//! Compiled function descriptors.

use std::fmt;

use crate::code::CodeId;
use crate::constant::Constant;

/// Fields for constructing a [`Function`].
#[derive(Debug, Clone, Default)]
pub struct FunctionOpts {
    /// Stable identifier linking the function to its code object.
    pub id: String,
    /// Function name; empty for anonymous functions.
    pub name: String,
    /// Parameter names in declaration order.
    pub parameters: Vec<String>,
    /// Default values parallel to `parameters`; nil where absent.
    pub defaults: Vec<Constant>,
    /// The function's compiled body.
    pub code: CodeId,
    /// Source text of the function body.
    pub source: String,
}

/// A compiled function: its signature plus a reference to the code
/// object holding its body.
///
/// Functions appear as constants in the code object of the scope that
/// defines them.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    id: String,
    name: String,
    parameters: Vec<String>,
    defaults: Vec<Constant>,
    code: CodeId,
    source: String,
}

impl Function {
    /// Creates a function descriptor.
    pub fn new(opts: FunctionOpts) -> Self {
        Self {
            id: opts.id,
            name: opts.name,
            parameters: opts.parameters,
            defaults: opts.defaults,
            code: opts.code,
            source: opts.source,
        }
    }

    /// The identifier linking this function to its code object.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The function's name; empty for anonymous functions.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The code object holding the function body.
    #[inline]
    pub fn code(&self) -> CodeId {
        self.code
    }

    /// Parameter names in declaration order.
    #[inline]
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Default values parallel to the parameters; nil where absent.
    #[inline]
    pub fn defaults(&self) -> &[Constant] {
        &self.defaults
    }

    /// The number of arguments that must be supplied at call time.
    pub fn required_args_count(&self) -> usize {
        self.parameters.len() - self.defaults.iter().filter(|d| !d.is_nil()).count()
    }

    /// Source text of the function body.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Points the descriptor at its compiled unit and restores the
    /// body source from that unit, when rebuilding a deserialized
    /// program.
    pub(crate) fn attach_code(&mut self, code: CodeId, source: String) {
        self.code = code;
        self.source = source;
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("func")?;
        if !self.name.is_empty() {
            write!(f, " {}", self.name)?;
        }
        f.write_str("(")?;
        for (i, name) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
            match self.defaults.get(i) {
                Some(default) if !default.is_nil() => write!(f, "={default}")?,
                _ => {}
            }
        }
        f.write_str(") {")?;
        let lines: Vec<&str> = self.source.split('\n').collect();
        if lines.len() == 1 {
            write!(f, " {} }}", lines[0])
        } else {
            for line in &lines {
                write!(f, "\n    {line}")?;
            }
            f.write_str("\n}")
        }
    }
}
