//! Compilation error types.

use thiserror::Error;

use tarn_bytecode::BytecodeError;

/// Convenience alias for compilation results.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while translating a syntax tree to bytecode.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A name was referenced but never declared in any enclosing scope.
    #[error("compile error: undefined variable {0:?}")]
    UndefinedVariable(String),

    /// Assignment to a name declared with `const`.
    #[error("compile error: cannot assign to constant {0:?}")]
    CannotAssignToConstant(String),

    /// Two named functions share a name in the same scope.
    #[error("compile error: function {0:?} redefined")]
    FunctionRedefined(String),

    /// A defaulted parameter was followed by one without a default.
    #[error("compile error: invalid argument defaults for function {0:?}")]
    InvalidDefaults(String),

    /// A defaulted parameter was followed by one without a default, in
    /// a function with no name to report.
    #[error("compile error: invalid argument defaults for anonymous function")]
    InvalidAnonymousDefaults,

    /// A parameter default was not a literal value.
    #[error("compile error: unsupported default value (got {0})")]
    UnsupportedDefault(String),

    /// A function declared more parameters than a call can supply.
    #[error("compile error: function exceeded parameter limit of 255")]
    TooManyParams,

    /// A call supplied more arguments than the calling convention
    /// allows.
    #[error("compile error: max args limit of 255 exceeded (got {0})")]
    TooManyArgs(usize),

    /// A multi-variable assignment named more targets than an operand
    /// can count.
    #[error("compile error: too many variables in multi-variable assignment")]
    TooManyVariables,

    /// A from-import listed more parent modules than an operand can
    /// count.
    #[error("compile error: too many parents in from import")]
    TooManyImportParents,

    /// A string template expanded to more fragments than an operand can
    /// count.
    #[error("compile error: string template exceeded max fragment size")]
    TemplateTooLarge,

    /// A list literal held more items than an operand can count.
    #[error("compile error: list literal exceeds max size")]
    ListTooLarge,

    /// The constant pool of one code unit overflowed.
    #[error("compile error: number of constants exceeded limits")]
    TooManyConstants,

    /// A pipe expression appeared inside another pipe.
    #[error("compile error: invalid nested pipe")]
    NestedPipe,

    /// A pipe expression had fewer than two stages.
    #[error("compile error: the pipe operator requires at least two expressions")]
    PipeTooShort,

    /// An infix operator with no corresponding instruction.
    #[error("compile error: unknown operator {0:?}")]
    UnknownOperator(String),

    /// A postfix operator other than `++` or `--`.
    #[error("compile error: unknown postfix operator {0:?}")]
    UnknownPostfixOperator(String),

    /// A map literal key that is neither a string nor an identifier.
    #[error("compile error: invalid map key type: {0}")]
    InvalidMapKey(String),

    /// A method call node whose call part is not a call expression.
    #[error("compile error: invalid call expression")]
    InvalidCallExpression,

    /// `return` at the top level of a program.
    #[error("compile error: invalid return statement outside of a function")]
    ReturnOutsideFunction,

    /// `break` with no enclosing loop in the current function.
    #[error("compile error: invalid break statement outside of a loop")]
    BreakOutsideLoop,

    /// `continue` with no enclosing loop in the current function.
    #[error("compile error: invalid continue statement outside of a loop")]
    ContinueOutsideLoop,

    /// A for clause that does not form a valid loop header.
    #[error("compile error: invalid for loop")]
    InvalidForLoop,

    /// A loop body grew past the range a jump operand can span.
    #[error("compile error: loop code size exceeded limits")]
    LoopTooLarge,

    /// A forward or backward jump target outside the operand range.
    #[error("compile error: jump destination is too far away")]
    JumpTooFar,

    /// An error from the bytecode containers, such as a scope overflow.
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
}
