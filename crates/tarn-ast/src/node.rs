//! Statement and expression node definitions.

use crate::template::Template;

/// A parsed program: the top-level sequence of statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Statements in source order.
    pub statements: Vec<Stmt>,
}

impl Program {
    /// Creates a program from a list of statements.
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Variable declaration or single assignment, e.g. `x := 1`.
    Var(Var),
    /// Unpacking declaration, e.g. `a, b := pair`.
    MultiVar(MultiVar),
    /// Named constant declaration, e.g. `const x = 1`.
    Const(Const),
    /// Assignment to an existing variable or to an index, e.g. `x += 1`.
    Assign(Assign),
    /// Attribute assignment, e.g. `obj.field = 1`.
    SetAttr(SetAttr),
    /// A `break`, `continue`, or `return` statement.
    Control(Control),
    /// Any of the `for` loop forms.
    For(For),
    /// Module import, e.g. `import math`.
    Import(Import),
    /// Targeted import, e.g. `from lib.tools import helper as h`.
    FromImport(FromImport),
    /// Increment or decrement of a named variable, e.g. `x++`.
    Postfix(Postfix),
    /// A braced block appearing in statement position.
    Block(Block),
    /// An expression in statement position.
    Expr(Expr),
}

impl Stmt {
    /// True if this statement leaves a value on the stack when compiled.
    ///
    /// Declarations, control flow, and stores do not produce values. An
    /// expression statement does, with the exception of a named function
    /// literal, which compiles as a definition rather than a value.
    pub fn is_expression(&self) -> bool {
        match self {
            Stmt::Expr(Expr::Func(func)) => func.name.is_none(),
            Stmt::Expr(_) => true,
            _ => false,
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A variable reference.
    Ident(Ident),
    /// An integer literal.
    Int(i64),
    /// A floating point literal.
    Float(f64),
    /// A boolean literal.
    Bool(bool),
    /// The `nil` literal.
    Nil,
    /// A string literal, possibly templated.
    String(StringLit),
    /// A list literal, e.g. `[1, 2, 3]`.
    List(List),
    /// A map literal, e.g. `{one: 1}`.
    Map(MapLit),
    /// A set literal, e.g. `{1, 2}`.
    Set(SetLit),
    /// A function literal, named or anonymous.
    Func(FuncLit),
    /// A call, e.g. `f(x)`.
    Call(Call),
    /// A method call on an object, e.g. `obj.f(x)`.
    ObjectCall(ObjectCall),
    /// Attribute access, e.g. `obj.field`.
    GetAttr(GetAttr),
    /// Container indexing, e.g. `xs[0]`.
    Index(Index),
    /// Container slicing, e.g. `xs[1:3]`.
    Slice(Slice),
    /// A prefix operator expression, e.g. `!ok`.
    Prefix(Prefix),
    /// An infix operator expression, e.g. `a + b`.
    Infix(Infix),
    /// An `if` / `else` conditional.
    If(If),
    /// A ternary conditional, e.g. `ok ? a : b`.
    Ternary(Ternary),
    /// A `switch` over a value.
    Switch(Switch),
    /// A membership test, e.g. `x in xs`.
    In(In),
    /// An iteration range over a container, e.g. `range xs`.
    Range(RangeExpr),
    /// A pipeline of expressions, e.g. `x | f | g`.
    Pipe(Pipe),
}

/// A variable reference by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    /// The referenced name.
    pub name: String,
}

impl Ident {
    /// Creates an identifier node.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Declares a variable, or assigns to one when used in its `=` form.
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    /// Name being bound.
    pub name: String,
    /// Value being stored.
    pub value: Expr,
    /// True for the `:=` declaration form.
    pub walrus: bool,
}

/// Declares multiple variables from one container value.
///
/// The right hand side must unpack into exactly as many values as there
/// are names on the left.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiVar {
    /// Names being bound, in source order.
    pub names: Vec<String>,
    /// Container value to unpack.
    pub value: Expr,
    /// True for the `:=` declaration form.
    pub walrus: bool,
}

/// Declares a named constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Const {
    /// Name of the constant.
    pub name: String,
    /// The constant's value.
    pub value: Expr,
}

/// The target of an [`Assign`] statement.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    /// Assignment to a named variable.
    Name(String),
    /// Assignment to an indexed element, e.g. `xs[0] = 1`.
    Index(Index),
}

/// Assigns to an existing variable or container element.
///
/// The operator is the literal spelling from the source: `=`, `+=`,
/// `-=`, `*=`, or `/=`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    /// Where the value is stored.
    pub target: AssignTarget,
    /// Assignment operator spelling.
    pub operator: String,
    /// Value being stored.
    pub value: Expr,
}

/// Assigns a value to an object attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct SetAttr {
    /// Object whose attribute is assigned.
    pub object: Expr,
    /// Attribute name.
    pub name: String,
    /// Value being stored.
    pub value: Expr,
}

/// The kind of a [`Control`] statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Exit the nearest enclosing loop.
    Break,
    /// Jump to the next iteration of the nearest enclosing loop.
    Continue,
    /// Return from the enclosing function.
    Return,
}

/// A `break`, `continue`, or `return` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    /// Which control statement this is.
    pub kind: ControlKind,
    /// Optional value, for return statements.
    pub value: Option<Expr>,
}

/// A sequence of statements forming a lexical block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    /// Statements in source order.
    pub statements: Vec<Stmt>,
}

impl Block {
    /// Creates a block from a list of statements.
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }

    /// True if the last statement in the block is a return.
    pub fn ends_with_return(&self) -> bool {
        matches!(
            self.statements.last(),
            Some(Stmt::Control(Control { kind: ControlKind::Return, .. }))
        )
    }
}

/// A `for` loop in any of its forms.
///
/// The simple form `for { ... }` has no clauses at all. The single
/// clause form `for <clause> { ... }` carries the clause in `condition`,
/// which may be a declaration over a range, a boolean expression, or any
/// iterable expression. The full form carries all three clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct For {
    /// Statement run once before the first iteration.
    pub init: Option<Box<Stmt>>,
    /// Loop clause: a condition, an iteration source, or a declaration.
    pub condition: Option<Box<Stmt>>,
    /// Statement run after each iteration of the body.
    pub post: Option<Box<Stmt>>,
    /// The loop body.
    pub consequence: Block,
}

impl For {
    /// True for the `for { ... }` form with no clauses.
    pub fn is_simple_loop(&self) -> bool {
        self.init.is_none() && self.condition.is_none()
    }
}

/// Imports a module by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    /// Module name.
    pub module: String,
    /// Optional binding alias.
    pub alias: Option<String>,
}

/// Imports one name from a module, optionally through parent modules.
#[derive(Debug, Clone, PartialEq)]
pub struct FromImport {
    /// Parent module path components, outermost first.
    pub parents: Vec<String>,
    /// Name being imported.
    pub module: String,
    /// Optional binding alias.
    pub alias: Option<String>,
}

/// Increments or decrements a named variable.
///
/// The operator is the literal spelling `++` or `--`.
#[derive(Debug, Clone, PartialEq)]
pub struct Postfix {
    /// Variable being modified.
    pub name: String,
    /// Operator spelling.
    pub operator: String,
}

/// A string literal. Templated strings additionally carry the parsed
/// interpolation fragments and the expression for each variable
/// fragment, in order. A `None` expression compiles as an empty string.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLit {
    /// The literal string value.
    pub value: String,
    /// Interpolation fragments, when the literal is a template.
    pub template: Option<Template>,
    /// Parsed expression for each variable fragment, in order.
    pub expressions: Vec<Option<Expr>>,
}

impl StringLit {
    /// Creates a plain, untemplated string literal.
    pub fn plain(value: impl Into<String>) -> Self {
        Self { value: value.into(), template: None, expressions: Vec::new() }
    }
}

/// A list literal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct List {
    /// Element expressions in source order.
    pub items: Vec<Expr>,
}

/// A map literal. Pairs preserve source order. Keys must be string
/// literals or identifiers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapLit {
    /// Key and value pairs in source order.
    pub items: Vec<(Expr, Expr)>,
}

/// A set literal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetLit {
    /// Element expressions in source order.
    pub items: Vec<Expr>,
}

/// One function parameter, with an optional default value expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Default value, if declared.
    pub default: Option<Expr>,
}

impl Param {
    /// Creates a parameter without a default value.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), default: None }
    }

    /// Creates a parameter with a default value.
    pub fn with_default(name: impl Into<String>, default: Expr) -> Self {
        Self { name: name.into(), default: Some(default) }
    }
}

/// A function literal. A named function in statement position defines a
/// constant binding; an anonymous one is an ordinary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncLit {
    /// Function name, when present.
    pub name: Option<String>,
    /// Parameters in declaration order.
    pub params: Vec<Param>,
    /// The function body.
    pub body: Block,
}

/// A call expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// The function being called.
    pub function: Box<Expr>,
    /// Arguments in source order.
    pub arguments: Vec<Expr>,
}

/// A method call on an object, e.g. `obj.f(x)`. The `call` expression
/// must be a [`Call`] node.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCall {
    /// The receiver object.
    pub object: Box<Expr>,
    /// The call made on the object.
    pub call: Box<Expr>,
}

/// Attribute access on an object.
#[derive(Debug, Clone, PartialEq)]
pub struct GetAttr {
    /// Object whose attribute is read.
    pub object: Box<Expr>,
    /// Attribute name.
    pub name: String,
}

/// Container indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    /// The container being indexed.
    pub left: Box<Expr>,
    /// The index value.
    pub index: Box<Expr>,
}

/// Container slicing with optional bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    /// The container being sliced.
    pub left: Box<Expr>,
    /// Lower bound; defaults to zero.
    pub from: Option<Box<Expr>>,
    /// Upper bound; defaults to the container length.
    pub to: Option<Box<Expr>>,
}

/// A prefix operator expression. The operator is the literal spelling,
/// `!` or `-`.
#[derive(Debug, Clone, PartialEq)]
pub struct Prefix {
    /// Operator spelling.
    pub operator: String,
    /// The operand.
    pub right: Box<Expr>,
}

/// An infix operator expression. The operator is the literal spelling
/// from the source, e.g. `+` or `==` or `&&`.
#[derive(Debug, Clone, PartialEq)]
pub struct Infix {
    /// Left operand.
    pub left: Box<Expr>,
    /// Operator spelling.
    pub operator: String,
    /// Right operand.
    pub right: Box<Expr>,
}

/// An `if` conditional. Used in expression position, a missing or
/// unexecuted branch produces `nil`.
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    /// The condition to evaluate.
    pub condition: Box<Expr>,
    /// Block evaluated if the condition is truthy.
    pub consequence: Block,
    /// Block evaluated otherwise.
    pub alternative: Option<Block>,
}

/// A ternary conditional expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Ternary {
    /// The condition to evaluate.
    pub condition: Box<Expr>,
    /// Result when the condition is truthy.
    pub if_true: Box<Expr>,
    /// Result otherwise.
    pub if_false: Box<Expr>,
}

/// One case within a [`Switch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// True for the `default` case.
    pub is_default: bool,
    /// Expressions matched against the switch value.
    pub expressions: Vec<Expr>,
    /// Case body; an absent body produces `nil`.
    pub block: Option<Block>,
}

/// A `switch` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    /// The value being matched.
    pub value: Box<Expr>,
    /// The cases, including at most one default.
    pub choices: Vec<Case>,
}

/// A membership test.
#[derive(Debug, Clone, PartialEq)]
pub struct In {
    /// The candidate element.
    pub left: Box<Expr>,
    /// The container searched.
    pub right: Box<Expr>,
}

/// An iteration range over a container.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeExpr {
    /// The container iterated over.
    pub container: Box<Expr>,
}

/// A pipeline. Each stage is called with the previous stage's result as
/// its first argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    /// Pipeline stages in source order.
    pub exprs: Vec<Expr>,
}
