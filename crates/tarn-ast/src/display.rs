//! Source-like rendering of syntax tree nodes.
//!
//! The output approximates the original source text. Operator
//! expressions are parenthesized to make grouping explicit.

use std::fmt::{self, Display, Formatter};

use crate::node::*;

fn join<T: Display>(f: &mut Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        join(f, &self.statements, "\n")
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Var(s) => write!(f, "{s}"),
            Stmt::MultiVar(s) => write!(f, "{s}"),
            Stmt::Const(s) => write!(f, "{s}"),
            Stmt::Assign(s) => write!(f, "{s}"),
            Stmt::SetAttr(s) => write!(f, "{s}"),
            Stmt::Control(s) => write!(f, "{s}"),
            Stmt::For(s) => write!(f, "{s}"),
            Stmt::Import(s) => write!(f, "{s}"),
            Stmt::FromImport(s) => write!(f, "{s}"),
            Stmt::Postfix(s) => write!(f, "{s}"),
            Stmt::Block(s) => write!(f, "{s}"),
            Stmt::Expr(e) => write!(f, "{e}"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(e) => write!(f, "{e}"),
            Expr::Int(v) => write!(f, "{v}"),
            Expr::Float(v) => write!(f, "{v:?}"),
            Expr::Bool(v) => write!(f, "{v}"),
            Expr::Nil => f.write_str("nil"),
            Expr::String(e) => write!(f, "{e}"),
            Expr::List(e) => write!(f, "{e}"),
            Expr::Map(e) => write!(f, "{e}"),
            Expr::Set(e) => write!(f, "{e}"),
            Expr::Func(e) => write!(f, "{e}"),
            Expr::Call(e) => write!(f, "{e}"),
            Expr::ObjectCall(e) => write!(f, "{e}"),
            Expr::GetAttr(e) => write!(f, "{e}"),
            Expr::Index(e) => write!(f, "{e}"),
            Expr::Slice(e) => write!(f, "{e}"),
            Expr::Prefix(e) => write!(f, "{e}"),
            Expr::Infix(e) => write!(f, "{e}"),
            Expr::If(e) => write!(f, "{e}"),
            Expr::Ternary(e) => write!(f, "{e}"),
            Expr::Switch(e) => write!(f, "{e}"),
            Expr::In(e) => write!(f, "{e}"),
            Expr::Range(e) => write!(f, "{e}"),
            Expr::Pipe(e) => write!(f, "{e}"),
        }
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.walrus {
            write!(f, "{} := {}", self.name, self.value)
        } else {
            write!(f, "var {} = {}", self.name, self.value)
        }
    }
}

impl Display for MultiVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let names = self.names.join(", ");
        if self.walrus {
            write!(f, "{} := {}", names, self.value)
        } else {
            write!(f, "var {} = {}", names, self.value)
        }
    }
}

impl Display for Const {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "const {} = {}", self.name, self.value)
    }
}

impl Display for Assign {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.target {
            AssignTarget::Name(name) => f.write_str(name)?,
            AssignTarget::Index(index) => write!(f, "{index}")?,
        }
        write!(f, " {} {}", self.operator, self.value)
    }
}

impl Display for SetAttr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} = {}", self.object, self.name, self.value)
    }
}

impl Display for Control {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let keyword = match self.kind {
            ControlKind::Break => "break",
            ControlKind::Continue => "continue",
            ControlKind::Return => "return",
        };
        f.write_str(keyword)?;
        if let Some(value) = &self.value {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        join(f, &self.statements, "\n")
    }
}

impl Display for For {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_simple_loop() {
            return write!(f, "for {{ {} }}", self.consequence);
        }
        match (&self.init, &self.condition, &self.post) {
            (None, Some(condition), _) => {
                write!(f, "for {} {{ {} }}", condition, self.consequence)
            }
            (Some(init), condition, post) => {
                write!(f, "for {init}; ")?;
                if let Some(condition) = condition {
                    write!(f, "{condition}")?;
                }
                f.write_str("; ")?;
                if let Some(post) = post {
                    write!(f, "{post}")?;
                }
                write!(f, " {{ {} }}", self.consequence)
            }
            (None, None, _) => write!(f, "for {{ {} }}", self.consequence),
        }
    }
}

impl Display for Import {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "import {}", self.module)?;
        if let Some(alias) = &self.alias {
            write!(f, " as {alias}")?;
        }
        Ok(())
    }
}

impl Display for FromImport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("from ")?;
        for (i, parent) in self.parents.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(parent)?;
        }
        write!(f, " import {}", self.module)?;
        if let Some(alias) = &self.alias {
            write!(f, " as {alias}")?;
        }
        Ok(())
    }
}

impl Display for Postfix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}{})", self.name, self.operator)
    }
}

impl Display for StringLit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value)
    }
}

impl Display for List {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        join(f, &self.items, ", ")?;
        f.write_str("]")
    }
}

impl Display for MapLit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}:{value}")?;
        }
        f.write_str("}")
    }
}

impl Display for SetLit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        join(f, &self.items, ", ")?;
        f.write_str("}")
    }
}

impl Display for FuncLit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("func")?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&param.name)?;
        }
        write!(f, ") {{ {} }}", self.body)
    }
}

impl Display for Call {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        join(f, &self.arguments, ", ")?;
        f.write_str(")")
    }
}

impl Display for ObjectCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.call)
    }
}

impl Display for GetAttr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.name)
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}[{}])", self.left, self.index)
    }
}

impl Display for Slice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}[", self.left)?;
        if let Some(from) = &self.from {
            write!(f, "{from}")?;
        }
        if let Some(to) = &self.to {
            write!(f, ":{to}")?;
        }
        f.write_str("])")
    }
}

impl Display for Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}{})", self.operator, self.right)
    }
}

impl Display for Infix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.operator, self.right)
    }
}

impl Display for If {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "if {} {}", self.condition, self.consequence)?;
        if let Some(alternative) = &self.alternative {
            write!(f, " else {alternative}")?;
        }
        Ok(())
    }
}

impl Display for Ternary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({} ? {} : {})", self.condition, self.if_true, self.if_false)
    }
}

impl Display for Case {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_default {
            f.write_str("default")?;
        } else {
            f.write_str("case ")?;
            join(f, &self.expressions, ",")?;
        }
        f.write_str(":\n")?;
        if let Some(block) = &self.block {
            for (i, stmt) in block.statements.iter().enumerate() {
                if i > 0 {
                    f.write_str("\n")?;
                }
                write!(f, "\t{stmt}")?;
            }
        }
        f.write_str("\n")
    }
}

impl Display for Switch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "\nswitch {} {{\n", self.value)?;
        for choice in &self.choices {
            write!(f, "{choice}")?;
        }
        f.write_str("}\n")
    }
}

impl Display for In {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.left, self.right)
    }
}

impl Display for RangeExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "range {}", self.container)
    }
}

impl Display for Pipe {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        join(f, &self.exprs, " | ")?;
        f.write_str(")")
    }
}
