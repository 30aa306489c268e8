//! Disassembler for Tarn bytecode.
//!
//! [`disassemble`] decodes one compiled unit into [`Instruction`]
//! records, resolving operand indexes back to the things they point
//! at: constant pool values, local and global variable names,
//! attribute names, and operator spellings. [`render`] formats the
//! records as an aligned table for inspection.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;

pub use error::{DisError, DisResult};

use tarn_bytecode::{
    BinaryOperator, Code, CodeId, CodeObject, CompareOperator, Constant, InstructionIter, Opcode,
};

/// One decoded instruction and what its operands refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Slot offset of the opcode within the unit's stream.
    pub offset: usize,
    /// The decoded opcode.
    pub opcode: Opcode,
    /// The raw operand slots.
    pub operands: Vec<u16>,
    /// Human readable meaning of the operands, where one exists.
    pub annotation: Option<String>,
    /// The referenced constant, for constant loads.
    pub constant: Option<Constant>,
}

impl Instruction {
    /// The opcode's assembler name, e.g. `LOAD_CONST`.
    pub fn name(&self) -> &'static str {
        self.opcode.name()
    }
}

/// Decodes the instruction stream of one unit of a compiled program.
pub fn disassemble(code: &Code, unit: CodeId) -> DisResult<Vec<Instruction>> {
    let object = code.object(unit);
    let mut instructions = Vec::new();
    let mut iter = InstructionIter::new(object);
    loop {
        let offset = iter.offset();
        let Some(item) = iter.next() else {
            break;
        };
        let (opcode, operands) = item?;
        let mut annotation = None;
        let mut constant = None;
        match opcode {
            Opcode::LoadFast | Opcode::StoreFast => {
                annotation = Some(local_name(code, unit, operands[0])?);
            }
            Opcode::LoadGlobal | Opcode::StoreGlobal => {
                annotation = Some(global_name(code, operands[0])?);
            }
            Opcode::LoadAttr | Opcode::StoreAttr => {
                annotation = Some(attr_name(object, operands[0])?);
            }
            Opcode::BinaryOp => {
                annotation =
                    BinaryOperator::from_u16(operands[0]).map(|op| op.symbol().to_string());
            }
            Opcode::CompareOp => {
                annotation =
                    CompareOperator::from_u16(operands[0]).map(|op| op.symbol().to_string());
            }
            Opcode::LoadConst => {
                let value = object
                    .constant(operands[0] as usize)
                    .ok_or(DisError::ConstantOutOfRange(operands[0]))?;
                annotation = Some(value.to_string());
                constant = Some(value.clone());
            }
            _ => {}
        }
        instructions.push(Instruction {
            offset,
            opcode,
            operands: operands.to_vec(),
            annotation,
            constant,
        });
    }
    Ok(instructions)
}

/// Formats decoded instructions as an aligned table with one row per
/// instruction.
pub fn render(instructions: &[Instruction]) -> String {
    let header = ["OFFSET", "OPCODE", "OPERANDS", "INFO"];
    let rows: Vec<[String; 4]> = instructions
        .iter()
        .map(|instruction| {
            let operands = instruction
                .operands
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            [
                instruction.offset.to_string(),
                instruction.name().to_string(),
                operands,
                render_info(instruction),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:>off$}  {:<opc$}  {:>ops$}  {}\n",
        header[0],
        header[1],
        header[2],
        header[3],
        off = widths[0],
        opc = widths[1],
        ops = widths[2],
    ));
    for row in &rows {
        let line = format!(
            "{:>off$}  {:<opc$}  {:>ops$}  {}",
            row[0],
            row[1],
            row[2],
            row[3],
            off = widths[0],
            opc = widths[1],
            ops = widths[2],
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// The info column: a rendering of the referenced constant when there
/// is one, otherwise the annotation.
fn render_info(instruction: &Instruction) -> String {
    let Some(constant) = &instruction.constant else {
        return instruction.annotation.clone().unwrap_or_default();
    };
    match constant {
        Constant::String(value) => {
            if value.len() > 80 {
                let mut cut = 77;
                while !value.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{:?}", format!("{}...", &value[..cut]))
            } else {
                format!("{value:?}")
            }
        }
        Constant::Function(function) => {
            if function.name().is_empty() {
                "func:<anonymous>".to_string()
            } else {
                format!("func:{}", function.name())
            }
        }
        other => other.to_string(),
    }
}

fn local_name(code: &Code, unit: CodeId, index: u16) -> DisResult<String> {
    let symbol = code.local(unit, index).ok_or(DisError::LocalOutOfRange(index))?;
    Ok(symbol.name().to_string())
}

fn global_name(code: &Code, index: u16) -> DisResult<String> {
    let symbol = code.global(index).ok_or(DisError::GlobalOutOfRange(index))?;
    Ok(symbol.name().to_string())
}

fn attr_name(object: &CodeObject, index: u16) -> DisResult<String> {
    object
        .names()
        .get(index as usize)
        .cloned()
        .ok_or(DisError::NameOutOfRange(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_ast::{Block, Call, Expr, FuncLit, GetAttr, Ident, Infix, Param, Program, Stmt, Var};
    use tarn_compiler::{CompilerOptions, compile, compile_with};

    fn program(statements: Vec<Stmt>) -> Program {
        Program::new(statements)
    }

    fn int(value: i64) -> Expr {
        Expr::Int(value)
    }

    fn ident(name: &str) -> Expr {
        Expr::Ident(Ident::new(name))
    }

    fn infix(left: Expr, operator: &str, right: Expr) -> Expr {
        Expr::Infix(Infix {
            left: Box::new(left),
            operator: operator.to_string(),
            right: Box::new(right),
        })
    }

    #[test]
    fn test_annotates_globals_constants_and_operators() {
        let code = compile(&program(vec![
            Stmt::Var(Var { name: "x".to_string(), value: int(1), walrus: true }),
            Stmt::Expr(infix(ident("x"), "+", int(2))),
        ]))
        .unwrap();
        let instructions = disassemble(&code, code.root()).unwrap();
        assert_eq!(instructions.len(), 5);
        assert_eq!(
            instructions.iter().map(|i| i.offset).collect::<Vec<_>>(),
            vec![0, 2, 4, 6, 8]
        );
        assert_eq!(instructions[0].name(), "LOAD_CONST");
        assert_eq!(instructions[0].annotation.as_deref(), Some("1"));
        assert_eq!(instructions[0].constant, Some(Constant::Int(1)));
        assert_eq!(instructions[1].name(), "STORE_GLOBAL");
        assert_eq!(instructions[1].annotation.as_deref(), Some("x"));
        assert_eq!(instructions[2].name(), "LOAD_GLOBAL");
        assert_eq!(instructions[2].annotation.as_deref(), Some("x"));
        assert_eq!(instructions[4].name(), "BINARY_OP");
        assert_eq!(instructions[4].annotation.as_deref(), Some("+"));
    }

    #[test]
    fn test_annotates_locals_in_function_unit() {
        let code = compile(&program(vec![Stmt::Expr(Expr::Func(FuncLit {
            name: None,
            params: vec![Param::new("a")],
            body: Block::new(vec![Stmt::Expr(ident("a"))]),
        }))]))
        .unwrap();
        let child = code.object(code.root()).children()[0];
        let instructions = disassemble(&code, child).unwrap();
        assert_eq!(instructions[0].name(), "LOAD_FAST");
        assert_eq!(instructions[0].annotation.as_deref(), Some("a"));
        assert_eq!(instructions[1].name(), "RETURN_VALUE");
        assert_eq!(instructions[1].annotation, None);
    }

    #[test]
    fn test_annotates_comparisons() {
        let code = compile(&program(vec![Stmt::Expr(infix(int(1), "<", int(2)))])).unwrap();
        let instructions = disassemble(&code, code.root()).unwrap();
        assert_eq!(instructions[2].name(), "COMPARE_OP");
        assert_eq!(instructions[2].annotation.as_deref(), Some("<"));
    }

    #[test]
    fn test_annotates_attribute_names() {
        let options = CompilerOptions::new().with_global_names(["obj"]);
        let code = compile_with(
            &program(vec![Stmt::Expr(Expr::GetAttr(GetAttr {
                object: Box::new(ident("obj")),
                name: "field".to_string(),
            }))]),
            options,
        )
        .unwrap();
        let instructions = disassemble(&code, code.root()).unwrap();
        assert_eq!(instructions[1].name(), "LOAD_ATTR");
        assert_eq!(instructions[1].annotation.as_deref(), Some("field"));
    }

    #[test]
    fn test_renders_function_constants_by_name() {
        let code = compile(&program(vec![Stmt::Expr(Expr::Func(FuncLit {
            name: Some("f".to_string()),
            params: vec![],
            body: Block::new(vec![]),
        }))]))
        .unwrap();
        let instructions = disassemble(&code, code.root()).unwrap();
        let rendered = render(&instructions);
        assert!(rendered.contains("func:f"));

        let code = compile(&program(vec![Stmt::Expr(Expr::Call(Call {
            function: Box::new(Expr::Func(FuncLit {
                name: None,
                params: vec![],
                body: Block::new(vec![]),
            })),
            arguments: vec![],
        }))]))
        .unwrap();
        let instructions = disassemble(&code, code.root()).unwrap();
        let rendered = render(&instructions);
        assert!(rendered.contains("func:<anonymous>"));
    }

    #[test]
    fn test_render_layout() {
        let code = compile(&program(vec![Stmt::Var(Var {
            name: "x".to_string(),
            value: int(1),
            walrus: true,
        })]))
        .unwrap();
        let instructions = disassemble(&code, code.root()).unwrap();
        let rendered = render(&instructions);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), instructions.len() + 1);
        assert!(lines[0].contains("OFFSET"));
        assert!(lines[0].contains("OPCODE"));
        assert!(lines[1].contains("LOAD_CONST"));
        assert!(lines[2].contains("STORE_GLOBAL"));
        assert!(lines[2].contains("x"));
    }

    #[test]
    fn test_long_string_constants_are_truncated() {
        let mut code = Code::new();
        let root = code.root();
        let index = code.object_mut(root).add_constant(Constant::string("a".repeat(100)));
        code.object_mut(root).push_instructions(&[Opcode::LoadConst.as_u16(), index as u16]);
        let instructions = disassemble(&code, root).unwrap();
        let rendered = render(&instructions);
        assert!(rendered.contains(&format!("{}...", "a".repeat(77))));
        assert!(!rendered.contains(&"a".repeat(78)));
    }

    #[test]
    fn test_out_of_range_operands() {
        let cases: Vec<(Opcode, u16, &str)> = vec![
            (Opcode::LoadFast, 5, "local variable index out of range: 5"),
            (Opcode::LoadGlobal, 3, "global variable index out of range: 3"),
            (Opcode::LoadConst, 9, "constant index out of range: 9"),
            (Opcode::LoadAttr, 2, "name index out of range: 2"),
        ];
        for (opcode, operand, expected) in cases {
            let mut code = Code::new();
            let root = code.root();
            code.object_mut(root).push_instructions(&[opcode.as_u16(), operand]);
            let err = disassemble(&code, root).unwrap_err();
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_undecodable_stream_errors() {
        let mut code = Code::new();
        let root = code.root();
        code.object_mut(root).push_instructions(&[999]);
        let err = disassemble(&code, root).unwrap_err();
        assert_eq!(err.to_string(), "unknown opcode: 999");
    }
}
