//! Translation of syntax trees into bytecode.
//!
//! [`Compiler`] walks a [`Program`] and emits stack machine
//! instructions into a [`Code`] artifact. Each function literal gets
//! its own code unit nested under the unit it was defined in, and each
//! unit tracks its own scope chain through the shared symbol table.
//!
//! A compiler may be reused across calls to [`Compiler::compile`],
//! which appends to the same artifact. This is how a REPL compiles
//! lines incrementally while earlier definitions stay visible.

use rustc_hash::FxHashSet;

use tarn_ast::{
    Assign, AssignTarget, Block, Call, Case, Const, Control, ControlKind, Expr, For, FromImport,
    FuncLit, GetAttr, Ident, If, Import, In, Index, Infix, List, MapLit, MultiVar, ObjectCall,
    Pipe, Postfix, Prefix, Program, RangeExpr, SetAttr, SetLit, Slice, Stmt, StringLit, Switch,
    Ternary, Var,
};
use tarn_bytecode::{
    BinaryOperator, Code, CodeId, CompareOperator, Constant, Function, FunctionOpts, Opcode,
    Resolution, Scope, Symbol, TableId,
};

use crate::error::{CompileError, CompileResult};

/// The maximum number of arguments a call can supply, and the maximum
/// number of parameters a function can declare.
pub const MAX_ARGS: usize = 255;

/// Jump operand written at emit time and patched once the target is
/// known.
pub const PLACEHOLDER: u16 = u16::MAX;

/// Options for constructing a [`Compiler`].
#[derive(Debug, Default)]
pub struct CompilerOptions {
    global_names: Vec<String>,
    code: Option<Code>,
    filename: Option<String>,
}

impl CompilerOptions {
    /// Creates an empty set of options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares names that are defined as globals before compilation
    /// starts, such as builtin functions provided by the runtime.
    pub fn with_global_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Continues compiling into an existing artifact rather than a
    /// fresh one.
    pub fn with_code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }

    /// Records the name of the file the source was read from.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Patch bookkeeping for one loop while its body compiles.
#[derive(Debug)]
struct LoopFrame {
    /// The code unit the loop belongs to.
    code: CodeId,
    /// Positions of break jumps awaiting their target.
    break_positions: Vec<usize>,
    /// Positions of continue jumps awaiting their target.
    continue_positions: Vec<usize>,
    /// True when an iterator is live on the stack while the body runs.
    is_range_loop: bool,
}

/// Translates a syntax tree into a [`Code`] artifact.
pub struct Compiler {
    /// The artifact being built.
    code: Code,
    /// The code unit instructions are currently emitted into.
    current: CodeId,
    /// Error recorded during emission and surfaced when the compile
    /// call returns.
    failure: Option<CompileError>,
    /// Loops being compiled, innermost last.
    loops: Vec<LoopFrame>,
    /// Code units currently compiling the later stages of a pipe.
    pipe_active: FxHashSet<CodeId>,
    /// Source of function IDs, unique within one artifact.
    func_index: usize,
}

impl Compiler {
    /// Creates a compiler with default options.
    pub fn new() -> Self {
        let code = Code::new();
        let current = code.root();
        Self {
            code,
            current,
            failure: None,
            loops: Vec::new(),
            pipe_active: FxHashSet::default(),
            func_index: 0,
        }
    }

    /// Creates a compiler from the given options.
    pub fn with_options(options: CompilerOptions) -> CompileResult<Self> {
        let mut code = options.code.unwrap_or_default();
        let root = code.root();
        if let Some(filename) = options.filename {
            code.object_mut(root).set_filename(filename);
        }
        let mut global_names = options.global_names;
        global_names.sort();
        let root_table = code.symbols().root();
        for name in &global_names {
            if code.symbols().is_defined(root_table, name) {
                continue;
            }
            code.symbols_mut().insert_variable(root_table, name)?;
        }
        // Resume past IDs minted by whichever compiler produced the
        // provided artifact, so new functions get fresh IDs.
        let func_index = code
            .flatten(root)
            .into_iter()
            .filter_map(|id| code.object(id).function_id())
            .filter_map(|id| id.parse::<usize>().ok())
            .max()
            .unwrap_or(0);
        Ok(Self {
            code,
            current: root,
            failure: None,
            loops: Vec::new(),
            pipe_active: FxHashSet::default(),
            func_index,
        })
    }

    /// The compiled artifact.
    pub fn code(&self) -> &Code {
        &self.code
    }

    /// Consumes the compiler and returns the artifact.
    pub fn into_code(self) -> Code {
        self.code
    }

    /// Compiles a program into the artifact, appending to the result of
    /// any previous calls. On error the artifact is unchanged in
    /// meaning but must not be executed, and the compiler itself stays
    /// usable for further calls.
    pub fn compile(&mut self, program: &Program) -> CompileResult<&Code> {
        self.reset();
        #[cfg(feature = "compile_logging")]
        tracing::debug!(
            target: "tarn::compiler",
            statements = program.statements.len(),
            "compile starting"
        );
        let root = self.code.root();
        let source = program.to_string();
        let main = self.code.object_mut(root);
        if main.source().is_empty() {
            main.set_source(source);
        } else {
            let combined = format!("{}\n{}", main.source(), source);
            main.set_source(combined);
        }
        self.compile_program(program)?;
        if let Some(failure) = self.failure.take() {
            return Err(failure);
        }
        #[cfg(feature = "compile_logging")]
        tracing::debug!(
            target: "tarn::compiler",
            instructions = self.code.object(self.code.root()).instruction_count(),
            units = self.code.object_count(),
            "compile finished"
        );
        Ok(&self.code)
    }

    /// Clears state a failed earlier call may have left mid-structure:
    /// the emission cursor, open loop frames, and scope cursors.
    fn reset(&mut self) {
        self.failure = None;
        self.loops.clear();
        self.pipe_active.clear();
        self.current = self.code.root();
        for id in self.code.flatten(self.code.root()) {
            let scope = self.code.symbols().local_table(self.code.object(id).symbols());
            self.code.object_mut(id).set_symbols(scope);
        }
    }

    fn compile_program(&mut self, program: &Program) -> CompileResult<()> {
        let statements = &program.statements;
        if statements.is_empty() {
            self.emit(Opcode::Nil, &[]);
            return Ok(());
        }
        self.predeclare_functions(statements)?;
        self.compile_statements(statements)
    }

    /// Compiles a statement sequence so that exactly one value is left
    /// on the stack: intermediate expression values are popped, and nil
    /// is supplied when the final statement produces nothing.
    fn compile_statements(&mut self, statements: &[Stmt]) -> CompileResult<()> {
        let count = statements.len();
        for (i, statement) in statements.iter().enumerate() {
            self.compile_stmt(statement)?;
            if i < count - 1 && statement.is_expression() {
                self.emit(Opcode::PopTop, &[]);
            }
        }
        if !statements[count - 1].is_expression() {
            self.emit(Opcode::Nil, &[]);
        }
        Ok(())
    }

    /// Declares the name of every named function statement up front, so
    /// statements can call functions defined later in the same scope.
    fn predeclare_functions(&mut self, statements: &[Stmt]) -> CompileResult<()> {
        for statement in statements {
            let Stmt::Expr(Expr::Func(func)) = statement else {
                continue;
            };
            let Some(name) = &func.name else {
                continue;
            };
            let table = self.code.object(self.current).symbols();
            if self.code.symbols().is_defined(table, name) {
                return Err(CompileError::FunctionRedefined(name.clone()));
            }
            self.code.symbols_mut().insert_constant(table, name)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, statement: &Stmt) -> CompileResult<()> {
        match statement {
            Stmt::Var(node) => self.compile_var(node),
            Stmt::MultiVar(node) => self.compile_multi_var(node),
            Stmt::Const(node) => self.compile_const(node),
            Stmt::Assign(node) => self.compile_assign(node),
            Stmt::SetAttr(node) => self.compile_set_attr(node),
            Stmt::Control(node) => self.compile_control(node),
            Stmt::For(node) => self.compile_for(node),
            Stmt::Import(node) => self.compile_import(node),
            Stmt::FromImport(node) => self.compile_from_import(node),
            Stmt::Postfix(node) => self.compile_postfix(node),
            Stmt::Block(node) => self.compile_block(node),
            Stmt::Expr(node) => self.compile_expr(node),
        }
    }

    fn compile_expr(&mut self, expression: &Expr) -> CompileResult<()> {
        match expression {
            Expr::Ident(node) => self.compile_ident(node),
            Expr::Int(value) => {
                let index = self.constant(Constant::Int(*value));
                self.emit(Opcode::LoadConst, &[index]);
                Ok(())
            }
            Expr::Float(value) => {
                let index = self.constant(Constant::Float(*value));
                self.emit(Opcode::LoadConst, &[index]);
                Ok(())
            }
            Expr::Bool(value) => {
                let opcode = if *value { Opcode::True } else { Opcode::False };
                self.emit(opcode, &[]);
                Ok(())
            }
            Expr::Nil => {
                self.emit(Opcode::Nil, &[]);
                Ok(())
            }
            Expr::String(node) => self.compile_string(node),
            Expr::List(node) => self.compile_list(node),
            Expr::Map(node) => self.compile_map(node),
            Expr::Set(node) => self.compile_set(node),
            Expr::Func(node) => self.compile_func(node),
            Expr::Call(node) => self.compile_call(node),
            Expr::ObjectCall(node) => self.compile_object_call(node),
            Expr::GetAttr(node) => self.compile_get_attr(node),
            Expr::Index(node) => self.compile_index(node),
            Expr::Slice(node) => self.compile_slice(node),
            Expr::Prefix(node) => self.compile_prefix(node),
            Expr::Infix(node) => self.compile_infix(node),
            Expr::If(node) => self.compile_if(node),
            Expr::Ternary(node) => self.compile_ternary(node),
            Expr::Switch(node) => self.compile_switch(node),
            Expr::In(node) => self.compile_in(node),
            Expr::Range(node) => self.compile_range(node),
            Expr::Pipe(node) => self.compile_pipe(node),
        }
    }

    fn compile_var(&mut self, node: &Var) -> CompileResult<()> {
        self.compile_expr(&node.value)?;
        let table = self.code.object(self.current).symbols();
        let symbol = self.code.symbols_mut().insert_variable(table, &node.name)?;
        self.emit_store_declaration(&symbol);
        Ok(())
    }

    fn compile_multi_var(&mut self, node: &MultiVar) -> CompileResult<()> {
        if node.names.len() > u16::MAX as usize {
            return Err(CompileError::TooManyVariables);
        }
        self.compile_expr(&node.value)?;
        self.emit(Opcode::Unpack, &[node.names.len() as u16]);
        // The unpacked values sit on the stack in reverse order, so the
        // names are stored back to front.
        if node.walrus {
            for name in node.names.iter().rev() {
                let table = self.code.object(self.current).symbols();
                let symbol = self.code.symbols_mut().insert_variable(table, name)?;
                self.emit_store_declaration(&symbol);
            }
            return Ok(());
        }
        for name in node.names.iter().rev() {
            let resolution = self.resolve(name)?;
            self.emit_store(&resolution);
        }
        Ok(())
    }

    fn compile_const(&mut self, node: &Const) -> CompileResult<()> {
        self.compile_expr(&node.value)?;
        let table = self.code.object(self.current).symbols();
        let symbol = self.code.symbols_mut().insert_constant(table, &node.name)?;
        self.emit_store_declaration(&symbol);
        Ok(())
    }

    fn compile_assign(&mut self, node: &Assign) -> CompileResult<()> {
        let name = match &node.target {
            AssignTarget::Index(index) => return self.compile_set_item(node, index),
            AssignTarget::Name(name) => name,
        };
        let resolution = self.resolve(name)?;
        if resolution.symbol().is_constant() {
            return Err(CompileError::CannotAssignToConstant(name.clone()));
        }
        if node.operator == "=" {
            self.compile_expr(&node.value)?;
            self.emit_store(&resolution);
            return Ok(());
        }
        self.emit_load(&resolution);
        self.compile_expr(&node.value)?;
        if let Some(operator) = compound_operator(&node.operator) {
            self.emit(Opcode::BinaryOp, &[operator.as_u16()]);
        }
        self.emit_store(&resolution);
        Ok(())
    }

    /// Assignment through an index expression, e.g. `items[0] = x` or
    /// `items[0] += x`.
    fn compile_set_item(&mut self, node: &Assign, target: &Index) -> CompileResult<()> {
        if node.operator == "=" {
            self.compile_expr(&node.value)?;
            self.compile_expr(&target.left)?;
            self.compile_expr(&target.index)?;
            self.emit(Opcode::StoreSubscr, &[]);
            return Ok(());
        }
        self.compile_expr(&target.left)?;
        self.compile_expr(&target.index)?;
        self.emit(Opcode::BinarySubscr, &[]);
        self.compile_expr(&node.value)?;
        if let Some(operator) = compound_operator(&node.operator) {
            self.emit(Opcode::BinaryOp, &[operator.as_u16()]);
        }
        self.compile_expr(&target.left)?;
        self.compile_expr(&target.index)?;
        self.emit(Opcode::StoreSubscr, &[]);
        Ok(())
    }

    fn compile_set_attr(&mut self, node: &SetAttr) -> CompileResult<()> {
        self.compile_expr(&node.value)?;
        self.compile_expr(&node.object)?;
        let index = self.code.object_mut(self.current).add_name(&node.name);
        self.emit(Opcode::StoreAttr, &[index]);
        Ok(())
    }

    fn compile_control(&mut self, node: &Control) -> CompileResult<()> {
        match node.kind {
            ControlKind::Return => {
                if self.code.object(self.current).parent().is_none() {
                    return Err(CompileError::ReturnOutsideFunction);
                }
                match &node.value {
                    Some(value) => self.compile_expr(value)?,
                    None => {
                        self.emit(Opcode::Nil, &[]);
                    }
                }
                self.emit(Opcode::ReturnValue, &[]);
                Ok(())
            }
            ControlKind::Break => {
                let Some(frame) = self.current_loop() else {
                    return Err(CompileError::BreakOutsideLoop);
                };
                // Leaving a range loop discards the live iterator.
                if frame.is_range_loop {
                    self.emit(Opcode::PopTop, &[]);
                }
                let position = self.emit(Opcode::JumpForward, &[PLACEHOLDER]);
                if let Some(frame) = self.current_loop() {
                    frame.break_positions.push(position);
                }
                Ok(())
            }
            ControlKind::Continue => {
                if self.current_loop().is_none() {
                    return Err(CompileError::ContinueOutsideLoop);
                }
                let position = self.emit(Opcode::JumpForward, &[PLACEHOLDER]);
                if let Some(frame) = self.current_loop() {
                    frame.continue_positions.push(position);
                }
                Ok(())
            }
        }
    }

    fn compile_for(&mut self, node: &For) -> CompileResult<()> {
        if node.is_simple_loop() {
            return self.compile_simple_for(node);
        }
        if node.init.is_none() && node.post.is_none() {
            if let Some(clause) = &node.condition {
                return match &**clause {
                    Stmt::Var(var) => {
                        self.compile_expr(range_container(&var.value))?;
                        self.compile_range_loop(node, std::slice::from_ref(&var.name))
                    }
                    Stmt::MultiVar(multi) => {
                        if multi.names.len() != 2 {
                            return Err(CompileError::InvalidForLoop);
                        }
                        self.compile_expr(range_container(&multi.value))?;
                        self.compile_range_loop(node, &multi.names)
                    }
                    Stmt::Expr(Expr::Range(range)) => {
                        self.compile_expr(&range.container)?;
                        self.compile_range_loop(node, &[])
                    }
                    Stmt::Expr(Expr::Infix(condition)) => {
                        self.compile_condition_loop(node, condition)
                    }
                    Stmt::Expr(container) => {
                        self.compile_expr(container)?;
                        self.compile_range_loop(node, &[])
                    }
                    other => {
                        self.compile_stmt(other)?;
                        self.compile_range_loop(node, &[])
                    }
                };
            }
        }
        self.compile_full_for(node)
    }

    /// The `for { ... }` form: an unconditional loop exited only by
    /// break.
    fn compile_simple_for(&mut self, node: &For) -> CompileResult<()> {
        self.with_loop_scope(false, |c, _| {
            let start = c.current_position();
            c.compile_block(&node.consequence)?;
            c.emit(Opcode::PopTop, &[]);
            let delta = c.calculate_delta(start)?;
            let jump_back = c.emit(Opcode::JumpBackward, &[delta]);
            let exit = c.emit(Opcode::Nop, &[]);
            c.patch_loop_jumps(exit, jump_back)
        })
    }

    /// A loop over an iterator. The container value is already on the
    /// stack when this is called; `names` receives the values produced
    /// each iteration.
    fn compile_range_loop(&mut self, node: &For, names: &[String]) -> CompileResult<()> {
        self.emit(Opcode::GetIter, &[]);
        self.with_loop_scope(true, |c, scope| {
            let iter_position = c.emit(Opcode::ForIter, &[0, names.len() as u16]);
            for name in names {
                let symbol = c.code.symbols_mut().insert_variable(scope, name)?;
                if c.code.symbols().is_global(scope) {
                    c.emit(Opcode::StoreGlobal, &[symbol.index()]);
                } else {
                    c.emit(Opcode::StoreFast, &[symbol.index()]);
                }
            }
            c.compile_block(&node.consequence)?;
            c.emit(Opcode::PopTop, &[]);
            let delta = c.calculate_delta(iter_position)?;
            let jump_back = c.emit(Opcode::JumpBackward, &[delta]);
            let exit_delta = c.calculate_delta(iter_position)?;
            c.change_operand(iter_position, exit_delta);
            c.patch_loop_jumps(c.current_position(), jump_back)
        })
    }

    /// The `for <condition> { ... }` form over a boolean condition.
    fn compile_condition_loop(&mut self, node: &For, condition: &Infix) -> CompileResult<()> {
        self.with_loop_scope(false, |c, _| {
            let start = c.current_position();
            c.compile_infix(condition)?;
            let exit_jump = c.emit(Opcode::PopJumpForwardIfFalse, &[PLACEHOLDER]);
            c.compile_block(&node.consequence)?;
            c.emit(Opcode::PopTop, &[]);
            let delta = c.calculate_delta(start)?;
            let jump_back = c.emit(Opcode::JumpBackward, &[delta]);
            let exit = c.emit(Opcode::Nop, &[]);
            c.patch_loop_jumps(exit, jump_back)?;
            let delta = c.calculate_delta(exit_jump)?;
            c.change_operand(exit_jump, delta);
            Ok(())
        })
    }

    /// The three clause `for init; condition; post { ... }` form.
    fn compile_full_for(&mut self, node: &For) -> CompileResult<()> {
        self.with_loop_scope(false, |c, _| {
            if let Some(init) = &node.init {
                c.compile_stmt(init)?;
            }
            let loop_start = c.current_position();
            let mut condition_jump = None;
            if let Some(condition) = &node.condition {
                c.compile_stmt(condition)?;
                condition_jump = Some(c.emit(Opcode::PopJumpForwardIfFalse, &[PLACEHOLDER]));
            }
            c.compile_block(&node.consequence)?;
            c.emit(Opcode::PopTop, &[]);
            // Continue jumps to the post statement, not the condition.
            let continue_target = c.current_position();
            if let Some(post) = &node.post {
                c.compile_stmt(post)?;
                if post.is_expression() {
                    c.emit(Opcode::PopTop, &[]);
                }
            }
            let delta = c.calculate_delta(loop_start)?;
            c.emit(Opcode::JumpBackward, &[delta]);
            if let Some(position) = condition_jump {
                let delta = c.calculate_delta(position)?;
                c.change_operand(position, delta);
            }
            c.patch_loop_jumps(c.current_position(), continue_target)
        })
    }

    fn compile_import(&mut self, node: &Import) -> CompileResult<()> {
        let index = self.constant(Constant::from(node.module.as_str()));
        self.emit(Opcode::LoadConst, &[index]);
        self.emit(Opcode::Import, &[]);
        let name = node.alias.as_deref().unwrap_or(&node.module);
        let symbol = self.get_or_insert_constant(name)?;
        self.emit_store_declaration(&symbol);
        Ok(())
    }

    fn compile_from_import(&mut self, node: &FromImport) -> CompileResult<()> {
        if node.parents.len() > u16::MAX as usize {
            return Err(CompileError::TooManyImportParents);
        }
        for parent in &node.parents {
            let index = self.constant(Constant::from(parent.as_str()));
            self.emit(Opcode::LoadConst, &[index]);
        }
        let index = self.constant(Constant::from(node.module.as_str()));
        self.emit(Opcode::LoadConst, &[index]);
        self.emit(Opcode::FromImport, &[node.parents.len() as u16, 1]);
        let name = node.alias.as_deref().unwrap_or(&node.module);
        let symbol = self.get_or_insert_constant(name)?;
        self.emit_store_declaration(&symbol);
        Ok(())
    }

    fn compile_postfix(&mut self, node: &Postfix) -> CompileResult<()> {
        let resolution = self.resolve(&node.name)?;
        self.emit_load(&resolution);
        match node.operator.as_str() {
            "++" => {
                let index = self.constant(Constant::Int(1));
                self.emit(Opcode::LoadConst, &[index]);
            }
            "--" => {
                let index = self.constant(Constant::Int(-1));
                self.emit(Opcode::LoadConst, &[index]);
            }
            other => {
                return Err(CompileError::UnknownPostfixOperator(other.to_string()));
            }
        }
        self.emit(Opcode::BinaryOp, &[BinaryOperator::Add.as_u16()]);
        self.emit_store(&resolution);
        Ok(())
    }

    /// Compiles a braced block. The block gets its own scope; names
    /// declared inside are not visible after it.
    fn compile_block(&mut self, node: &Block) -> CompileResult<()> {
        let code = self.current;
        let saved = self.code.object(code).symbols();
        let scope = self.code.symbols_mut().new_block(saved);
        self.code.object_mut(code).set_symbols(scope);
        let result = self.compile_block_statements(&node.statements);
        self.code.object_mut(code).set_symbols(saved);
        result
    }

    fn compile_block_statements(&mut self, statements: &[Stmt]) -> CompileResult<()> {
        if statements.is_empty() {
            self.emit(Opcode::Nil, &[]);
            return Ok(());
        }
        self.predeclare_functions(statements)?;
        self.compile_statements(statements)
    }

    fn compile_ident(&mut self, node: &Ident) -> CompileResult<()> {
        let resolution = self.resolve(&node.name)?;
        self.emit_load(&resolution);
        Ok(())
    }

    fn compile_string(&mut self, node: &StringLit) -> CompileResult<()> {
        let Some(template) = &node.template else {
            let index = self.constant(Constant::from(node.value.as_str()));
            self.emit(Opcode::LoadConst, &[index]);
            return Ok(());
        };
        let fragments = &template.fragments;
        if fragments.len() > u16::MAX as usize {
            return Err(CompileError::TemplateTooLarge);
        }
        let mut expression_index = 0;
        for fragment in fragments {
            if fragment.is_variable {
                let expression = node.expressions.get(expression_index).and_then(Option::as_ref);
                expression_index += 1;
                match expression {
                    Some(expression) => self.compile_expr(expression)?,
                    None => {
                        // An empty interpolation renders as "".
                        let index = self.constant(Constant::from(""));
                        self.emit(Opcode::LoadConst, &[index]);
                    }
                }
            } else {
                let index = self.constant(Constant::from(fragment.value.as_str()));
                self.emit(Opcode::LoadConst, &[index]);
            }
        }
        self.emit(Opcode::BuildString, &[fragments.len() as u16]);
        Ok(())
    }

    fn compile_list(&mut self, node: &List) -> CompileResult<()> {
        if node.items.len() > u16::MAX as usize {
            return Err(CompileError::ListTooLarge);
        }
        for item in &node.items {
            self.compile_expr(item)?;
        }
        self.emit(Opcode::BuildList, &[node.items.len() as u16]);
        Ok(())
    }

    fn compile_map(&mut self, node: &MapLit) -> CompileResult<()> {
        for (key, value) in &node.items {
            match key {
                Expr::String(_) => self.compile_expr(key)?,
                Expr::Ident(ident) => {
                    let index = self.constant(Constant::from(ident.name.as_str()));
                    self.emit(Opcode::LoadConst, &[index]);
                }
                other => {
                    return Err(CompileError::InvalidMapKey(other.to_string()));
                }
            }
            self.compile_expr(value)?;
        }
        self.emit(Opcode::BuildMap, &[node.items.len() as u16]);
        Ok(())
    }

    fn compile_set(&mut self, node: &SetLit) -> CompileResult<()> {
        for item in &node.items {
            self.compile_expr(item)?;
        }
        self.emit(Opcode::BuildSet, &[node.items.len() as u16]);
        Ok(())
    }

    fn compile_func(&mut self, node: &FuncLit) -> CompileResult<()> {
        if node.params.len() > MAX_ARGS {
            return Err(CompileError::TooManyParams);
        }
        let function_name = node.name.clone().unwrap_or_default();

        // Once one parameter has a default, all following ones must.
        let mut defaults_started = false;
        for param in &node.params {
            if param.default.is_some() {
                defaults_started = true;
            } else if defaults_started {
                return Err(match &node.name {
                    Some(name) => CompileError::InvalidDefaults(name.clone()),
                    None => CompileError::InvalidAnonymousDefaults,
                });
            }
        }
        let mut defaults = vec![Constant::Nil; node.params.len()];
        for (i, param) in node.params.iter().enumerate() {
            let Some(default) = &param.default else {
                continue;
            };
            defaults[i] = match default {
                Expr::Int(value) => Constant::Int(*value),
                Expr::Float(value) => Constant::Float(*value),
                Expr::Bool(value) => Constant::Bool(*value),
                Expr::String(lit) => Constant::from(lit.value.as_str()),
                Expr::Nil => Constant::Nil,
                other => {
                    return Err(CompileError::UnsupportedDefault(other.to_string()));
                }
            };
        }

        self.func_index += 1;
        let function_id = self.func_index.to_string();
        let body_source = node.body.to_string();
        let parent = self.current;
        let child = self
            .code
            .new_child(parent, &function_name, body_source.clone(), function_id.clone());
        self.code.object_mut(child).set_defaults(defaults.clone());
        self.current = child;

        let table = self.code.object(child).symbols();
        for param in &node.params {
            self.code.symbols_mut().insert_variable(table, &param.name)?;
        }
        if self.code.object(child).is_named() {
            self.code.symbols_mut().insert_constant(table, &function_name)?;
        }
        self.compile_block(&node.body)?;
        if !node.body.ends_with_return() {
            self.emit(Opcode::ReturnValue, &[]);
        }
        self.current = parent;

        #[cfg(feature = "compile_logging")]
        tracing::debug!(
            target: "tarn::compiler",
            name = function_name.as_str(),
            id = function_id.as_str(),
            "function compiled"
        );

        let parameters = node.params.iter().map(|param| param.name.clone()).collect();
        let function = Function::new(FunctionOpts {
            id: function_id,
            name: function_name.clone(),
            parameters,
            defaults,
            code: child,
            source: body_source,
        });

        let child_table = self.code.object(child).symbols();
        let free_count = self.code.symbols().free_count(child_table);
        if free_count > 0 {
            // Captured variables become cells so the closure shares
            // them with the defining frame.
            for i in 0..free_count {
                let Some(resolution) = self.code.symbols().free(child_table, i) else {
                    continue;
                };
                let index = resolution.symbol().index();
                let depth = (resolution.depth() - 1) as u16;
                self.emit(Opcode::MakeCell, &[index, depth]);
            }
            let constant = self.constant(Constant::function(function));
            self.emit(Opcode::LoadClosure, &[constant, free_count]);
        } else {
            let constant = self.constant(Constant::function(function));
            self.emit(Opcode::LoadConst, &[constant]);
        }

        if self.code.object(child).is_named() {
            let symbol = self.get_or_insert_constant(&function_name)?;
            self.emit_store_declaration(&symbol);
        }
        Ok(())
    }

    fn compile_call(&mut self, node: &Call) -> CompileResult<()> {
        let argc = node.arguments.len();
        if argc > MAX_ARGS {
            return Err(CompileError::TooManyArgs(argc));
        }
        self.compile_expr(&node.function)?;
        for argument in &node.arguments {
            self.compile_expr(argument)?;
        }
        if self.pipe_active.contains(&self.current) {
            self.emit(Opcode::Partial, &[argc as u16]);
        } else {
            self.emit(Opcode::Call, &[argc as u16]);
        }
        Ok(())
    }

    fn compile_object_call(&mut self, node: &ObjectCall) -> CompileResult<()> {
        self.compile_expr(&node.object)?;
        let Expr::Call(method) = &*node.call else {
            return Err(CompileError::InvalidCallExpression);
        };
        let name = method.function.to_string();
        let index = self.code.object_mut(self.current).add_name(&name);
        self.emit(Opcode::LoadAttr, &[index]);
        let argc = method.arguments.len();
        if argc > MAX_ARGS {
            return Err(CompileError::TooManyArgs(argc));
        }
        for argument in &method.arguments {
            self.compile_expr(argument)?;
        }
        if self.pipe_active.contains(&self.current) {
            self.emit(Opcode::Partial, &[argc as u16]);
        } else {
            self.emit(Opcode::Call, &[argc as u16]);
        }
        Ok(())
    }

    fn compile_get_attr(&mut self, node: &GetAttr) -> CompileResult<()> {
        self.compile_expr(&node.object)?;
        let index = self.code.object_mut(self.current).add_name(&node.name);
        self.emit(Opcode::LoadAttr, &[index]);
        Ok(())
    }

    fn compile_index(&mut self, node: &Index) -> CompileResult<()> {
        self.compile_expr(&node.left)?;
        self.compile_expr(&node.index)?;
        self.emit(Opcode::BinarySubscr, &[]);
        Ok(())
    }

    fn compile_slice(&mut self, node: &Slice) -> CompileResult<()> {
        self.compile_expr(&node.left)?;
        // An omitted upper bound means the container's length.
        match &node.to {
            Some(to) => self.compile_expr(to)?,
            None => {
                self.emit(Opcode::Copy, &[0]);
                self.emit(Opcode::Length, &[]);
            }
        }
        match &node.from {
            Some(from) => self.compile_expr(from)?,
            None => {
                let index = self.constant(Constant::Int(0));
                self.emit(Opcode::LoadConst, &[index]);
            }
        }
        self.emit(Opcode::Slice, &[]);
        Ok(())
    }

    fn compile_prefix(&mut self, node: &Prefix) -> CompileResult<()> {
        self.compile_expr(&node.right)?;
        match node.operator.as_str() {
            "!" => {
                self.emit(Opcode::UnaryNot, &[]);
            }
            "-" => {
                self.emit(Opcode::UnaryNegative, &[]);
            }
            _ => {}
        }
        Ok(())
    }

    fn compile_infix(&mut self, node: &Infix) -> CompileResult<()> {
        match node.operator.as_str() {
            "&&" => return self.compile_and(node),
            "||" => return self.compile_or(node),
            _ => {}
        }
        self.compile_expr(&node.left)?;
        self.compile_expr(&node.right)?;
        match node.operator.as_str() {
            "+" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::Add.as_u16()]);
            }
            "-" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::Subtract.as_u16()]);
            }
            "*" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::Multiply.as_u16()]);
            }
            "/" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::Divide.as_u16()]);
            }
            "%" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::Modulo.as_u16()]);
            }
            "**" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::Power.as_u16()]);
            }
            "<<" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::LShift.as_u16()]);
            }
            ">>" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::RShift.as_u16()]);
            }
            "&" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::BitwiseAnd.as_u16()]);
            }
            "|" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::BitwiseOr.as_u16()]);
            }
            "^" => {
                self.emit(Opcode::BinaryOp, &[BinaryOperator::Xor.as_u16()]);
            }
            ">" => {
                self.emit(Opcode::CompareOp, &[CompareOperator::GreaterThan.as_u16()]);
            }
            ">=" => {
                self.emit(Opcode::CompareOp, &[CompareOperator::GreaterThanOrEqual.as_u16()]);
            }
            "<" => {
                self.emit(Opcode::CompareOp, &[CompareOperator::LessThan.as_u16()]);
            }
            "<=" => {
                self.emit(Opcode::CompareOp, &[CompareOperator::LessThanOrEqual.as_u16()]);
            }
            "==" => {
                self.emit(Opcode::CompareOp, &[CompareOperator::Equal.as_u16()]);
            }
            "!=" => {
                self.emit(Opcode::CompareOp, &[CompareOperator::NotEqual.as_u16()]);
            }
            other => {
                return Err(CompileError::UnknownOperator(other.to_string()));
            }
        }
        Ok(())
    }

    /// Short circuiting `&&`: the right side is skipped when the left
    /// side is falsy.
    fn compile_and(&mut self, node: &Infix) -> CompileResult<()> {
        self.compile_expr(&node.left)?;
        self.emit(Opcode::Copy, &[0]);
        let jump = self.emit(Opcode::PopJumpForwardIfFalse, &[PLACEHOLDER]);
        self.compile_expr(&node.right)?;
        self.emit(Opcode::BinaryOp, &[BinaryOperator::And.as_u16()]);
        self.emit(Opcode::Nop, &[]);
        let delta = self.calculate_delta(jump)?;
        self.change_operand(jump, delta);
        Ok(())
    }

    /// Short circuiting `||`: the right side is skipped when the left
    /// side is truthy.
    fn compile_or(&mut self, node: &Infix) -> CompileResult<()> {
        self.compile_expr(&node.left)?;
        self.emit(Opcode::Copy, &[0]);
        let jump = self.emit(Opcode::PopJumpForwardIfTrue, &[PLACEHOLDER]);
        self.compile_expr(&node.right)?;
        self.emit(Opcode::BinaryOp, &[BinaryOperator::Or.as_u16()]);
        self.emit(Opcode::Nop, &[]);
        let delta = self.calculate_delta(jump)?;
        self.change_operand(jump, delta);
        Ok(())
    }

    fn compile_if(&mut self, node: &If) -> CompileResult<()> {
        self.compile_expr(&node.condition)?;
        let jump_if_false = self.emit(Opcode::PopJumpForwardIfFalse, &[PLACEHOLDER]);
        self.compile_block(&node.consequence)?;
        let jump_end = self.emit(Opcode::JumpForward, &[PLACEHOLDER]);
        let delta = self.calculate_delta(jump_if_false)?;
        self.change_operand(jump_if_false, delta);
        match &node.alternative {
            Some(alternative) => self.compile_block(alternative)?,
            None => {
                // With no else branch the conditional evaluates to nil.
                self.emit(Opcode::Nil, &[]);
            }
        }
        let delta = self.calculate_delta(jump_end)?;
        self.change_operand(jump_end, delta);
        Ok(())
    }

    fn compile_ternary(&mut self, node: &Ternary) -> CompileResult<()> {
        self.compile_expr(&node.condition)?;
        let jump_if_false = self.emit(Opcode::PopJumpForwardIfFalse, &[PLACEHOLDER]);
        self.compile_expr(&node.if_true)?;
        let jump_end = self.emit(Opcode::JumpForward, &[PLACEHOLDER]);
        let delta = self.calculate_delta(jump_if_false)?;
        self.change_operand(jump_if_false, delta);
        self.compile_expr(&node.if_false)?;
        let delta = self.calculate_delta(jump_end)?;
        self.change_operand(jump_end, delta);
        Ok(())
    }

    fn compile_switch(&mut self, node: &Switch) -> CompileResult<()> {
        self.compile_expr(&node.value)?;
        // One equality test and conditional jump per case expression.
        let mut case_jumps = Vec::new();
        let mut default_index = None;
        for (i, choice) in node.choices.iter().enumerate() {
            if choice.is_default {
                default_index = Some(i);
                continue;
            }
            for expression in &choice.expressions {
                self.emit(Opcode::Copy, &[0]);
                self.compile_expr(expression)?;
                self.emit(Opcode::CompareOp, &[CompareOperator::Equal.as_u16()]);
                case_jumps.push(self.emit(Opcode::PopJumpForwardIfTrue, &[PLACEHOLDER]));
            }
        }
        let default_jump = self.emit(Opcode::JumpForward, &[PLACEHOLDER]);

        let mut offset = 0;
        let mut end_jumps = Vec::new();
        for (i, choice) in node.choices.iter().enumerate() {
            if default_index == Some(i) {
                continue;
            }
            for _ in &choice.expressions {
                let delta = self.calculate_delta(case_jumps[offset])?;
                self.change_operand(case_jumps[offset], delta);
                offset += 1;
            }
            match &choice.block {
                Some(block) => self.compile_block(block)?,
                None => {
                    self.emit(Opcode::Nil, &[]);
                }
            }
            end_jumps.push(self.emit(Opcode::JumpForward, &[PLACEHOLDER]));
        }

        let delta = self.calculate_delta(default_jump)?;
        self.change_operand(default_jump, delta);
        match default_index.map(|i| &node.choices[i]) {
            Some(Case { block: Some(block), .. }) => self.compile_block(block)?,
            _ => {
                self.emit(Opcode::Nil, &[]);
            }
        }
        for position in end_jumps {
            let delta = self.calculate_delta(position)?;
            self.change_operand(position, delta);
        }
        // Drop the switch value, keeping the selected case value.
        self.emit(Opcode::Swap, &[1]);
        self.emit(Opcode::PopTop, &[]);
        Ok(())
    }

    fn compile_in(&mut self, node: &In) -> CompileResult<()> {
        self.compile_expr(&node.right)?;
        self.compile_expr(&node.left)?;
        self.emit(Opcode::ContainsOp, &[0]);
        Ok(())
    }

    fn compile_range(&mut self, node: &RangeExpr) -> CompileResult<()> {
        self.compile_expr(&node.container)?;
        self.emit(Opcode::Range, &[]);
        Ok(())
    }

    fn compile_pipe(&mut self, node: &Pipe) -> CompileResult<()> {
        if self.pipe_active.contains(&self.current) {
            return Err(CompileError::NestedPipe);
        }
        if node.exprs.len() < 2 {
            return Err(CompileError::PipeTooShort);
        }
        self.compile_expr(&node.exprs[0])?;
        let code = self.current;
        self.pipe_active.insert(code);
        let result = self.compile_pipe_stages(&node.exprs[1..]);
        self.pipe_active.remove(&code);
        result
    }

    /// Each stage evaluates to a callable, which is called with the
    /// previous stage's value as its sole argument. Calls written in a
    /// stage compile as partial applications instead.
    fn compile_pipe_stages(&mut self, stages: &[Expr]) -> CompileResult<()> {
        for stage in stages {
            self.compile_expr(stage)?;
            self.emit(Opcode::Swap, &[1]);
            self.emit(Opcode::Call, &[1]);
        }
        Ok(())
    }

    fn resolve(&mut self, name: &str) -> CompileResult<Resolution> {
        let table = self.code.object(self.current).symbols();
        self.code
            .symbols_mut()
            .resolve(table, name)
            .ok_or_else(|| CompileError::UndefinedVariable(name.to_string()))
    }

    /// Reuses an existing binding for the name, or declares a new
    /// constant one.
    fn get_or_insert_constant(&mut self, name: &str) -> CompileResult<Symbol> {
        let table = self.code.object(self.current).symbols();
        if let Some(symbol) = self.code.symbols().get(table, name) {
            return Ok(symbol.clone());
        }
        Ok(self.code.symbols_mut().insert_constant(table, name)?)
    }

    fn emit_load(&mut self, resolution: &Resolution) {
        match resolution.scope() {
            Scope::Global => self.emit(Opcode::LoadGlobal, &[resolution.symbol().index()]),
            Scope::Local => self.emit(Opcode::LoadFast, &[resolution.symbol().index()]),
            Scope::Free => self.emit(Opcode::LoadFree, &[resolution.free_index()]),
        };
    }

    fn emit_store(&mut self, resolution: &Resolution) {
        match resolution.scope() {
            Scope::Global => self.emit(Opcode::StoreGlobal, &[resolution.symbol().index()]),
            Scope::Local => self.emit(Opcode::StoreFast, &[resolution.symbol().index()]),
            Scope::Free => self.emit(Opcode::StoreFree, &[resolution.free_index()]),
        };
    }

    /// Stores the value on top of the stack into a binding declared in
    /// the current unit: a global at the top level, a local otherwise.
    fn emit_store_declaration(&mut self, symbol: &Symbol) {
        if self.code.object(self.current).parent().is_none() {
            self.emit(Opcode::StoreGlobal, &[symbol.index()]);
        } else {
            self.emit(Opcode::StoreFast, &[symbol.index()]);
        }
    }

    /// Runs `body` with a fresh block scope and a loop frame in place,
    /// restoring both afterwards.
    fn with_loop_scope<F>(&mut self, is_range_loop: bool, body: F) -> CompileResult<()>
    where
        F: FnOnce(&mut Self, TableId) -> CompileResult<()>,
    {
        let code = self.current;
        let saved = self.code.object(code).symbols();
        let scope = self.code.symbols_mut().new_block(saved);
        self.code.object_mut(code).set_symbols(scope);
        self.loops.push(LoopFrame {
            code,
            break_positions: Vec::new(),
            continue_positions: Vec::new(),
            is_range_loop,
        });
        let result = body(self, scope);
        self.loops.pop();
        self.code.object_mut(code).set_symbols(saved);
        result
    }

    /// The loop that break and continue target: the innermost frame,
    /// and only if it belongs to the unit being compiled. Loops in an
    /// enclosing function are not visible from a nested function body.
    fn current_loop(&mut self) -> Option<&mut LoopFrame> {
        let current = self.current;
        self.loops.last_mut().filter(|frame| frame.code == current)
    }

    /// Patches the recorded break and continue jumps of the current
    /// loop to their final forward targets.
    fn patch_loop_jumps(&mut self, break_target: usize, continue_target: usize) -> CompileResult<()> {
        let Some(frame) = self.current_loop() else {
            return Ok(());
        };
        let breaks = std::mem::take(&mut frame.break_positions);
        let continues = std::mem::take(&mut frame.continue_positions);
        for position in breaks {
            let delta = break_target - position;
            if delta > u16::MAX as usize {
                return Err(CompileError::LoopTooLarge);
            }
            self.change_operand(position, delta as u16);
        }
        for position in continues {
            let delta = continue_target - position;
            if delta > u16::MAX as usize {
                return Err(CompileError::LoopTooLarge);
            }
            self.change_operand(position, delta as u16);
        }
        Ok(())
    }

    /// Interns a constant in the current unit's pool and returns its
    /// index. Pool overflow is recorded as a deferred failure so that
    /// emission can continue.
    fn constant(&mut self, value: Constant) -> u16 {
        let object = self.code.object_mut(self.current);
        if object.constant_count() >= u16::MAX as usize {
            self.failure = Some(CompileError::TooManyConstants);
            return 0;
        }
        object.add_constant(value) as u16
    }

    /// Appends one instruction and returns its position.
    ///
    /// Panics if the operand count does not match the opcode's arity,
    /// which indicates a bug in the compiler rather than bad input.
    fn emit(&mut self, opcode: Opcode, operands: &[u16]) -> usize {
        assert_eq!(
            opcode.operand_count(),
            operands.len(),
            "compile error: wrong operand count"
        );
        let object = self.code.object_mut(self.current);
        let position = object.instruction_count();
        object.push_instructions(&[opcode.as_u16()]);
        object.push_instructions(operands);
        position
    }

    /// The position the next instruction will be emitted at.
    fn current_position(&self) -> usize {
        self.code.object(self.current).instruction_count()
    }

    /// Rewrites the operand of the instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: u16) {
        self.code.object_mut(self.current).set_instruction(position + 1, operand);
    }

    /// The forward distance from `position` to the current position.
    fn calculate_delta(&self, position: usize) -> CompileResult<u16> {
        let delta = self.current_position() - position;
        if delta > u16::MAX as usize {
            return Err(CompileError::JumpTooFar);
        }
        Ok(delta as u16)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles a program with default options.
pub fn compile(program: &Program) -> CompileResult<Code> {
    let mut compiler = Compiler::new();
    compiler.compile(program)?;
    Ok(compiler.into_code())
}

/// Compiles a program with the given options.
pub fn compile_with(program: &Program, options: CompilerOptions) -> CompileResult<Code> {
    let mut compiler = Compiler::with_options(options)?;
    compiler.compile(program)?;
    Ok(compiler.into_code())
}

/// Maps a compound assignment spelling to the operation it applies.
fn compound_operator(spelling: &str) -> Option<BinaryOperator> {
    match spelling {
        "+=" => Some(BinaryOperator::Add),
        "-=" => Some(BinaryOperator::Subtract),
        "*=" => Some(BinaryOperator::Multiply),
        "/=" => Some(BinaryOperator::Divide),
        _ => None,
    }
}

/// The container iterated by a range clause: an explicit `range c`
/// expression unwraps to `c`.
fn range_container(value: &Expr) -> &Expr {
    match value {
        Expr::Range(range) => &range.container,
        other => other,
    }
}
