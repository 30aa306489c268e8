//! Compiled code containers.
//!
//! A [`Code`] value holds every compiled unit of one program in an
//! arena, together with the program's [`SymbolTable`]. Each unit is a
//! [`CodeObject`]: the instruction stream, constant pool, attribute
//! name pool, and scope reference for one function body or for the
//! top level program. Code objects form a tree mirroring function
//! nesting, addressed by [`CodeId`] handles.

use crate::constant::Constant;
use crate::symbol::Symbol;
use crate::symbol_table::{SymbolTable, TableId};

/// The name given to the top level code object.
pub const MAIN_NAME: &str = "__main__";

/// Identifies one [`CodeObject`] within a [`Code`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct CodeId(u32);

impl CodeId {
    /// Creates a code id from a raw arena index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw arena index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One compiled unit: a function body or the top level program.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeObject {
    id: String,
    name: String,
    is_named: bool,
    parent: Option<CodeId>,
    children: Vec<CodeId>,
    /// The scope instructions in this unit resolve against. While a
    /// block is being compiled this points at the block's scope; at
    /// rest it is always the unit's own function scope.
    symbols: TableId,
    instructions: Vec<u16>,
    constants: Vec<Constant>,
    names: Vec<String>,
    source: String,
    function_id: Option<String>,
    filename: Option<String>,
    defaults: Vec<Constant>,
}

impl CodeObject {
    /// The unit's identifier, e.g. `__main__.0`.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The unit's name: the function name, or [`MAIN_NAME`] for the
    /// top level program.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this unit belongs to a named function.
    #[inline]
    pub fn is_named(&self) -> bool {
        self.is_named
    }

    /// The enclosing unit, if any.
    #[inline]
    pub fn parent(&self) -> Option<CodeId> {
        self.parent
    }

    /// Units compiled from function literals nested in this unit.
    #[inline]
    pub fn children(&self) -> &[CodeId] {
        &self.children
    }

    /// The scope this unit currently resolves against.
    #[inline]
    pub fn symbols(&self) -> TableId {
        self.symbols
    }

    /// Moves the scope cursor, used when entering and leaving blocks.
    #[inline]
    pub fn set_symbols(&mut self, table: TableId) {
        self.symbols = table;
    }

    /// The flat instruction stream: opcodes and operands interleaved.
    #[inline]
    pub fn instructions(&self) -> &[u16] {
        &self.instructions
    }

    /// The number of instruction slots.
    #[inline]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Appends instruction slots to the stream.
    pub fn push_instructions(&mut self, slots: &[u16]) {
        self.instructions.extend_from_slice(slots);
    }

    /// Overwrites one instruction slot, used for jump patching.
    pub fn set_instruction(&mut self, index: usize, slot: u16) {
        self.instructions[index] = slot;
    }

    /// The constant pool.
    #[inline]
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// The constant at the given pool index.
    pub fn constant(&self, index: usize) -> Option<&Constant> {
        self.constants.get(index)
    }

    /// The number of pool entries.
    #[inline]
    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    /// Appends a constant to the pool and returns its index.
    pub fn add_constant(&mut self, value: Constant) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub(crate) fn constant_mut(&mut self, index: usize) -> Option<&mut Constant> {
        self.constants.get_mut(index)
    }

    /// The attribute name pool.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Appends a name to the attribute name pool and returns its index.
    pub fn add_name(&mut self, name: &str) -> u16 {
        self.names.push(name.to_string());
        (self.names.len() - 1) as u16
    }

    /// The source text this unit was compiled from.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Replaces the unit's source text.
    pub fn set_source(&mut self, source: String) {
        self.source = source;
    }

    /// The id of the function constant owning this unit, if any.
    pub fn function_id(&self) -> Option<&str> {
        self.function_id.as_deref()
    }

    /// The file the source text came from, if known.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Records the file the source text came from.
    pub fn set_filename(&mut self, filename: String) {
        self.filename = Some(filename);
    }

    /// Parameter default values, parallel to the owning function's
    /// parameter list.
    #[inline]
    pub fn defaults(&self) -> &[Constant] {
        &self.defaults
    }

    /// Records the unit's parameter default values.
    pub fn set_defaults(&mut self, defaults: Vec<Constant>) {
        self.defaults = defaults;
    }
}

/// Every compiled unit of one program, plus its scope tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    objects: Vec<CodeObject>,
    symbols: SymbolTable,
}

impl Code {
    /// Creates a container holding an empty top level unit.
    pub fn new() -> Self {
        let symbols = SymbolTable::new();
        let root_table = symbols.root();
        Self {
            objects: vec![CodeObject {
                id: MAIN_NAME.to_string(),
                name: MAIN_NAME.to_string(),
                is_named: false,
                parent: None,
                children: Vec::new(),
                symbols: root_table,
                instructions: Vec::new(),
                constants: Vec::new(),
                names: Vec::new(),
                source: String::new(),
                function_id: None,
                filename: None,
                defaults: Vec::new(),
            }],
            symbols,
        }
    }

    /// The top level unit.
    #[inline]
    pub fn root(&self) -> CodeId {
        CodeId(0)
    }

    /// True for the top level unit.
    pub fn is_root(&self, code: CodeId) -> bool {
        self.objects[code.index()].parent.is_none()
    }

    /// The number of units in the program.
    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Borrows a unit.
    #[inline]
    pub fn object(&self, code: CodeId) -> &CodeObject {
        &self.objects[code.index()]
    }

    /// Mutably borrows a unit.
    #[inline]
    pub fn object_mut(&mut self, code: CodeId) -> &mut CodeObject {
        &mut self.objects[code.index()]
    }

    /// The program's scope tree.
    #[inline]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Mutably borrows the scope tree.
    #[inline]
    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Creates a unit for a function literal nested in `parent`. The
    /// new unit's scope is a child of the parent's current scope.
    pub fn new_child(
        &mut self,
        parent: CodeId,
        name: &str,
        source: String,
        function_id: String,
    ) -> CodeId {
        let parent_obj = &self.objects[parent.index()];
        let id = format!("{}.{}", parent_obj.id, parent_obj.children.len());
        let table = self.symbols.new_child(parent_obj.symbols);
        let child = CodeId(self.objects.len() as u32);
        self.objects.push(CodeObject {
            id,
            name: name.to_string(),
            is_named: !name.is_empty() && name != MAIN_NAME,
            parent: Some(parent),
            children: Vec::new(),
            symbols: table,
            instructions: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
            source,
            function_id: Some(function_id),
            filename: None,
            defaults: Vec::new(),
        });
        self.objects[parent.index()].children.push(child);
        child
    }

    /// The unit and all its descendants, depth first with children in
    /// declaration order. This ordering is stable and is relied on by
    /// the serialization codec.
    pub fn flatten(&self, from: CodeId) -> Vec<CodeId> {
        let mut codes = vec![from];
        for &child in &self.objects[from.index()].children {
            codes.extend(self.flatten(child));
        }
        codes
    }

    /// The number of local slots in the unit's scope.
    pub fn locals_count(&self, code: CodeId) -> u16 {
        self.symbols.count(self.objects[code.index()].symbols)
    }

    /// The local symbol in the given slot of the unit's scope.
    pub fn local(&self, code: CodeId, index: u16) -> Option<&Symbol> {
        self.symbols.symbol(self.objects[code.index()].symbols, index)
    }

    /// The number of global slots.
    pub fn globals_count(&self) -> u16 {
        self.symbols.count(self.symbols.root())
    }

    /// The global symbol in the given slot.
    pub fn global(&self, index: u16) -> Option<&Symbol> {
        self.symbols.symbol(self.symbols.root(), index)
    }

    /// The names of all globals, in slot order.
    pub fn global_names(&self) -> Vec<String> {
        self.symbols
            .symbols(self.symbols.root())
            .iter()
            .map(|symbol| symbol.name().to_string())
            .collect()
    }

    /// Rebuilds a unit from its serialized parts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore_object(
        &mut self,
        parent: Option<CodeId>,
        id: String,
        name: String,
        symbols: TableId,
        instructions: Vec<u16>,
        constants: Vec<Constant>,
        names: Vec<String>,
        source: String,
        function_id: Option<String>,
        filename: Option<String>,
        defaults: Vec<Constant>,
    ) -> CodeId {
        let code = CodeId(self.objects.len() as u32);
        self.objects.push(CodeObject {
            is_named: !name.is_empty() && name != MAIN_NAME,
            id,
            name,
            parent,
            children: Vec::new(),
            symbols,
            instructions,
            constants,
            names,
            source,
            function_id,
            filename,
            defaults,
        });
        if let Some(parent) = parent {
            self.objects[parent.index()].children.push(code);
        }
        code
    }

    /// Creates a container with no units around a restored scope tree,
    /// for deserialization.
    pub(crate) fn from_table(symbols: SymbolTable) -> Self {
        Self { objects: Vec::new(), symbols }
    }
}

impl Default for Code {
    fn default() -> Self {
        Self::new()
    }
}
