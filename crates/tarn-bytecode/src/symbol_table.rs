//! Lexical scope tracking.
//!
//! A [`SymbolTable`] owns a tree of scopes stored in one arena and
//! addressed by [`TableId`] handles. Each scope is either a function
//! scope, which owns the storage slots for its local variables, or a
//! block scope nested within a function. Blocks claim slots from their
//! enclosing function scope, so a symbol declared inside an `if` block
//! occupies a slot in the surrounding function's frame.
//!
//! [`SymbolTable::resolve`] classifies a name as local, global, or
//! free. A free variable is one defined by an enclosing function; the
//! first resolution of a free name records a capture slot in the
//! resolving function's free list, and block scopes pass resolutions
//! through untouched so that capture slots are always numbered at the
//! function level.

use rustc_hash::FxHashMap;

use crate::constant::Constant;
use crate::error::{BytecodeError, BytecodeResult};
use crate::symbol::{Resolution, Scope, Symbol};

/// Identifies one scope within a [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct TableId(u32);

impl TableId {
    /// Creates a table id from a raw arena index.
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

/// One scope in the tree.
#[derive(Debug, Clone, PartialEq)]
struct TableNode {
    id: String,
    parent: Option<TableId>,
    children: Vec<TableId>,
    /// Storage slots claimed by this scope. Blocks never claim slots,
    /// so this stays empty for them. There may be more symbols here
    /// than names in `by_name`, because symbols declared in nested
    /// blocks claim slots here without a name in this scope.
    symbols: Vec<Symbol>,
    /// Names declared directly in this scope, mapped to their slot in
    /// the claiming function scope.
    by_name: FxHashMap<String, u16>,
    /// Captured free variables, in capture order. Function scopes only.
    free: Vec<Resolution>,
    /// Cache of resolved free names, mapped to their `free` slot.
    free_by_name: FxHashMap<String, u16>,
    is_block: bool,
}

/// The scope tree for one compiled program.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable {
    tables: Vec<TableNode>,
}

impl SymbolTable {
    /// Creates a table holding only the root scope.
    pub fn new() -> Self {
        Self {
            tables: vec![TableNode {
                id: "root".to_string(),
                parent: None,
                children: Vec::new(),
                symbols: Vec::new(),
                by_name: FxHashMap::default(),
                free: Vec::new(),
                free_by_name: FxHashMap::default(),
                is_block: false,
            }],
        }
    }

    /// The root scope.
    #[inline]
    pub fn root(&self) -> TableId {
        TableId(0)
    }

    #[inline]
    fn node(&self, table: TableId) -> &TableNode {
        &self.tables[table.index()]
    }

    #[inline]
    fn node_mut(&mut self, table: TableId) -> &mut TableNode {
        &mut self.tables[table.index()]
    }

    /// Creates a new function scope under `parent`.
    pub fn new_child(&mut self, parent: TableId) -> TableId {
        self.push_node(parent, false)
    }

    /// Creates a new block scope under `parent`. Blocks allocate their
    /// symbol slots from the enclosing function scope.
    pub fn new_block(&mut self, parent: TableId) -> TableId {
        self.push_node(parent, true)
    }

    fn push_node(&mut self, parent: TableId, is_block: bool) -> TableId {
        let id = format!("{}.{}", self.node(parent).id, self.node(parent).children.len());
        let child = TableId(self.tables.len() as u32);
        self.tables.push(TableNode {
            id,
            parent: Some(parent),
            children: Vec::new(),
            symbols: Vec::new(),
            by_name: FxHashMap::default(),
            free: Vec::new(),
            free_by_name: FxHashMap::default(),
            is_block,
        });
        self.node_mut(parent).children.push(child);
        child
    }

    /// The scope's identifier, e.g. `root.1.0`.
    #[inline]
    pub fn id(&self, table: TableId) -> &str {
        &self.node(table).id
    }

    /// True if the scope is a block rather than a function scope.
    #[inline]
    pub fn is_block(&self, table: TableId) -> bool {
        self.node(table).is_block
    }

    /// The scope's parent, if it has one.
    #[inline]
    pub fn parent(&self, table: TableId) -> Option<TableId> {
        self.node(table).parent
    }

    /// The scope's child scopes, in creation order.
    #[inline]
    pub fn children(&self, table: TableId) -> &[TableId] {
        &self.node(table).children
    }

    /// The function scope that owns local slots for `table`: the scope
    /// itself unless it is a block, in which case the nearest enclosing
    /// function scope.
    pub fn local_table(&self, table: TableId) -> TableId {
        let mut current = table;
        while self.node(current).is_block {
            // Blocks always have a parent.
            current = self.node(current).parent.unwrap_or(current);
        }
        current
    }

    /// True if symbols declared in this scope are globals, which is the
    /// case when the nearest function scope is the root.
    pub fn is_global(&self, table: TableId) -> bool {
        self.node(self.local_table(table)).parent.is_none()
    }

    fn claim_index(&mut self, table: TableId, mut symbol: Symbol) -> BytecodeResult<u16> {
        let claimer = self.local_table(table);
        let index = self.node(claimer).symbols.len();
        if index >= u16::MAX as usize {
            return Err(BytecodeError::TooManySymbols);
        }
        let index = index as u16;
        symbol = Symbol::new(
            symbol.name().to_string(),
            index,
            symbol.is_constant(),
            symbol.value().cloned(),
        );
        self.node_mut(claimer).symbols.push(symbol);
        Ok(index)
    }

    fn insert(&mut self, table: TableId, name: &str, value: Option<Constant>) -> BytecodeResult<Symbol> {
        if self.node(table).by_name.contains_key(name) {
            return Err(BytecodeError::SymbolAlreadyExists(name.to_string()));
        }
        let symbol = Symbol::new(name.to_string(), 0, false, value);
        let index = self.claim_index(table, symbol)?;
        self.node_mut(table).by_name.insert(name.to_string(), index);
        let claimer = self.local_table(table);
        Ok(self.node(claimer).symbols[index as usize].clone())
    }

    /// Declares a new variable in this scope. The symbol is assigned
    /// the next available slot in the claiming function scope.
    pub fn insert_variable(&mut self, table: TableId, name: &str) -> BytecodeResult<Symbol> {
        self.insert(table, name, None)
    }

    /// Declares a new variable with an attached value.
    pub fn insert_variable_with(
        &mut self,
        table: TableId,
        name: &str,
        value: Constant,
    ) -> BytecodeResult<Symbol> {
        self.insert(table, name, Some(value))
    }

    /// Declares a new constant in this scope.
    pub fn insert_constant(&mut self, table: TableId, name: &str) -> BytecodeResult<Symbol> {
        let symbol = self.insert(table, name, None)?;
        self.make_constant(table, symbol)
    }

    /// Declares a new constant with an attached value.
    pub fn insert_constant_with(
        &mut self,
        table: TableId,
        name: &str,
        value: Constant,
    ) -> BytecodeResult<Symbol> {
        let symbol = self.insert(table, name, Some(value))?;
        self.make_constant(table, symbol)
    }

    fn make_constant(&mut self, table: TableId, symbol: Symbol) -> BytecodeResult<Symbol> {
        let claimer = self.local_table(table);
        let slot = &mut self.node_mut(claimer).symbols[symbol.index() as usize];
        slot.set_constant();
        Ok(slot.clone())
    }

    /// Associates a value with a symbol declared in this scope.
    pub fn set_value(&mut self, table: TableId, name: &str, value: Constant) -> BytecodeResult<()> {
        let Some(&index) = self.node(table).by_name.get(name) else {
            return Err(BytecodeError::SymbolNotFound(name.to_string()));
        };
        let claimer = self.local_table(table);
        self.node_mut(claimer).symbols[index as usize].set_value(Some(value));
        Ok(())
    }

    /// True if the name is declared directly in this scope. Parent
    /// scopes are not consulted.
    pub fn is_defined(&self, table: TableId, name: &str) -> bool {
        self.node(table).by_name.contains_key(name)
    }

    /// Looks up a name declared directly in this scope. Parent scopes
    /// are not consulted.
    pub fn get(&self, table: TableId, name: &str) -> Option<&Symbol> {
        let &index = self.node(table).by_name.get(name)?;
        let claimer = self.local_table(table);
        Some(&self.node(claimer).symbols[index as usize])
    }

    /// Resolves a name in this scope or any enclosing scope.
    ///
    /// A name found across a function boundary is classified as free
    /// and recorded in the resolving function's free list, giving it a
    /// capture slot. Repeated resolutions of the same name reuse the
    /// recorded slot. Blocks forward resolutions unchanged, so the free
    /// list and its numbering always belong to a function scope.
    pub fn resolve(&mut self, table: TableId, name: &str) -> Option<Resolution> {
        // Declared directly in this scope?
        if let Some(&slot) = self.node(table).by_name.get(name) {
            let claimer = self.local_table(table);
            let symbol = self.node(claimer).symbols[slot as usize].clone();
            let scope = if self.is_global(table) { Scope::Global } else { Scope::Local };
            return Some(Resolution::new(symbol, scope, 0, 0));
        }
        // Previously resolved here as a free variable?
        if !self.node(table).is_block {
            if let Some(&slot) = self.node(table).free_by_name.get(name) {
                return Some(self.node(table).free[slot as usize].clone());
            }
        }
        let parent = self.node(table).parent?;
        let resolution = self.resolve(parent, name)?;
        // Globals resolve the same way from any scope.
        if resolution.scope() == Scope::Global {
            return Some(resolution);
        }
        // Blocks share their enclosing function's frame, so the parent
        // resolution applies as-is.
        if self.node(table).is_block {
            return Some(resolution);
        }
        // Crossed a function boundary: capture as a free variable.
        let free_index = self.node(table).free.len() as u16;
        let resolution = Resolution::new(
            resolution.symbol().clone(),
            Scope::Free,
            resolution.depth() + 1,
            free_index,
        );
        let node = self.node_mut(table);
        node.free_by_name.insert(name.to_string(), free_index);
        node.free.push(resolution.clone());
        Some(resolution)
    }

    /// The number of storage slots claimed by this scope.
    #[inline]
    pub fn count(&self, table: TableId) -> u16 {
        self.node(table).symbols.len() as u16
    }

    /// The symbol in the given storage slot of this scope.
    pub fn symbol(&self, table: TableId, index: u16) -> Option<&Symbol> {
        self.node(table).symbols.get(index as usize)
    }

    /// The storage slots claimed by this scope, in slot order.
    #[inline]
    pub fn symbols(&self, table: TableId) -> &[Symbol] {
        &self.node(table).symbols
    }

    /// The number of free variables captured by this scope.
    #[inline]
    pub fn free_count(&self, table: TableId) -> u16 {
        self.node(table).free.len() as u16
    }

    /// The free variable resolution in the given capture slot.
    pub fn free(&self, table: TableId, index: u16) -> Option<&Resolution> {
        self.node(table).free.get(index as usize)
    }

    /// The free variables captured by this scope, in capture order.
    #[inline]
    pub fn free_list(&self, table: TableId) -> &[Resolution] {
        &self.node(table).free
    }

    /// Names declared directly in this scope, with their slot indices.
    pub(crate) fn names(&self, table: TableId) -> &FxHashMap<String, u16> {
        &self.node(table).by_name
    }

    /// Finds the scope with the given identifier, searching this scope
    /// and its descendants.
    pub fn find_table(&self, from: TableId, id: &str) -> Option<TableId> {
        if self.node(from).id == id {
            return Some(from);
        }
        for &child in &self.node(from).children {
            if let Some(found) = self.find_table(child, id) {
                return Some(found);
            }
        }
        None
    }

    /// Rebuilds a scope from its serialized parts. The scope's children
    /// must be restored in their original order afterwards.
    pub(crate) fn restore_node(
        &mut self,
        parent: Option<TableId>,
        id: String,
        is_block: bool,
        symbols: Vec<Symbol>,
        by_name: FxHashMap<String, u16>,
        free: Vec<Resolution>,
    ) -> TableId {
        let free_by_name = free
            .iter()
            .enumerate()
            .map(|(i, resolution)| (resolution.symbol().name().to_string(), i as u16))
            .collect();
        let table = TableId(self.tables.len() as u32);
        self.tables.push(TableNode {
            id,
            parent,
            children: Vec::new(),
            symbols,
            by_name,
            free,
            free_by_name,
            is_block,
        });
        if let Some(parent) = parent {
            self.node_mut(parent).children.push(table);
        }
        table
    }

    /// Creates a table with no scopes at all, for deserialization.
    pub(crate) fn empty() -> Self {
        Self { tables: Vec::new() }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
