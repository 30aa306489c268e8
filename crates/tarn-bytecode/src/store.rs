//! Serialization of compiled programs.
//!
//! A [`Code`] tree is flattened into a record schema that
//! cross-references its parts by string id: one record per code unit,
//! in depth first order, plus the nested scope tree. Constants are
//! written as tagged records so that the closed set of permitted kinds
//! is explicit in the format, and unknown tags are rejected on
//! decoding. The round trip rebuilds a structurally equal program,
//! including function constants relinked to their code units.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::code::{Code, CodeId};
use crate::constant::Constant;
use crate::error::{BytecodeError, BytecodeResult};
use crate::function::{Function, FunctionOpts};
use crate::symbol::{Resolution, Scope, Symbol};
use crate::symbol_table::{SymbolTable, TableId};

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionRecord {
    id: String,
    name: String,
    parameters: Vec<String>,
    defaults: Vec<ConstantRecord>,
}

/// A constant pool entry: a type tag plus a tag-dependent value. The
/// value is held as raw JSON so that decoding can reject unknown tags
/// with a useful error.
#[derive(Debug, Serialize, Deserialize)]
struct ConstantRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SymbolRecord {
    name: String,
    index: u16,
    #[serde(default, skip_serializing_if = "is_false")]
    is_constant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<ConstantRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResolutionRecord {
    symbol: SymbolRecord,
    scope: Scope,
    depth: usize,
    free_index: u16,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    symbols: Vec<SymbolRecord>,
    symbols_by_name: BTreeMap<String, SymbolRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    free: Vec<ResolutionRecord>,
    #[serde(default, skip_serializing_if = "is_false")]
    is_block: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<TableRecord>,
}

/// Flat form of one code unit.
#[derive(Debug, Serialize, Deserialize)]
struct CodeRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    parent_id: String,
    symbol_table_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    function_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    instructions: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    constants: Vec<ConstantRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    names: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    defaults: Vec<ConstantRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
}

/// The complete serialized form of one program.
#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    code: Vec<CodeRecord>,
    symbol_table: TableRecord,
}

impl Code {
    /// Serializes the program to JSON.
    pub fn to_bytes(&self) -> BytecodeResult<Vec<u8>> {
        let state = state_record(self)?;
        Ok(serde_json::to_vec(&state)?)
    }

    /// Rebuilds a program from its JSON form.
    pub fn from_bytes(data: &[u8]) -> BytecodeResult<Code> {
        let state: StateRecord = serde_json::from_slice(data)?;
        code_from_state(&state)
    }
}

fn constant_record(constant: &Constant) -> BytecodeResult<ConstantRecord> {
    let value = match constant {
        Constant::Nil => None,
        Constant::Bool(v) => Some(serde_json::to_value(v)?),
        Constant::Int(v) => Some(serde_json::to_value(v)?),
        Constant::Float(v) => Some(serde_json::to_value(v)?),
        Constant::String(v) => Some(serde_json::to_value(v)?),
        Constant::Function(f) => Some(serde_json::to_value(function_record(f)?)?),
    };
    Ok(ConstantRecord { kind: constant.type_name().to_string(), value })
}

fn constant_records(constants: &[Constant]) -> BytecodeResult<Vec<ConstantRecord>> {
    constants.iter().map(constant_record).collect()
}

fn function_record(function: &Function) -> BytecodeResult<FunctionRecord> {
    Ok(FunctionRecord {
        id: function.id().to_string(),
        name: function.name().to_string(),
        parameters: function.parameters().to_vec(),
        defaults: constant_records(function.defaults())?,
    })
}

fn symbol_record(symbol: &Symbol) -> BytecodeResult<SymbolRecord> {
    Ok(SymbolRecord {
        name: symbol.name().to_string(),
        index: symbol.index(),
        is_constant: symbol.is_constant(),
        value: symbol.value().map(constant_record).transpose()?,
    })
}

fn resolution_record(resolution: &Resolution) -> BytecodeResult<ResolutionRecord> {
    Ok(ResolutionRecord {
        symbol: symbol_record(resolution.symbol())?,
        scope: resolution.scope(),
        depth: resolution.depth(),
        free_index: resolution.free_index(),
    })
}

fn table_record(symbols: &SymbolTable, table: TableId) -> BytecodeResult<TableRecord> {
    let mut symbols_by_name = BTreeMap::new();
    for name in symbols.names(table).keys() {
        // The map points into the claiming scope's slots.
        if let Some(symbol) = symbols.get(table, name) {
            symbols_by_name.insert(name.clone(), symbol_record(symbol)?);
        }
    }
    let free = symbols
        .free_list(table)
        .iter()
        .map(resolution_record)
        .collect::<BytecodeResult<Vec<_>>>()?;
    let children = symbols
        .children(table)
        .iter()
        .map(|&child| table_record(symbols, child))
        .collect::<BytecodeResult<Vec<_>>>()?;
    Ok(TableRecord {
        id: symbols.id(table).to_string(),
        symbols: symbols
            .symbols(table)
            .iter()
            .map(symbol_record)
            .collect::<BytecodeResult<Vec<_>>>()?,
        symbols_by_name,
        free,
        is_block: symbols.is_block(table),
        children,
    })
}

fn state_record(code: &Code) -> BytecodeResult<StateRecord> {
    let root = code.root();
    let mut records = Vec::new();
    for id in code.flatten(root) {
        let object = code.object(id);
        let parent_id = object
            .parent()
            .map(|parent| code.object(parent).id().to_string())
            .unwrap_or_default();
        records.push(CodeRecord {
            id: object.id().to_string(),
            name: object.name().to_string(),
            parent_id,
            symbol_table_id: code.symbols().id(object.symbols()).to_string(),
            function_id: object.function_id().unwrap_or_default().to_string(),
            instructions: object.instructions().to_vec(),
            constants: constant_records(object.constants())?,
            names: object.names().to_vec(),
            source: object.source().to_string(),
            defaults: constant_records(object.defaults())?,
            filename: object.filename().map(str::to_string),
        });
    }
    Ok(StateRecord {
        code: records,
        symbol_table: table_record(code.symbols(), code.object(root).symbols())?,
    })
}

fn constant_from_record(record: &ConstantRecord) -> BytecodeResult<Constant> {
    let value = record.value.clone().unwrap_or(serde_json::Value::Null);
    match record.kind.as_str() {
        "nil" => Ok(Constant::Nil),
        "bool" => Ok(Constant::Bool(serde_json::from_value(value)?)),
        "int" => Ok(Constant::Int(serde_json::from_value(value)?)),
        "float" => Ok(Constant::Float(serde_json::from_value(value)?)),
        "string" => Ok(Constant::String(serde_json::from_value(value)?)),
        "function" => {
            let def: FunctionRecord = serde_json::from_value(value)?;
            let defaults = constants_from_records(&def.defaults)?;
            // The code link and source are restored in the link pass.
            Ok(Constant::Function(Box::new(Function::new(FunctionOpts {
                id: def.id,
                name: def.name,
                parameters: def.parameters,
                defaults,
                ..FunctionOpts::default()
            }))))
        }
        other => Err(BytecodeError::UnknownConstantType(other.to_string())),
    }
}

fn constants_from_records(records: &[ConstantRecord]) -> BytecodeResult<Vec<Constant>> {
    records.iter().map(constant_from_record).collect()
}

fn symbol_from_record(record: &SymbolRecord) -> BytecodeResult<Symbol> {
    Ok(Symbol::new(
        record.name.clone(),
        record.index,
        record.is_constant,
        record.value.as_ref().map(constant_from_record).transpose()?,
    ))
}

fn resolution_from_record(record: &ResolutionRecord) -> BytecodeResult<Resolution> {
    Ok(Resolution::new(
        symbol_from_record(&record.symbol)?,
        record.scope,
        record.depth,
        record.free_index,
    ))
}

fn restore_table(
    symbols: &mut SymbolTable,
    parent: Option<TableId>,
    record: &TableRecord,
) -> BytecodeResult<TableId> {
    let slots = record
        .symbols
        .iter()
        .map(symbol_from_record)
        .collect::<BytecodeResult<Vec<_>>>()?;
    let by_name = record
        .symbols_by_name
        .iter()
        .map(|(name, symbol)| (name.clone(), symbol.index))
        .collect::<FxHashMap<_, _>>();
    let free = record
        .free
        .iter()
        .map(resolution_from_record)
        .collect::<BytecodeResult<Vec<_>>>()?;
    let table = symbols.restore_node(
        parent,
        record.id.clone(),
        record.is_block,
        slots,
        by_name,
        free,
    );
    for child in &record.children {
        restore_table(symbols, Some(table), child)?;
    }
    Ok(table)
}

fn code_from_state(state: &StateRecord) -> BytecodeResult<Code> {
    if state.code.is_empty() {
        return Err(BytecodeError::EmptyState);
    }
    let mut symbols = SymbolTable::empty();
    let root_table = restore_table(&mut symbols, None, &state.symbol_table)?;
    let mut code = Code::from_table(symbols);

    let mut ids = Vec::with_capacity(state.code.len());
    let mut codes_by_id: FxHashMap<String, CodeId> = FxHashMap::default();
    let mut functions_by_id: FxHashMap<String, (CodeId, usize)> = FxHashMap::default();
    for record in &state.code {
        let table = code
            .symbols()
            .find_table(root_table, &record.symbol_table_id)
            .ok_or_else(|| {
                BytecodeError::SymbolTableNotFound(record.symbol_table_id.clone())
            })?;
        let parent = if record.parent_id.is_empty() {
            None
        } else {
            Some(*codes_by_id.get(&record.parent_id).ok_or_else(|| {
                BytecodeError::ParentCodeNotFound(record.parent_id.clone())
            })?)
        };
        let constants = constants_from_records(&record.constants)?;
        let defaults = constants_from_records(&record.defaults)?;
        let function_id = if record.function_id.is_empty() {
            None
        } else {
            Some(record.function_id.clone())
        };
        let id = code.restore_object(
            parent,
            record.id.clone(),
            record.name.clone(),
            table,
            record.instructions.clone(),
            constants,
            record.names.clone(),
            record.source.clone(),
            function_id,
            record.filename.clone(),
            defaults,
        );
        codes_by_id.insert(record.id.clone(), id);
        ids.push(id);
        for (index, constant) in code.object(id).constants().iter().enumerate() {
            if let Constant::Function(function) = constant {
                functions_by_id.insert(function.id().to_string(), (id, index));
            }
        }
    }

    // Relink function constants to the units holding their bodies.
    let mut linked: FxHashSet<String> = FxHashSet::default();
    for &id in &ids {
        let Some(function_id) = code.object(id).function_id().map(str::to_string) else {
            continue;
        };
        let &(holder, index) = functions_by_id
            .get(&function_id)
            .ok_or_else(|| BytecodeError::FunctionNotFound(function_id.clone()))?;
        let source = code.object(id).source().to_string();
        if let Some(Constant::Function(function)) =
            code.object_mut(holder).constant_mut(index)
        {
            function.attach_code(id, source);
        }
        linked.insert(function_id);
    }
    for function_id in functions_by_id.keys() {
        if !linked.contains(function_id) {
            return Err(BytecodeError::FunctionCodeNotFound(function_id.clone()));
        }
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(code: &Code) -> Code {
        let data = code.to_bytes().unwrap();
        Code::from_bytes(&data).unwrap()
    }

    #[test]
    fn test_symbol_table_record() {
        let mut code = Code::new();
        let root = code.symbols().root();
        code.symbols_mut().insert_variable(root, "x").unwrap();
        code.symbols_mut().insert_constant(root, "c").unwrap();

        let record = table_record(code.symbols(), root).unwrap();
        assert_eq!(record.symbols.len(), 2);
        assert_eq!(record.symbols[0].name, "x");
        assert!(!record.symbols[0].is_constant);
        assert_eq!(record.symbols[0].index, 0);
        assert_eq!(record.symbols[1].name, "c");
        assert!(record.symbols[1].is_constant);
        assert_eq!(record.symbols[1].index, 1);

        let decoded = round_trip(&code);
        assert_eq!(code, decoded);
    }

    #[test]
    fn test_plain_constants() {
        let mut code = Code::new();
        let root = code.root();
        let object = code.object_mut(root);
        object.add_constant(Constant::Int(1));
        object.add_constant(Constant::Float(2.0));
        object.add_constant(Constant::from("three"));
        object.add_constant(Constant::Bool(true));
        object.add_constant(Constant::Nil);

        let decoded = round_trip(&code);
        assert_eq!(
            code.object(code.root()).constants(),
            decoded.object(decoded.root()).constants()
        );
        assert_eq!(code, decoded);
    }

    #[test]
    fn test_function_constant_relinks() {
        let mut code = Code::new();
        let root = code.root();
        let body = code.new_child(root, "f", "return 1".to_string(), "1".to_string());
        let child_table = code.object(body).symbols();
        code.symbols_mut().insert_variable(child_table, "a").unwrap();
        let function = Function::new(FunctionOpts {
            id: "1".to_string(),
            name: "f".to_string(),
            parameters: vec!["a".to_string()],
            defaults: vec![Constant::Nil],
            code: body,
            source: "return 1".to_string(),
        });
        code.object_mut(root)
            .add_constant(Constant::Function(Box::new(function)));

        let decoded = round_trip(&code);
        assert_eq!(code, decoded);
        let Some(Constant::Function(function)) = decoded.object(decoded.root()).constant(0)
        else {
            panic!("expected a function constant");
        };
        assert_eq!(function.code(), body);
        assert_eq!(function.source(), "return 1");
        assert_eq!(decoded.object(body).function_id(), Some("1"));
    }

    #[test]
    fn test_scope_tree_survives() {
        let mut code = Code::new();
        let root = code.root();
        let root_table = code.object(root).symbols();
        code.symbols_mut().insert_variable(root_table, "g").unwrap();
        let body = code.new_child(root, "f", String::new(), "1".to_string());
        let inner = code.object(body).symbols();
        code.symbols_mut().insert_variable(inner, "x").unwrap();
        let block = code.symbols_mut().new_block(inner);
        code.symbols_mut().insert_variable(block, "y").unwrap();
        code.symbols_mut().resolve(block, "x").unwrap();
        code.object_mut(root)
            .add_constant(Constant::Function(Box::new(Function::new(FunctionOpts {
                id: "1".to_string(),
                name: "f".to_string(),
                code: body,
                ..FunctionOpts::default()
            }))));

        let decoded = round_trip(&code);
        assert_eq!(code, decoded);
        let decoded_block = decoded.symbols().find_table(root_table, "root.0.0").unwrap();
        assert!(decoded.symbols().is_block(decoded_block));
        assert!(decoded.symbols().is_defined(decoded_block, "y"));
        assert_eq!(decoded.locals_count(body), 2);
    }

    #[test]
    fn test_wire_shape() {
        let mut code = Code::new();
        let root = code.root();
        code.object_mut(root).push_instructions(&[80]);
        let data = code.to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(value["code"][0]["name"], "__main__");
        assert_eq!(value["code"][0]["id"], "__main__");
        assert_eq!(value["code"][0]["symbol_table_id"], "root");
        assert_eq!(value["code"][0]["instructions"][0], 80);
        assert_eq!(value["symbol_table"]["id"], "root");
        // Empty and false fields are omitted entirely.
        let object = value["code"][0].as_object().unwrap();
        assert!(!object.contains_key("parent_id"));
        assert!(!object.contains_key("constants"));
        assert!(!object.contains_key("function_id"));
        let table = value["symbol_table"].as_object().unwrap();
        assert!(!table.contains_key("is_block"));
        assert!(!table.contains_key("free"));
        assert!(!table.contains_key("children"));
    }

    #[test]
    fn test_constant_tags() {
        let mut code = Code::new();
        let root = code.root();
        code.object_mut(root).add_constant(Constant::Nil);
        code.object_mut(root).add_constant(Constant::Int(3));
        let data = code.to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
        let constants = value["code"][0]["constants"].as_array().unwrap();
        assert_eq!(constants[0], serde_json::json!({"type": "nil"}));
        assert_eq!(constants[1], serde_json::json!({"type": "int", "value": 3}));
    }

    #[test]
    fn test_unknown_constant_type() {
        let data = br#"{
            "code": [{
                "name": "__main__",
                "symbol_table_id": "root",
                "constants": [{"type": "blob", "value": 1}]
            }],
            "symbol_table": {"id": "root", "symbols": [], "symbols_by_name": {}}
        }"#;
        let err = Code::from_bytes(data).unwrap_err();
        assert_eq!(err.to_string(), "unknown constant type: blob");
    }

    #[test]
    fn test_missing_symbol_table() {
        let data = br#"{
            "code": [{"name": "__main__", "symbol_table_id": "nope"}],
            "symbol_table": {"id": "root", "symbols": [], "symbols_by_name": {}}
        }"#;
        let err = Code::from_bytes(data).unwrap_err();
        assert_eq!(err.to_string(), "symbol table not found: nope");
    }

    #[test]
    fn test_missing_parent() {
        let data = br#"{
            "code": [
                {"id": "__main__", "name": "__main__", "symbol_table_id": "root"},
                {"id": "x.0", "name": "f", "parent_id": "ghost", "symbol_table_id": "root"}
            ],
            "symbol_table": {"id": "root", "symbols": [], "symbols_by_name": {}}
        }"#;
        let err = Code::from_bytes(data).unwrap_err();
        assert_eq!(err.to_string(), "parent code not found: ghost");
    }

    #[test]
    fn test_missing_function_constant() {
        let data = br#"{
            "code": [
                {"id": "__main__", "name": "__main__", "symbol_table_id": "root"},
                {
                    "id": "__main__.0", "name": "f", "parent_id": "__main__",
                    "symbol_table_id": "root.0", "function_id": "9"
                }
            ],
            "symbol_table": {
                "id": "root", "symbols": [], "symbols_by_name": {},
                "children": [{"id": "root.0", "symbols": [], "symbols_by_name": {}}]
            }
        }"#;
        let err = Code::from_bytes(data).unwrap_err();
        assert_eq!(err.to_string(), "function not found: 9");
    }

    #[test]
    fn test_unlinked_function_constant() {
        let data = br#"{
            "code": [{
                "name": "__main__",
                "symbol_table_id": "root",
                "constants": [{
                    "type": "function",
                    "value": {"id": "7", "name": "f", "parameters": [], "defaults": []}
                }]
            }],
            "symbol_table": {"id": "root", "symbols": [], "symbols_by_name": {}}
        }"#;
        let err = Code::from_bytes(data).unwrap_err();
        assert_eq!(err.to_string(), "function code not found: 7");
    }

    #[test]
    fn test_empty_state() {
        let data = br#"{"code": [], "symbol_table": {"id": "root", "symbols": [], "symbols_by_name": {}}}"#;
        let err = Code::from_bytes(data).unwrap_err();
        assert_eq!(err.to_string(), "no code objects in serialized state");
    }

    #[test]
    fn test_symbol_value_keeps_type() {
        let mut code = Code::new();
        let root = code.symbols().root();
        code.symbols_mut()
            .insert_variable_with(root, "x", Constant::Float(1.0))
            .unwrap();
        let decoded = round_trip(&code);
        assert_eq!(
            decoded.symbols().get(root, "x").and_then(Symbol::value),
            Some(&Constant::Float(1.0))
        );
    }
}
