//! Opcode definitions for the stack machine.
//!
//! Instructions are stored as a flat sequence of `u16` slots: one slot
//! for the opcode followed by zero, one, or two operand slots depending
//! on the opcode. [`Opcode::operand_count`] gives the operand slot
//! count used when walking an instruction stream.

/// A stack machine opcode.
///
/// Numeric values are part of the serialized bytecode format and must
/// not be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// No operation.
    Nop = 1,
    /// Stops execution.
    Halt = 2,
    /// Calls TOS with the operand count of arguments above it.
    Call = 3,
    /// Returns TOS to the caller.
    ReturnValue = 4,
    /// Moves the instruction pointer backward by the operand delta.
    JumpBackward = 10,
    /// Moves the instruction pointer forward by the operand delta.
    JumpForward = 11,
    /// Pops TOS and jumps forward if it is falsy.
    PopJumpForwardIfFalse = 12,
    /// Pops TOS and jumps forward if it is truthy.
    PopJumpForwardIfTrue = 13,
    /// Pushes the named attribute of TOS; the operand indexes the name pool.
    LoadAttr = 20,
    /// Pushes the local variable at the operand index.
    LoadFast = 21,
    /// Pushes the captured free variable at the operand index.
    LoadFree = 22,
    /// Pushes the global variable at the operand index.
    LoadGlobal = 23,
    /// Pushes the constant at the operand index.
    LoadConst = 24,
    /// Stores TOS into the named attribute of TOS1.
    StoreAttr = 30,
    /// Stores TOS into the local variable at the operand index.
    StoreFast = 31,
    /// Stores TOS into the free variable at the operand index.
    StoreFree = 32,
    /// Stores TOS into the global variable at the operand index.
    StoreGlobal = 33,
    /// Applies the [`BinaryOperator`] named by the operand to TOS1 and TOS.
    BinaryOp = 40,
    /// Applies the [`CompareOperator`] named by the operand to TOS1 and TOS.
    CompareOp = 41,
    /// Arithmetic negation of TOS.
    UnaryNegative = 42,
    /// Logical negation of TOS.
    UnaryNot = 43,
    /// Builds a list from the top operand-count stack values.
    BuildList = 50,
    /// Builds a map from the top operand-count key and value pairs.
    BuildMap = 51,
    /// Builds a set from the top operand-count stack values.
    BuildSet = 52,
    /// Concatenates the top operand-count stack values into a string.
    BuildString = 53,
    /// Pushes `TOS1[TOS]`.
    BinarySubscr = 60,
    /// Implements `TOS1[TOS] = TOS2`.
    StoreSubscr = 61,
    /// Membership test of TOS1 in TOS.
    ContainsOp = 62,
    /// Pushes the length of TOS.
    Length = 63,
    /// Slices TOS2 between indices TOS and TOS1.
    Slice = 64,
    /// Unpacks TOS into the operand count of stack values.
    Unpack = 65,
    /// Swaps TOS with the value at the operand depth.
    Swap = 70,
    /// Pushes a copy of the value at the operand depth.
    Copy = 71,
    /// Discards TOS.
    PopTop = 72,
    /// Pushes `nil`.
    Nil = 80,
    /// Pushes `false`.
    False = 81,
    /// Pushes `true`.
    True = 82,
    /// Advances the iterator at TOS, or jumps forward by the first
    /// operand delta when exhausted. The second operand is the number of
    /// values pushed per iteration.
    ForIter = 90,
    /// Replaces TOS with an iterator over it.
    GetIter = 91,
    /// Replaces TOS with an iteration range over it.
    Range = 92,
    /// Imports one name from the module named by TOS; the operands are
    /// the parent module count and the imported name count.
    FromImport = 100,
    /// Imports the module named by TOS.
    Import = 101,
    /// Builds a closure from a function constant and cell variables.
    LoadClosure = 120,
    /// Creates a cell for the variable at the first operand index, the
    /// second operand frames up.
    MakeCell = 121,
    /// Partially applies TOS with the operand count of arguments.
    Partial = 130,
}

impl Opcode {
    /// Decodes an opcode from its numeric instruction slot value.
    pub fn from_u16(value: u16) -> Option<Opcode> {
        let op = match value {
            1 => Opcode::Nop,
            2 => Opcode::Halt,
            3 => Opcode::Call,
            4 => Opcode::ReturnValue,
            10 => Opcode::JumpBackward,
            11 => Opcode::JumpForward,
            12 => Opcode::PopJumpForwardIfFalse,
            13 => Opcode::PopJumpForwardIfTrue,
            20 => Opcode::LoadAttr,
            21 => Opcode::LoadFast,
            22 => Opcode::LoadFree,
            23 => Opcode::LoadGlobal,
            24 => Opcode::LoadConst,
            30 => Opcode::StoreAttr,
            31 => Opcode::StoreFast,
            32 => Opcode::StoreFree,
            33 => Opcode::StoreGlobal,
            40 => Opcode::BinaryOp,
            41 => Opcode::CompareOp,
            42 => Opcode::UnaryNegative,
            43 => Opcode::UnaryNot,
            50 => Opcode::BuildList,
            51 => Opcode::BuildMap,
            52 => Opcode::BuildSet,
            53 => Opcode::BuildString,
            60 => Opcode::BinarySubscr,
            61 => Opcode::StoreSubscr,
            62 => Opcode::ContainsOp,
            63 => Opcode::Length,
            64 => Opcode::Slice,
            65 => Opcode::Unpack,
            70 => Opcode::Swap,
            71 => Opcode::Copy,
            72 => Opcode::PopTop,
            80 => Opcode::Nil,
            81 => Opcode::False,
            82 => Opcode::True,
            90 => Opcode::ForIter,
            91 => Opcode::GetIter,
            92 => Opcode::Range,
            100 => Opcode::FromImport,
            101 => Opcode::Import,
            120 => Opcode::LoadClosure,
            121 => Opcode::MakeCell,
            130 => Opcode::Partial,
            _ => return None,
        };
        Some(op)
    }

    /// The opcode's numeric instruction slot value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// The number of operand slots following this opcode.
    pub const fn operand_count(self) -> usize {
        match self {
            Opcode::ForIter | Opcode::FromImport | Opcode::LoadClosure | Opcode::MakeCell => 2,
            Opcode::BinaryOp
            | Opcode::BuildList
            | Opcode::BuildMap
            | Opcode::BuildSet
            | Opcode::BuildString
            | Opcode::Call
            | Opcode::CompareOp
            | Opcode::ContainsOp
            | Opcode::Copy
            | Opcode::JumpBackward
            | Opcode::JumpForward
            | Opcode::LoadAttr
            | Opcode::LoadConst
            | Opcode::LoadFast
            | Opcode::LoadFree
            | Opcode::LoadGlobal
            | Opcode::Partial
            | Opcode::PopJumpForwardIfFalse
            | Opcode::PopJumpForwardIfTrue
            | Opcode::StoreAttr
            | Opcode::StoreFast
            | Opcode::StoreFree
            | Opcode::StoreGlobal
            | Opcode::Swap
            | Opcode::Unpack => 1,
            _ => 0,
        }
    }

    /// The conventional assembler name, e.g. `LOAD_CONST`.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Halt => "HALT",
            Opcode::Call => "CALL",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::JumpBackward => "JUMP_BACKWARD",
            Opcode::JumpForward => "JUMP_FORWARD",
            Opcode::PopJumpForwardIfFalse => "POP_JUMP_FORWARD_IF_FALSE",
            Opcode::PopJumpForwardIfTrue => "POP_JUMP_FORWARD_IF_TRUE",
            Opcode::LoadAttr => "LOAD_ATTR",
            Opcode::LoadFast => "LOAD_FAST",
            Opcode::LoadFree => "LOAD_FREE",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::StoreAttr => "STORE_ATTR",
            Opcode::StoreFast => "STORE_FAST",
            Opcode::StoreFree => "STORE_FREE",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::BinaryOp => "BINARY_OP",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::UnaryNegative => "UNARY_NEGATIVE",
            Opcode::UnaryNot => "UNARY_NOT",
            Opcode::BuildList => "BUILD_LIST",
            Opcode::BuildMap => "BUILD_MAP",
            Opcode::BuildSet => "BUILD_SET",
            Opcode::BuildString => "BUILD_STRING",
            Opcode::BinarySubscr => "BINARY_SUBSCR",
            Opcode::StoreSubscr => "STORE_SUBSCR",
            Opcode::ContainsOp => "CONTAINS_OP",
            Opcode::Length => "LENGTH",
            Opcode::Slice => "SLICE",
            Opcode::Unpack => "UNPACK",
            Opcode::Swap => "SWAP",
            Opcode::Copy => "COPY",
            Opcode::PopTop => "POP_TOP",
            Opcode::Nil => "NIL",
            Opcode::False => "FALSE",
            Opcode::True => "TRUE",
            Opcode::ForIter => "FOR_ITER",
            Opcode::GetIter => "GET_ITER",
            Opcode::Range => "RANGE",
            Opcode::FromImport => "FROM_IMPORT",
            Opcode::Import => "IMPORT",
            Opcode::LoadClosure => "LOAD_CLOSURE",
            Opcode::MakeCell => "MAKE_CELL",
            Opcode::Partial => "PARTIAL",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The operation selected by a [`Opcode::BinaryOp`] operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BinaryOperator {
    /// Addition or concatenation.
    Add = 1,
    /// Subtraction.
    Subtract = 2,
    /// Multiplication.
    Multiply = 3,
    /// Division.
    Divide = 4,
    /// Remainder.
    Modulo = 5,
    /// Logical and of two values.
    And = 6,
    /// Logical or of two values.
    Or = 7,
    /// Bitwise exclusive or.
    Xor = 8,
    /// Exponentiation.
    Power = 9,
    /// Left shift.
    LShift = 10,
    /// Right shift.
    RShift = 11,
    /// Bitwise and.
    BitwiseAnd = 12,
    /// Bitwise or.
    BitwiseOr = 13,
}

impl BinaryOperator {
    /// Decodes an operator from its operand slot value.
    pub fn from_u16(value: u16) -> Option<BinaryOperator> {
        let op = match value {
            1 => BinaryOperator::Add,
            2 => BinaryOperator::Subtract,
            3 => BinaryOperator::Multiply,
            4 => BinaryOperator::Divide,
            5 => BinaryOperator::Modulo,
            6 => BinaryOperator::And,
            7 => BinaryOperator::Or,
            8 => BinaryOperator::Xor,
            9 => BinaryOperator::Power,
            10 => BinaryOperator::LShift,
            11 => BinaryOperator::RShift,
            12 => BinaryOperator::BitwiseAnd,
            13 => BinaryOperator::BitwiseOr,
            _ => return None,
        };
        Some(op)
    }

    /// The operator's operand slot value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// The source spelling of the operator.
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Xor => "^",
            BinaryOperator::Power => "**",
            BinaryOperator::LShift => "<<",
            BinaryOperator::RShift => ">>",
            BinaryOperator::BitwiseAnd => "&",
            BinaryOperator::BitwiseOr => "|",
        }
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The comparison selected by a [`Opcode::CompareOp`] operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CompareOperator {
    /// `<`
    LessThan = 1,
    /// `<=`
    LessThanOrEqual = 2,
    /// `==`
    Equal = 3,
    /// `!=`
    NotEqual = 4,
    /// `>`
    GreaterThan = 5,
    /// `>=`
    GreaterThanOrEqual = 6,
}

impl CompareOperator {
    /// Decodes a comparison from its operand slot value.
    pub fn from_u16(value: u16) -> Option<CompareOperator> {
        let op = match value {
            1 => CompareOperator::LessThan,
            2 => CompareOperator::LessThanOrEqual,
            3 => CompareOperator::Equal,
            4 => CompareOperator::NotEqual,
            5 => CompareOperator::GreaterThan,
            6 => CompareOperator::GreaterThanOrEqual,
            _ => return None,
        };
        Some(op)
    }

    /// The comparison's operand slot value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// The source spelling of the comparison.
    pub const fn symbol(self) -> &'static str {
        match self {
            CompareOperator::LessThan => "<",
            CompareOperator::LessThanOrEqual => "<=",
            CompareOperator::Equal => "==",
            CompareOperator::NotEqual => "!=",
            CompareOperator::GreaterThan => ">",
            CompareOperator::GreaterThanOrEqual => ">=",
        }
    }
}

impl std::fmt::Display for CompareOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}
