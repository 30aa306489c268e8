//! Instruction stream decoding.
//!
//! Instructions are stored flat: one opcode slot followed by that
//! opcode's fixed number of operand slots. [`InstructionIter`] walks a
//! stream and yields one `(opcode, operands)` group per instruction,
//! using the operand counts registered in [`crate::op`]. It works the
//! same over freshly compiled and freshly deserialized streams.

use crate::code::CodeObject;
use crate::error::{BytecodeError, BytecodeResult};
use crate::op::Opcode;

/// Iterates over the instructions of one compiled unit.
#[derive(Debug, Clone)]
pub struct InstructionIter<'a> {
    slots: &'a [u16],
    position: usize,
}

impl<'a> InstructionIter<'a> {
    /// Creates an iterator over the unit's instruction stream.
    pub fn new(code: &'a CodeObject) -> Self {
        Self { slots: code.instructions(), position: 0 }
    }

    /// Creates an iterator over a raw slot stream.
    pub fn from_slots(slots: &'a [u16]) -> Self {
        Self { slots, position: 0 }
    }

    /// The slot offset of the next instruction to be decoded.
    #[inline]
    pub fn offset(&self) -> usize {
        self.position
    }

    /// Collects all remaining instructions as raw slot groups, each
    /// holding the opcode followed by its operands.
    pub fn all(self) -> BytecodeResult<Vec<Vec<u16>>> {
        let mut groups = Vec::new();
        for item in self {
            let (opcode, operands) = item?;
            let mut group = Vec::with_capacity(1 + operands.len());
            group.push(opcode.as_u16());
            group.extend_from_slice(operands);
            groups.push(group);
        }
        Ok(groups)
    }
}

impl<'a> Iterator for InstructionIter<'a> {
    type Item = BytecodeResult<(Opcode, &'a [u16])>;

    fn next(&mut self) -> Option<Self::Item> {
        let &slot = self.slots.get(self.position)?;
        let Some(opcode) = Opcode::from_u16(slot) else {
            self.position = self.slots.len();
            return Some(Err(BytecodeError::UnknownOpcode(slot)));
        };
        self.position += 1;
        let count = opcode.operand_count() as usize;
        if self.position + count > self.slots.len() {
            self.position = self.slots.len();
            return Some(Err(BytecodeError::TruncatedInstruction(opcode)));
        }
        let operands = &self.slots[self.position..self.position + count];
        self.position += count;
        Some(Ok((opcode, operands)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_groups() {
        let slots = [
            Opcode::LoadConst.as_u16(),
            0,
            Opcode::LoadConst.as_u16(),
            1,
            Opcode::BinaryOp.as_u16(),
            1,
            Opcode::Nil.as_u16(),
        ];
        let groups = InstructionIter::from_slots(&slots).all().unwrap();
        assert_eq!(groups, vec![vec![24, 0], vec![24, 1], vec![40, 1], vec![80]]);
    }

    #[test]
    fn test_two_operand_instruction() {
        let slots = [Opcode::ForIter.as_u16(), 9, 2];
        let mut iter = InstructionIter::from_slots(&slots);
        let (opcode, operands) = iter.next().unwrap().unwrap();
        assert_eq!(opcode, Opcode::ForIter);
        assert_eq!(operands, &[9, 2]);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_restartable() {
        let slots = [Opcode::Nil.as_u16(), Opcode::ReturnValue.as_u16()];
        let first = InstructionIter::from_slots(&slots).all().unwrap();
        let second = InstructionIter::from_slots(&slots).all().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_opcode() {
        let slots = [Opcode::Nil.as_u16(), 999];
        let mut iter = InstructionIter::from_slots(&slots);
        assert!(iter.next().unwrap().is_ok());
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "unknown opcode: 999");
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_truncated_stream() {
        let slots = [Opcode::LoadConst.as_u16()];
        let mut iter = InstructionIter::from_slots(&slots);
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "truncated instruction: LOAD_CONST");
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_offset_tracks_slots() {
        let slots = [Opcode::LoadConst.as_u16(), 0, Opcode::PopTop.as_u16()];
        let mut iter = InstructionIter::from_slots(&slots);
        assert_eq!(iter.offset(), 0);
        iter.next();
        assert_eq!(iter.offset(), 2);
        iter.next();
        assert_eq!(iter.offset(), 3);
    }
}
