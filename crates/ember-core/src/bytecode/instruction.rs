//! Bytecode Instruction Representation
//!
//! Decoded view of one instruction in a code stream.
//! This layer contains no execution semantics.

use super::opcode::{OpCode, Operands};
use crate::error::{EmberError, EmberResult};

/// Decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: OpCode,
    pub a: u16,
    pub b: u16,
}

impl Instruction {
    /// Decode the instruction starting at `offset`
    pub fn decode(code: &[u8], offset: usize) -> EmberResult<Self> {
        let byte = *code.get(offset).ok_or(EmberError::BytecodeTooShort)?;
        let opcode = OpCode::from_u8(byte).ok_or(EmberError::InvalidOpcode(byte))?;
        let operands = opcode.operands();
        let start = offset + 1;
        let bytes = code
            .get(start..start + operands.len())
            .ok_or(EmberError::BytecodeTooShort)?;

        let (a, b) = match operands {
            Operands::None => (0, 0),
            Operands::U8 => (bytes[0] as u16, 0),
            Operands::U16 => (u16::from_be_bytes([bytes[0], bytes[1]]), 0),
            Operands::U8U8 => (bytes[0] as u16, bytes[1] as u16),
            Operands::U8U16 => (bytes[0] as u16, u16::from_be_bytes([bytes[1], bytes[2]])),
        };

        Ok(Instruction { offset, opcode, a, b })
    }

    /// Total encoded length including the opcode byte
    pub fn len(&self) -> usize {
        1 + self.opcode.operands().len()
    }

    pub fn next_offset(&self) -> usize {
        self.offset + self.len()
    }

    /// Jump destination, for instructions that carry one
    pub fn target(&self) -> Option<usize> {
        match self.opcode {
            OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::JumpIfFalseOrPop
            | OpCode::JumpIfTrueOrPop => Some(self.a as usize),
            OpCode::ForPrep | OpCode::ForLoop => Some(self.b as usize),
            _ => None,
        }
    }
}

/// Iterate over every instruction of a code stream
pub fn decode_all(code: &[u8]) -> EmberResult<Vec<Instruction>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let instruction = Instruction::decode(code, offset)?;
        offset = instruction.next_offset();
        out.push(instruction);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_operand_shapes() {
        let code = [
            OpCode::Push as u8, 0x01, 0x02,
            OpCode::Call as u8, 2, 1,
            OpCode::ForPrep as u8, 3, 0x00, 0x10,
            OpCode::Add as u8,
        ];
        let all = decode_all(&code).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].a, 0x0102);
        assert_eq!((all[1].a, all[1].b), (2, 1));
        assert_eq!(all[2].target(), Some(0x10));
        assert_eq!(all[3].offset, 10);
    }

    #[test]
    fn truncated_operand_is_too_short() {
        let code = [OpCode::Push as u8, 0x01];
        assert_eq!(decode_all(&code), Err(EmberError::BytecodeTooShort));
    }
}
