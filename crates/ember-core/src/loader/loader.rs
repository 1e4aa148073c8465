//! Bytecode Loader
//!
//! Loads and validates Ember bytecode artifacts.
//! Validation is structural: header, section bounds, decodable instruction
//! streams and in-range operands. Nothing is executed here.

use std::collections::HashSet;

use crate::bytecode::instruction::decode_all;
use crate::bytecode::opcode::{OpCode, MULTRET};
use crate::bytecode::proto::{Constant, LineInfo, Proto};
use crate::bytecode::{
    BYTECODE_MAGIC, TAG_BOOL, TAG_INTEGER, TAG_NIL, TAG_NUMBER, TAG_STRING, VERSION_MAJOR,
};
use crate::error::{EmberError, EmberResult};

/// Header plus the smallest possible prototype
const MIN_FILE_SIZE: usize = 34;

/// Nesting limit for function prototypes
const MAX_PROTO_DEPTH: usize = 200;

/// Bytecode loader
pub struct BytecodeLoader;

impl BytecodeLoader {
    /// Load a prototype tree from raw bytes
    pub fn load(bytes: &[u8]) -> EmberResult<Proto> {
        if bytes.len() < MIN_FILE_SIZE {
            return Err(EmberError::BytecodeTooShort);
        }

        let mut cursor = 0;

        // Magic
        let magic = Self::read_u32(bytes, &mut cursor)?;
        if magic != BYTECODE_MAGIC {
            return Err(EmberError::InvalidMagicNumber);
        }

        // Version
        let major = Self::read_u8(bytes, &mut cursor)?;
        let _minor = Self::read_u8(bytes, &mut cursor)?;
        let _patch = Self::read_u8(bytes, &mut cursor)?;

        if major != VERSION_MAJOR {
            return Err(EmberError::InvalidBytecodeVersion(major));
        }

        // Reserved
        Self::read_u8(bytes, &mut cursor)?;

        let proto = Self::read_proto(bytes, &mut cursor, 0)?;
        if cursor != bytes.len() {
            return Err(EmberError::MalformedBytecode(format!(
                "{} trailing bytes",
                bytes.len() - cursor
            )));
        }
        Ok(proto)
    }

    fn read_proto(bytes: &[u8], cursor: &mut usize, depth: usize) -> EmberResult<Proto> {
        if depth > MAX_PROTO_DEPTH {
            return Err(EmberError::MalformedBytecode(
                "functions nested too deeply".to_string(),
            ));
        }

        let name = Self::read_string(bytes, cursor)?;
        let line_defined = Self::read_u32(bytes, cursor)?;
        let num_params = Self::read_u8(bytes, cursor)?;
        let max_locals = Self::read_u8(bytes, cursor)?;
        if num_params > max_locals {
            return Err(EmberError::MalformedBytecode(format!(
                "{num_params} parameters exceed {max_locals} locals"
            )));
        }

        let constant_count = Self::read_len(bytes, cursor)?;
        let mut constants = Vec::new();
        for _ in 0..constant_count {
            constants.push(Self::read_constant(bytes, cursor)?);
        }

        let code_len = Self::read_len(bytes, cursor)?;
        let code = Self::read_slice(bytes, cursor, code_len)?.to_vec();

        let line_count = Self::read_len(bytes, cursor)?;
        let mut lines = Vec::new();
        for _ in 0..line_count {
            let offset = Self::read_u32(bytes, cursor)?;
            let line = Self::read_u32(bytes, cursor)?;
            lines.push(LineInfo { offset, line });
        }

        let proto_count = Self::read_len(bytes, cursor)?;
        let mut protos = Vec::new();
        for _ in 0..proto_count {
            protos.push(Self::read_proto(bytes, cursor, depth + 1)?);
        }

        let proto = Proto {
            name,
            line_defined,
            num_params,
            max_locals,
            code,
            constants,
            protos,
            lines,
        };
        Self::verify(&proto)?;
        Ok(proto)
    }

    /// Check every operand against the prototype it indexes into
    fn verify(proto: &Proto) -> EmberResult<()> {
        let instructions = decode_all(&proto.code)?;
        let boundaries: HashSet<usize> = instructions.iter().map(|i| i.offset).collect();
        let malformed = |detail: String| Err(EmberError::MalformedBytecode(detail));

        for ins in &instructions {
            match ins.opcode {
                OpCode::Push
                | OpCode::GetGlobal
                | OpCode::SetGlobal
                | OpCode::GetField
                | OpCode::SetField
                | OpCode::Method => {
                    let index = ins.a as usize;
                    let Some(constant) = proto.constants.get(index) else {
                        return malformed(format!("constant {index} out of range at {}", ins.offset));
                    };
                    if ins.opcode != OpCode::Push && !matches!(constant, Constant::Str(_)) {
                        return malformed(format!("non-string name constant at {}", ins.offset));
                    }
                }
                OpCode::LoadLocal | OpCode::StoreLocal => {
                    if ins.a >= proto.max_locals as u16 {
                        return malformed(format!("local {} out of range at {}", ins.a, ins.offset));
                    }
                }
                OpCode::ForPrep | OpCode::ForLoop => {
                    if ins.a + 3 >= proto.max_locals as u16 {
                        return malformed(format!("loop slots out of range at {}", ins.offset));
                    }
                }
                OpCode::Closure => {
                    if ins.a as usize >= proto.protos.len() {
                        return malformed(format!("closure {} out of range at {}", ins.a, ins.offset));
                    }
                }
                OpCode::Call => {
                    if ins.a == MULTRET as u16 {
                        return malformed(format!("variable argument count in CALL at {}", ins.offset));
                    }
                }
                _ => {}
            }
            if let Some(target) = ins.target() {
                if !boundaries.contains(&target) {
                    return Err(EmberError::MalformedBytecode(format!(
                        "invalid jump target {target} at {}",
                        ins.offset
                    )));
                }
            }
        }
        Ok(())
    }

    /// Read a constant value
    fn read_constant(bytes: &[u8], cursor: &mut usize) -> EmberResult<Constant> {
        let tag = Self::read_u8(bytes, cursor)?;

        match tag {
            TAG_NIL => Ok(Constant::Nil),
            TAG_BOOL => {
                let b = Self::read_u8(bytes, cursor)?;
                Ok(Constant::Bool(b != 0))
            }
            TAG_NUMBER => {
                let raw = Self::read_slice(bytes, cursor, 8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                Ok(Constant::Number(f64::from_be_bytes(buf)))
            }
            TAG_INTEGER => {
                let raw = Self::read_slice(bytes, cursor, 8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                Ok(Constant::Integer(i64::from_be_bytes(buf)))
            }
            TAG_STRING => Ok(Constant::Str(Self::read_string(bytes, cursor)?)),
            _ => Err(EmberError::MalformedBytecode(format!(
                "unknown constant tag 0x{tag:02X}"
            ))),
        }
    }

    fn read_string(bytes: &[u8], cursor: &mut usize) -> EmberResult<String> {
        let len = Self::read_len(bytes, cursor)?;
        let raw = Self::read_slice(bytes, cursor, len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| EmberError::MalformedBytecode("string is not utf-8".to_string()))
    }

    fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> EmberResult<&'a [u8]> {
        let end = cursor.checked_add(len).ok_or(EmberError::BytecodeTooShort)?;
        if end > bytes.len() {
            return Err(EmberError::BytecodeTooShort);
        }
        let slice = &bytes[*cursor..end];
        *cursor = end;
        Ok(slice)
    }

    /// Section lengths can never exceed the remaining input
    fn read_len(bytes: &[u8], cursor: &mut usize) -> EmberResult<usize> {
        let len = Self::read_u32(bytes, cursor)? as usize;
        if len > bytes.len() - *cursor {
            return Err(EmberError::BytecodeTooShort);
        }
        Ok(len)
    }

    fn read_u8(bytes: &[u8], cursor: &mut usize) -> EmberResult<u8> {
        if *cursor >= bytes.len() {
            return Err(EmberError::BytecodeTooShort);
        }
        let v = bytes[*cursor];
        *cursor += 1;
        Ok(v)
    }

    fn read_u32(bytes: &[u8], cursor: &mut usize) -> EmberResult<u32> {
        if *cursor + 4 > bytes.len() {
            return Err(EmberError::BytecodeTooShort);
        }
        let v = u32::from_be_bytes([
            bytes[*cursor],
            bytes[*cursor + 1],
            bytes[*cursor + 2],
            bytes[*cursor + 3],
        ]);
        *cursor += 4;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::dump::to_bytes;

    fn sample() -> Proto {
        Proto {
            name: String::new(),
            line_defined: 0,
            num_params: 0,
            max_locals: 1,
            code: vec![
                OpCode::Push as u8, 0, 0,
                OpCode::StoreLocal as u8, 0,
                OpCode::Return as u8, 0,
            ],
            constants: vec![Constant::Number(3.5)],
            protos: Vec::new(),
            lines: vec![LineInfo { offset: 0, line: 1 }],
        }
    }

    #[test]
    fn dumped_proto_loads_back() {
        let proto = sample();
        let loaded = BytecodeLoader::load(&to_bytes(&proto)).expect("load failed");
        assert_eq!(loaded, proto);
    }

    #[test]
    fn loader_rejects_bad_magic() {
        let mut bytes = to_bytes(&sample());
        bytes[1] = b'X';
        assert!(matches!(
            BytecodeLoader::load(&bytes),
            Err(EmberError::InvalidMagicNumber)
        ));
    }

    #[test]
    fn loader_rejects_future_version() {
        let mut bytes = to_bytes(&sample());
        bytes[4] = VERSION_MAJOR + 1;
        assert_eq!(
            BytecodeLoader::load(&bytes),
            Err(EmberError::InvalidBytecodeVersion(VERSION_MAJOR + 1))
        );
    }

    #[test]
    fn loader_rejects_truncation() {
        let bytes = to_bytes(&sample());
        for cut in [10, bytes.len() / 2, bytes.len() - 1] {
            assert!(BytecodeLoader::load(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn loader_rejects_out_of_range_local() {
        let mut proto = sample();
        proto.code[4] = 9;
        assert!(matches!(
            BytecodeLoader::load(&to_bytes(&proto)),
            Err(EmberError::MalformedBytecode(_))
        ));
    }

    #[test]
    fn loader_rejects_jump_into_operand() {
        let mut proto = sample();
        proto.code = vec![OpCode::Jump as u8, 0, 1, OpCode::Return as u8, 0];
        assert!(matches!(
            BytecodeLoader::load(&to_bytes(&proto)),
            Err(EmberError::MalformedBytecode(_))
        ));
    }
}
