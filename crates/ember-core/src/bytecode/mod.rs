//! Ember bytecode: opcodes, prototypes and the artifact format.
//!
//! Artifact layout (all integers big-endian):
//!
//! ```text
//! magic        u32   0x1B454D42 ("\x1bEMB")
//! version      u8 major, u8 minor, u8 patch, u8 reserved
//! proto        name (u32 len + utf8), line u32, params u8, locals u8,
//!              constants (u32 count + tagged entries),
//!              code (u32 len + bytes), lines (u32 count + offset/line pairs),
//!              nested protos (u32 count + proto...)
//! ```

pub mod disasm;
pub mod dump;
pub mod instruction;
pub mod opcode;
pub mod proto;

pub use instruction::Instruction;
pub use opcode::{OpCode, MULTRET};
pub use proto::{Constant, LineInfo, Proto};

/// Bytecode magic: "\x1bEMB". The escape byte can never start source text.
pub const BYTECODE_MAGIC: u32 = 0x1B45_4D42;

/// Supported bytecode version
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const VERSION_PATCH: u8 = 0;

pub(crate) const TAG_NIL: u8 = 0x00;
pub(crate) const TAG_BOOL: u8 = 0x01;
pub(crate) const TAG_NUMBER: u8 = 0x02;
pub(crate) const TAG_INTEGER: u8 = 0x03;
pub(crate) const TAG_STRING: u8 = 0x04;

/// True when `bytes` carry the bytecode signature rather than source text
pub fn is_bytecode(bytes: &[u8]) -> bool {
    bytes.starts_with(&BYTECODE_MAGIC.to_be_bytes())
}
