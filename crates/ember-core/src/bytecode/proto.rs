//! Function Prototypes
//!
//! The host-independent compiled form of a function: code, constants,
//! nested prototypes and line information. Produced by the script compiler
//! and by the bytecode loader; serialized by [`super::dump`].

/// Constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Str(String),
}

/// Maps a code offset to the source line it was generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    pub offset: u32,
    pub line: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Proto {
    pub name: String,
    pub line_defined: u32,
    pub num_params: u8,
    /// Parameters plus every local slot the body needs
    pub max_locals: u8,
    pub code: Vec<u8>,
    pub constants: Vec<Constant>,
    pub protos: Vec<Proto>,
    pub lines: Vec<LineInfo>,
}
