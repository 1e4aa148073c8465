//! Bytecode Opcode Definitions
//!
//! Defines the raw opcode set for Ember bytecode.
//! This file contains no execution semantics.
//! Opcode values are an eternal contract.

/// Operand value meaning "every value produced" for call/return counts
pub const MULTRET: u8 = 0xFF;

/// Bytecode opcodes (v1)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    // Stack operations
    Nil    = 0x01,
    True   = 0x02,
    False  = 0x03,
    Push   = 0x04,
    Pop    = 0x05,
    Dup    = 0x06,
    Swap   = 0x07,
    Rotate = 0x08,

    // Variable access
    LoadLocal  = 0x10,
    StoreLocal = 0x11,
    GetGlobal  = 0x12,
    SetGlobal  = 0x13,

    // Tables
    NewTable = 0x18,
    GetField = 0x19,
    SetField = 0x1A,
    GetIndex = 0x1B,
    SetIndex = 0x1C,
    Method   = 0x1D,
    SetList  = 0x1E,

    // Arithmetic
    Add    = 0x20,
    Sub    = 0x21,
    Mul    = 0x22,
    Div    = 0x23,
    IDiv   = 0x24,
    Mod    = 0x25,
    Pow    = 0x26,
    Neg    = 0x27,
    Concat = 0x28,
    Len    = 0x29,
    Not    = 0x2A,

    // Comparison
    Equal        = 0x30,
    NotEqual     = 0x31,
    Less         = 0x32,
    LessEqual    = 0x33,
    Greater      = 0x34,
    GreaterEqual = 0x35,

    // Control flow
    Jump             = 0x40,
    JumpIfFalse      = 0x41,
    JumpIfFalseOrPop = 0x42,
    JumpIfTrueOrPop  = 0x43,
    Call             = 0x48,
    CallVar          = 0x49,
    Return           = 0x4A,
    Closure          = 0x4B,
    ForPrep          = 0x50,
    ForLoop          = 0x51,

    // System
    Nop = 0xF0,
}

/// Shape of the immediate operands that follow an opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    None,
    /// One byte
    U8,
    /// Big-endian u16
    U16,
    /// Two single bytes
    U8U8,
    /// One byte then a big-endian u16
    U8U16,
}

impl Operands {
    pub fn len(self) -> usize {
        match self {
            Operands::None => 0,
            Operands::U8 => 1,
            Operands::U16 | Operands::U8U8 => 2,
            Operands::U8U16 => 3,
        }
    }
}

impl OpCode {
    /// Convert raw byte to opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(OpCode::Nil),
            0x02 => Some(OpCode::True),
            0x03 => Some(OpCode::False),
            0x04 => Some(OpCode::Push),
            0x05 => Some(OpCode::Pop),
            0x06 => Some(OpCode::Dup),
            0x07 => Some(OpCode::Swap),
            0x08 => Some(OpCode::Rotate),

            0x10 => Some(OpCode::LoadLocal),
            0x11 => Some(OpCode::StoreLocal),
            0x12 => Some(OpCode::GetGlobal),
            0x13 => Some(OpCode::SetGlobal),

            0x18 => Some(OpCode::NewTable),
            0x19 => Some(OpCode::GetField),
            0x1A => Some(OpCode::SetField),
            0x1B => Some(OpCode::GetIndex),
            0x1C => Some(OpCode::SetIndex),
            0x1D => Some(OpCode::Method),
            0x1E => Some(OpCode::SetList),

            0x20 => Some(OpCode::Add),
            0x21 => Some(OpCode::Sub),
            0x22 => Some(OpCode::Mul),
            0x23 => Some(OpCode::Div),
            0x24 => Some(OpCode::IDiv),
            0x25 => Some(OpCode::Mod),
            0x26 => Some(OpCode::Pow),
            0x27 => Some(OpCode::Neg),
            0x28 => Some(OpCode::Concat),
            0x29 => Some(OpCode::Len),
            0x2A => Some(OpCode::Not),

            0x30 => Some(OpCode::Equal),
            0x31 => Some(OpCode::NotEqual),
            0x32 => Some(OpCode::Less),
            0x33 => Some(OpCode::LessEqual),
            0x34 => Some(OpCode::Greater),
            0x35 => Some(OpCode::GreaterEqual),

            0x40 => Some(OpCode::Jump),
            0x41 => Some(OpCode::JumpIfFalse),
            0x42 => Some(OpCode::JumpIfFalseOrPop),
            0x43 => Some(OpCode::JumpIfTrueOrPop),
            0x48 => Some(OpCode::Call),
            0x49 => Some(OpCode::CallVar),
            0x4A => Some(OpCode::Return),
            0x4B => Some(OpCode::Closure),
            0x50 => Some(OpCode::ForPrep),
            0x51 => Some(OpCode::ForLoop),

            0xF0 => Some(OpCode::Nop),

            _ => None,
        }
    }

    pub fn operands(self) -> Operands {
        match self {
            OpCode::Pop | OpCode::LoadLocal | OpCode::StoreLocal | OpCode::Return => Operands::U8,

            OpCode::Push
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::GetField
            | OpCode::SetField
            | OpCode::Method
            | OpCode::SetList
            | OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::JumpIfFalseOrPop
            | OpCode::JumpIfTrueOrPop
            | OpCode::Closure => Operands::U16,

            OpCode::Call | OpCode::CallVar => Operands::U8U8,

            OpCode::ForPrep | OpCode::ForLoop => Operands::U8U16,

            _ => Operands::None,
        }
    }

    /// Mnemonic used by the disassembler
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Nil => "NIL",
            OpCode::True => "TRUE",
            OpCode::False => "FALSE",
            OpCode::Push => "PUSH",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::Swap => "SWAP",
            OpCode::Rotate => "ROTATE",
            OpCode::LoadLocal => "LOADLOCAL",
            OpCode::StoreLocal => "STORELOCAL",
            OpCode::GetGlobal => "GETGLOBAL",
            OpCode::SetGlobal => "SETGLOBAL",
            OpCode::NewTable => "NEWTABLE",
            OpCode::GetField => "GETFIELD",
            OpCode::SetField => "SETFIELD",
            OpCode::GetIndex => "GETINDEX",
            OpCode::SetIndex => "SETINDEX",
            OpCode::Method => "METHOD",
            OpCode::SetList => "SETLIST",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::IDiv => "IDIV",
            OpCode::Mod => "MOD",
            OpCode::Pow => "POW",
            OpCode::Neg => "NEG",
            OpCode::Concat => "CONCAT",
            OpCode::Len => "LEN",
            OpCode::Not => "NOT",
            OpCode::Equal => "EQ",
            OpCode::NotEqual => "NE",
            OpCode::Less => "LT",
            OpCode::LessEqual => "LE",
            OpCode::Greater => "GT",
            OpCode::GreaterEqual => "GE",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMPIFFALSE",
            OpCode::JumpIfFalseOrPop => "JUMPIFFALSEORPOP",
            OpCode::JumpIfTrueOrPop => "JUMPIFTRUEORPOP",
            OpCode::Call => "CALL",
            OpCode::CallVar => "CALLVAR",
            OpCode::Return => "RETURN",
            OpCode::Closure => "CLOSURE",
            OpCode::ForPrep => "FORPREP",
            OpCode::ForLoop => "FORLOOP",
            OpCode::Nop => "NOP",
        }
    }
}
