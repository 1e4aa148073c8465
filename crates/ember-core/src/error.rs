//! Ember Error Types
//!
//! Defines every error condition produced by the Ember host.
//! Host-boundary kinds come first; bytecode and VM faults follow and are
//! classified into one of the boundary kinds by [`EmberError::kind`].

use std::io;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmberError {
    // Host boundary
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("unable to qualify '{name}': {detail}")]
    NameResolution { name: String, detail: String },
    #[error("{0}")]
    Load(String),
    #[error("{0}")]
    Call(String),
    #[error("bad argument at index {index}: {detail}")]
    Argument { index: usize, detail: String },
    #[error("{0}")]
    Compile(String),

    // Bytecode errors
    #[error("invalid bytecode magic number")]
    InvalidMagicNumber,
    #[error("incompatible bytecode version: {0}")]
    InvalidBytecodeVersion(u8),
    #[error("invalid opcode: 0x{0:02X}")]
    InvalidOpcode(u8),
    #[error("malformed bytecode: {0}")]
    MalformedBytecode(String),
    #[error("bytecode is too short")]
    BytecodeTooShort,

    // VM execution errors
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("invalid stack access: {0}")]
    InvalidStackAccess(usize),
    #[error("not enough memory")]
    OutOfMemory,

    // IO boundary
    #[error("io error: {0}")]
    Io(String),
}

/// Coarse classification of an [`EmberError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    NameResolution,
    Load,
    Call,
    Argument,
    Compile,
    Io,
}

impl EmberError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmberError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            EmberError::NameResolution { .. } => ErrorKind::NameResolution,
            EmberError::Load(_)
            | EmberError::InvalidMagicNumber
            | EmberError::InvalidBytecodeVersion(_)
            | EmberError::InvalidOpcode(_)
            | EmberError::MalformedBytecode(_)
            | EmberError::BytecodeTooShort => ErrorKind::Load,
            EmberError::Call(_)
            | EmberError::StackOverflow
            | EmberError::StackUnderflow
            | EmberError::InvalidStackAccess(_)
            | EmberError::OutOfMemory => ErrorKind::Call,
            EmberError::Argument { .. } => ErrorKind::Argument,
            EmberError::Compile(_) => ErrorKind::Compile,
            EmberError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn name_resolution(name: &str, detail: impl Into<String>) -> Self {
        EmberError::NameResolution {
            name: name.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn argument(index: usize, detail: impl Into<String>) -> Self {
        EmberError::Argument {
            index,
            detail: detail.into(),
        }
    }
}

impl From<io::Error> for EmberError {
    fn from(err: io::Error) -> Self {
        EmberError::Io(err.to_string())
    }
}

pub type EmberResult<T> = Result<T, EmberError>;
