//! Ember - Embedded Scripting Host
//!
//! Public API surface for the Ember core: a [`Host`] that exchanges typed
//! values with scripts over a shared stack, exposes native functions at
//! qualified names and runs source or precompiled bytecode, plus the
//! offline [`compile`] pipeline.

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod error;
pub mod host;
pub mod loader;
pub mod native;
pub mod script;
pub mod vm;

mod stdlib;

// Re-export commonly used types
pub use bytecode::opcode::OpCode;
pub use compiler::{compile, compile_to_writer};
pub use config::EmberConfig;
pub use error::{EmberError, EmberResult, ErrorKind};
pub use host::{FromScript, Host, HostId, IntoScript};
pub use loader::BytecodeLoader;
pub use native::{Arguments, NativeFn};
pub use vm::table::TableRef;
pub use vm::value::{Pointer, Value, ValueType};
