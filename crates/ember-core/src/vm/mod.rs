pub(crate) mod collect;
pub mod function;
pub mod memory;
pub mod ops;
pub mod stack;
pub mod table;
pub mod value;
pub mod vm;

pub use function::{Function, FunctionRef};
pub use memory::MemoryTracker;
pub use table::{Key, Table, TableRef};
pub use value::{Pointer, ScriptStr, Value, ValueType};
pub use vm::VirtualMachine;
