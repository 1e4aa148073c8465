//! Script Functions
//!
//! A [`Function`] is a prototype instantiated inside one host: its constants
//! are materialized as runtime values and its footprint is tracked.

use std::fmt;
use std::mem;
use std::rc::Rc;

use super::memory::{Allocation, MemoryTracker};
use super::value::{ScriptStr, Value};
use crate::bytecode::proto::{Constant, LineInfo, Proto};

pub struct Function {
    pub name: String,
    pub chunk: Rc<str>,
    pub line_defined: u32,
    pub num_params: u8,
    pub max_locals: u8,
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    pub children: Vec<FunctionRef>,
    pub lines: Vec<LineInfo>,
    _alloc: Allocation,
}

impl Function {
    /// Materialize `proto` and all nested prototypes
    pub fn instantiate(proto: &Proto, chunk: &Rc<str>, tracker: &MemoryTracker) -> FunctionRef {
        let constants: Vec<Value> = proto
            .constants
            .iter()
            .map(|constant| match constant {
                Constant::Nil => Value::Nil,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Integer(i) => Value::Integer(*i),
                Constant::Number(n) => Value::Number(*n),
                Constant::Str(s) => Value::Str(ScriptStr::new(s, tracker)),
            })
            .collect();
        let children = proto
            .protos
            .iter()
            .map(|child| Function::instantiate(child, chunk, tracker))
            .collect();

        let size = mem::size_of::<Function>()
            + proto.code.len()
            + constants.len() * mem::size_of::<Value>()
            + proto.lines.len() * mem::size_of::<LineInfo>();

        FunctionRef(Rc::new(Function {
            name: proto.name.clone(),
            chunk: chunk.clone(),
            line_defined: proto.line_defined,
            num_params: proto.num_params,
            max_locals: proto.max_locals,
            code: proto.code.clone(),
            constants,
            children,
            lines: proto.lines.clone(),
            _alloc: tracker.allocate(size),
        }))
    }

    /// Source line of the instruction starting at `offset`
    pub fn line_at(&self, offset: usize) -> u32 {
        let offset = offset as u32;
        self.lines
            .iter()
            .take_while(|info| info.offset <= offset)
            .last()
            .map(|info| info.line)
            .unwrap_or(self.line_defined)
    }
}

/// Shared handle to a function; equality uses identity
#[derive(Clone)]
pub struct FunctionRef(Rc<Function>);

impl FunctionRef {
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl std::ops::Deref for FunctionRef {
    type Target = Function;

    fn deref(&self) -> &Function {
        &self.0
    }
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FunctionRef {}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {} ({}:{})", self.name, self.chunk, self.line_defined)
    }
}
