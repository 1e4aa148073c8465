//! Runtime Value Representation
//!
//! Defines the dynamically typed values that live on the value stack,
//! in tables and in constant pools.

use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::rc::Rc;

use super::function::FunctionRef;
use super::memory::{Allocation, MemoryTracker};
use super::table::TableRef;
use crate::native::NativeHandle;

/// Runtime value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,

    Bool(bool),

    Integer(i64),

    /// Floating point number (IEEE 754)
    Number(f64),

    Str(ScriptStr),

    Table(TableRef),

    /// Script function
    Function(FunctionRef),

    /// Native function installed through the trampoline
    Native(NativeHandle),

    /// Opaque host pointer; never dereferenced by the runtime
    Pointer(Pointer),
}

/// Dynamic type tag reported by the runtime for a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Nil,
    Pointer,
    Boolean,
    Integer,
    Number,
    String,
    Table,
    Function,
    NativeFunction,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Nil => "nil",
            ValueType::Pointer => "pointer",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Table => "table",
            ValueType::Function => "function",
            ValueType::NativeFunction => "native function",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Nil => ValueType::Nil,
            Value::Bool(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Number(_) => ValueType::Number,
            Value::Str(_) => ValueType::String,
            Value::Table(_) => ValueType::Table,
            Value::Function(_) => ValueType::Function,
            Value::Native(_) => ValueType::NativeFunction,
            Value::Pointer(_) => ValueType::Pointer,
        }
    }

    /// Name reported to scripts by `type()`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Pointer(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn string(text: &str, tracker: &MemoryTracker) -> Self {
        Value::Str(ScriptStr::new(text, tracker))
    }

    /// Primitive equality: numbers compare by value, everything else by identity
    pub fn raw_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s.as_str()),
            Value::Table(t) => write!(f, "table: {:#x}", t.addr()),
            Value::Function(func) => write!(f, "function: {:#x}", func.addr()),
            Value::Native(native) => write!(f, "function: builtin: {:#x}", native.addr()),
            Value::Pointer(p) => write!(f, "userdata: {:p}", p.as_ptr::<c_void>()),
        }
    }
}

/// Float formatting that keeps an explicit fraction for integral values
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

struct StrObject {
    text: Box<str>,
    _alloc: Allocation,
}

/// Immutable, reference counted script string
#[derive(Clone)]
pub struct ScriptStr(Rc<StrObject>);

impl ScriptStr {
    pub fn new(text: &str, tracker: &MemoryTracker) -> Self {
        let alloc = tracker.allocate(mem::size_of::<StrObject>() + text.len());
        ScriptStr(Rc::new(StrObject {
            text: text.into(),
            _alloc: alloc,
        }))
    }

    pub fn as_str(&self) -> &str {
        &self.0.text
    }

    pub fn len(&self) -> usize {
        self.0.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.text.is_empty()
    }
}

impl PartialEq for ScriptStr {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.as_str() == other.as_str()
    }
}

impl Eq for ScriptStr {}

impl Hash for ScriptStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Debug for ScriptStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// Opaque host pointer carried through the runtime untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer(*mut c_void);

impl Pointer {
    pub fn new<T>(ptr: *mut T) -> Self {
        Pointer(ptr.cast())
    }

    pub fn null() -> Self {
        Pointer(std::ptr::null_mut())
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0.cast()
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_and_floats_compare_by_value() {
        assert_eq!(Value::Integer(1), Value::Number(1.0));
        assert_ne!(Value::Integer(1), Value::Number(1.5));
        assert_ne!(Value::Integer(0), Value::Bool(false));
    }

    #[test]
    fn only_nil_and_false_are_falsy() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::string("", &MemoryTracker::new()).is_truthy());
    }

    #[test]
    fn floats_keep_their_fraction_when_printed() {
        assert_eq!(format_number(3.0), "3.0");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert_eq!(Value::Integer(-7).to_string(), "-7");
    }

    #[test]
    fn strings_are_tracked_until_dropped() {
        let tracker = MemoryTracker::new();
        let s = ScriptStr::new("hello", &tracker);
        assert!(tracker.usage() >= 5);
        let copy = s.clone();
        drop(s);
        assert!(tracker.usage() >= 5);
        drop(copy);
        assert_eq!(tracker.usage(), 0);
    }
}
