//! Value Stack Protocol conversions
//!
//! [`IntoScript`] turns a Rust value into its runtime representation for a
//! push. [`FromScript`] accepts a runtime value only when its dynamic type
//! is exactly the requested one: integers are not numbers, numbers are not
//! integers, and native functions must belong to the popping host.

use super::{Host, HostId};
use crate::native::NativeFn;
use crate::vm::table::TableRef;
use crate::vm::value::{Pointer, Value};

pub trait IntoScript {
    fn into_value(self, host: &mut Host) -> Value;
}

pub trait FromScript: Sized {
    /// Type name used in mismatch diagnostics
    const EXPECTED: &'static str;

    fn from_value(value: &Value, owner: HostId) -> Option<Self>;
}

impl IntoScript for Value {
    fn into_value(self, _host: &mut Host) -> Value {
        self
    }
}

/// Pushes nil
impl IntoScript for () {
    fn into_value(self, _host: &mut Host) -> Value {
        Value::Nil
    }
}

impl IntoScript for bool {
    fn into_value(self, _host: &mut Host) -> Value {
        Value::Bool(self)
    }
}

impl IntoScript for i32 {
    fn into_value(self, _host: &mut Host) -> Value {
        Value::Integer(self as i64)
    }
}

impl IntoScript for i64 {
    fn into_value(self, _host: &mut Host) -> Value {
        Value::Integer(self)
    }
}

impl IntoScript for f32 {
    fn into_value(self, _host: &mut Host) -> Value {
        Value::Number(self as f64)
    }
}

impl IntoScript for f64 {
    fn into_value(self, _host: &mut Host) -> Value {
        Value::Number(self)
    }
}

impl IntoScript for &str {
    fn into_value(self, host: &mut Host) -> Value {
        Value::string(self, &host.memory)
    }
}

impl IntoScript for String {
    fn into_value(self, host: &mut Host) -> Value {
        Value::string(&self, &host.memory)
    }
}

impl IntoScript for Pointer {
    fn into_value(self, _host: &mut Host) -> Value {
        Value::Pointer(self)
    }
}

impl IntoScript for TableRef {
    fn into_value(self, _host: &mut Host) -> Value {
        Value::Table(self)
    }
}

impl IntoScript for NativeFn {
    fn into_value(self, host: &mut Host) -> Value {
        Value::Native(host.natives.intern(self, &host.memory))
    }
}

impl<T: IntoScript> IntoScript for Option<T> {
    fn into_value(self, host: &mut Host) -> Value {
        match self {
            Some(value) => value.into_value(host),
            None => Value::Nil,
        }
    }
}

impl FromScript for Value {
    const EXPECTED: &'static str = "value";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromScript for () {
    const EXPECTED: &'static str = "nil";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        value.is_nil().then_some(())
    }
}

impl FromScript for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromScript for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromScript for i32 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        match value {
            Value::Integer(i) => i32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromScript for f64 {
    const EXPECTED: &'static str = "number";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        match value {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl FromScript for f32 {
    const EXPECTED: &'static str = "number";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        match value {
            Value::Number(n) => Some(*n as f32),
            _ => None,
        }
    }
}

impl FromScript for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromScript for Pointer {
    const EXPECTED: &'static str = "pointer";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        match value {
            Value::Pointer(p) => Some(*p),
            _ => None,
        }
    }
}

impl FromScript for TableRef {
    const EXPECTED: &'static str = "table";

    fn from_value(value: &Value, _owner: HostId) -> Option<Self> {
        match value {
            Value::Table(t) => Some(t.clone()),
            _ => None,
        }
    }
}

impl FromScript for NativeFn {
    const EXPECTED: &'static str = "native function";

    fn from_value(value: &Value, owner: HostId) -> Option<Self> {
        match value {
            Value::Native(handle) if handle.owner() == owner => Some(handle.function()),
            _ => None,
        }
    }
}

/// Nil converts to `None`; anything else must convert to `T`
impl<T: FromScript> FromScript for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: &Value, owner: HostId) -> Option<Self> {
        match value {
            Value::Nil => Some(None),
            other => T::from_value(other, owner).map(Some),
        }
    }
}
