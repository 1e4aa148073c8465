//! Read-only view of a native call's arguments.

use crate::error::{EmberError, EmberResult};
use crate::host::{FromScript, HostId};
use crate::vm::value::Value;

/// Arguments of one native call, indexed from 0. Fetching never consumes;
/// the same values also sit on the stack above the call's floor.
#[derive(Debug, Clone)]
pub struct Arguments {
    owner: HostId,
    values: Vec<Value>,
}

impl Arguments {
    pub(crate) fn new(owner: HostId, values: Vec<Value>) -> Self {
        Arguments { owner, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at `index`; missing arguments are an error, not nil
    pub fn value(&self, index: usize) -> EmberResult<&Value> {
        self.values.get(index).ok_or_else(|| {
            EmberError::argument(index, format!("expected a value, got {} arguments", self.len()))
        })
    }

    /// Typed fetch with the same strictness as popping
    pub fn get<T: FromScript>(&self, index: usize) -> EmberResult<T> {
        let value = self.values.get(index).ok_or_else(|| {
            EmberError::argument(index, format!("{} expected, got no value", T::EXPECTED))
        })?;
        T::from_value(value, self.owner).ok_or_else(|| {
            EmberError::argument(
                index,
                format!("{} expected, got {}", T::EXPECTED, value.value_type()),
            )
        })
    }

    /// Like [`Arguments::get`] but a missing or nil argument yields `None`
    pub fn opt<T: FromScript>(&self, index: usize) -> EmberResult<Option<T>> {
        match self.values.get(index) {
            None | Some(Value::Nil) => Ok(None),
            Some(_) => self.get(index).map(Some),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}
