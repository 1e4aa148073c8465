//! VM Stack Implementation
//!
//! The single value stack shared by script frames, native calls and the
//! host's push/pop protocol. No execution semantics.

use crate::error::{EmberError, EmberResult};
use super::value::Value;

/// VM value stack
#[derive(Debug)]
pub struct Stack {
    values: Vec<Value>,
    max_size: usize,
}

impl Stack {
    /// Create new stack with a maximum size for script execution
    pub fn new(max_size: usize) -> Self {
        Stack {
            values: Vec::with_capacity(64),
            max_size,
        }
    }

    /// Push value onto stack. Pushing never fails; script frames check
    /// their headroom up front with [`Stack::reserve`].
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Fail if `slots` more values would exceed the maximum size
    pub fn reserve(&self, slots: usize) -> EmberResult<()> {
        if self.values.len() + slots > self.max_size {
            return Err(EmberError::StackOverflow);
        }
        Ok(())
    }

    /// Pop value from stack
    pub fn pop(&mut self) -> EmberResult<Value> {
        self.values.pop().ok_or(EmberError::StackUnderflow)
    }

    /// Peek at top of stack without removing
    pub fn peek(&self) -> EmberResult<&Value> {
        self.values.last().ok_or(EmberError::StackUnderflow)
    }

    /// Duplicate top value
    pub fn dup(&mut self) -> EmberResult<()> {
        let value = self.peek()?.clone();
        self.push(value);
        Ok(())
    }

    /// Exchange the two topmost values
    pub fn swap(&mut self) -> EmberResult<()> {
        let len = self.values.len();
        if len < 2 {
            return Err(EmberError::StackUnderflow);
        }
        self.values.swap(len - 1, len - 2);
        Ok(())
    }

    /// Lift the third value from the top to the top: `[a, b, c] -> [b, c, a]`
    pub fn rotate(&mut self) -> EmberResult<()> {
        let len = self.values.len();
        if len < 3 {
            return Err(EmberError::StackUnderflow);
        }
        let value = self.values.remove(len - 3);
        self.values.push(value);
        Ok(())
    }

    /// Value at an absolute index
    pub fn get(&self, index: usize) -> EmberResult<&Value> {
        self.values
            .get(index)
            .ok_or(EmberError::InvalidStackAccess(index))
    }

    /// Overwrite the value at an absolute index
    pub fn set(&mut self, index: usize, value: Value) -> EmberResult<()> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(EmberError::InvalidStackAccess(index))?;
        *slot = value;
        Ok(())
    }

    /// Place `value` at `index`, shifting everything above it up
    pub fn insert(&mut self, index: usize, value: Value) -> EmberResult<()> {
        if index > self.values.len() {
            return Err(EmberError::InvalidStackAccess(index));
        }
        self.values.insert(index, value);
        Ok(())
    }

    /// Values from `start` to the top
    pub fn slice_from(&self, start: usize) -> &[Value] {
        self.values.get(start..).unwrap_or(&[])
    }

    /// Remove and return every value from `start` to the top
    pub fn split_off(&mut self, start: usize) -> Vec<Value> {
        if start >= self.values.len() {
            return Vec::new();
        }
        self.values.split_off(start)
    }

    /// Shrink to `len` values, or pad with nil up to it
    pub fn resize(&mut self, len: usize) {
        self.values.resize(len, Value::Nil);
    }

    /// Drop everything above `len`
    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    /// Get current stack size
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Check if stack is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Clear stack
    pub fn clear(&mut self) {
        self.values.clear();
    }
}
