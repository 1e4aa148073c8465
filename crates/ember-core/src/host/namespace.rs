//! Qualified Name Resolver
//!
//! Walks a dot-delimited path such as `a.b.c` through nested containers.
//! Every segment but the last must name a container; the last segment is
//! handed back unresolved together with its parent so the caller can get,
//! set or define it.

use crate::error::{EmberError, EmberResult};
use crate::vm::table::TableRef;
use crate::vm::value::{Value, ValueType};

/// What a container holds under one key
#[derive(Debug)]
pub enum Slot<N> {
    Vacant,
    Container(N),
    Value(ValueType),
}

/// Whether missing intermediate containers are created or reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolve {
    Create,
    Lookup,
}

/// A container that qualified names can be resolved through
pub trait Namespace: Clone {
    fn slot(&self, key: &str) -> Slot<Self>;

    /// Insert a fresh empty container under `key` and return it
    fn insert_child(&self, key: &str) -> EmberResult<Self>;
}

/// Resolve `name` below `root`, returning the parent container of the last
/// segment and the segment itself. A name without `.` resolves to `root`.
pub fn resolve<'n, N: Namespace>(root: &N, name: &'n str, mode: Resolve) -> EmberResult<(N, &'n str)> {
    let Some((path, last)) = name.rsplit_once('.') else {
        return Ok((root.clone(), name));
    };

    let mut current = root.clone();
    for segment in path.split('.') {
        current = match current.slot(segment) {
            Slot::Container(child) => child,
            Slot::Vacant if mode == Resolve::Create => current.insert_child(segment)?,
            Slot::Vacant => {
                return Err(EmberError::name_resolution(
                    name,
                    format!("'{segment}' is not defined"),
                ))
            }
            Slot::Value(found) => {
                return Err(EmberError::name_resolution(
                    name,
                    format!("'{segment}' holds a {found} value, not a table"),
                ))
            }
        };
    }
    Ok((current, last))
}

impl Namespace for TableRef {
    fn slot(&self, key: &str) -> Slot<Self> {
        match self.get_str(key) {
            Value::Nil => Slot::Vacant,
            Value::Table(table) => Slot::Container(table),
            other => Slot::Value(other.value_type()),
        }
    }

    fn insert_child(&self, key: &str) -> EmberResult<Self> {
        let child = TableRef::new(self.borrow().tracker());
        self.set_str(key, Value::Table(child.clone()));
        Ok(child)
    }
}
