//! Script Tables
//!
//! Insertion-ordered associative arrays. Tables double as the namespace
//! containers that qualified names are resolved through.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::rc::{Rc, Weak};

use indexmap::{Equivalent, IndexMap};

use super::function::FunctionRef;
use super::memory::{Allocation, MemoryTracker};
use super::value::{Pointer, ScriptStr, Value};
use crate::native::NativeHandle;

const ENTRY_SIZE: usize = mem::size_of::<(Key, Value)>() + mem::size_of::<usize>();

/// Hashable table key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Bool(bool),
    Int(i64),
    /// Non-integral float, stored by bit pattern
    Float(u64),
    Str(ScriptStr),
    Table(TableRef),
    Function(FunctionRef),
    Native(NativeHandle),
    Pointer(Pointer),
}

impl Key {
    /// Integral floats normalize to integer keys; nil and NaN are rejected.
    pub fn from_value(value: &Value) -> Result<Key, &'static str> {
        Ok(match value {
            Value::Nil => return Err("table index is nil"),
            Value::Bool(b) => Key::Bool(*b),
            Value::Integer(i) => Key::Int(*i),
            Value::Number(n) if n.is_nan() => return Err("table index is NaN"),
            Value::Number(n) => {
                if n.fract() == 0.0 && *n >= -(2f64.powi(63)) && *n < 2f64.powi(63) {
                    Key::Int(*n as i64)
                } else {
                    Key::Float(n.to_bits())
                }
            }
            Value::Str(s) => Key::Str(s.clone()),
            Value::Table(t) => Key::Table(t.clone()),
            Value::Function(f) => Key::Function(f.clone()),
            Value::Native(n) => Key::Native(n.clone()),
            Value::Pointer(p) => Key::Pointer(*p),
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Integer(*i),
            Key::Float(bits) => Value::Number(f64::from_bits(*bits)),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Table(t) => Value::Table(t.clone()),
            Key::Function(f) => Value::Function(f.clone()),
            Key::Native(n) => Value::Native(n.clone()),
            Key::Pointer(p) => Value::Pointer(*p),
        }
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Bool(b) => {
                0u8.hash(state);
                b.hash(state);
            }
            Key::Int(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Key::Float(bits) => {
                2u8.hash(state);
                bits.hash(state);
            }
            Key::Str(s) => {
                3u8.hash(state);
                s.as_str().hash(state);
            }
            Key::Table(t) => {
                4u8.hash(state);
                t.addr().hash(state);
            }
            Key::Function(f) => {
                5u8.hash(state);
                f.addr().hash(state);
            }
            Key::Native(n) => {
                6u8.hash(state);
                n.addr().hash(state);
            }
            Key::Pointer(p) => {
                7u8.hash(state);
                p.hash(state);
            }
        }
    }
}

/// Borrowed string lookup that hashes like `Key::Str`
struct StrKey<'a>(&'a str);

impl Hash for StrKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        3u8.hash(state);
        self.0.hash(state);
    }
}

impl Equivalent<Key> for StrKey<'_> {
    fn equivalent(&self, key: &Key) -> bool {
        matches!(key, Key::Str(s) if s.as_str() == self.0)
    }
}

/// Table storage. Assigning nil to a present key leaves a cleared slot so
/// that traversal with `next` survives clearing fields mid-iteration;
/// cleared slots are compacted away by a later insert once they make up
/// half the entries.
pub struct Table {
    entries: IndexMap<Key, Value>,
    cleared: usize,
    /// `t[1..=border]` are all non-nil and `t[border + 1]` is nil
    border: i64,
    alloc: Allocation,
}

impl Table {
    fn footprint(entries: usize) -> usize {
        mem::size_of::<Table>() + entries * ENTRY_SIZE
    }

    pub fn get(&self, key: &Key) -> Value {
        self.entries.get(key).cloned().unwrap_or(Value::Nil)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.entries.get(&StrKey(key)).cloned().unwrap_or(Value::Nil)
    }

    pub fn get_int(&self, key: i64) -> Value {
        self.get(&Key::Int(key))
    }

    pub fn set(&mut self, key: Key, value: Value) {
        let index = match key {
            Key::Int(i) => Some(i),
            _ => None,
        };
        let present = !value.is_nil();

        match self.entries.get_mut(&key) {
            Some(slot) => {
                match (slot.is_nil(), present) {
                    (false, false) => self.cleared += 1,
                    (true, true) => self.cleared -= 1,
                    _ => {}
                }
                *slot = value;
            }
            None if !present => return,
            None => {
                if self.cleared * 2 >= self.entries.len() && self.cleared > 0 {
                    self.compact();
                }
                self.entries.insert(key, value);
                self.alloc.resize(Self::footprint(self.entries.len()));
            }
        }

        if let Some(index) = index {
            self.update_border(index, present);
        }
    }

    /// Drop cleared slots. Keys removed here are no longer valid for `next`.
    fn compact(&mut self) {
        self.entries.retain(|_, value| !value.is_nil());
        self.cleared = 0;
        self.alloc.resize(Self::footprint(self.entries.len()));
    }

    fn update_border(&mut self, index: i64, present: bool) {
        if !present {
            if (1..=self.border).contains(&index) {
                self.border = index - 1;
            }
            return;
        }
        if self.border.checked_add(1) != Some(index) {
            return;
        }
        let mut border = index;
        while let Some(next) = border.checked_add(1) {
            if self.get_int(next).is_nil() {
                break;
            }
            border = next;
        }
        self.border = border;
    }

    /// Border of the array part: the largest `n` with `t[1..=n]` all non-nil
    pub fn len(&self) -> i64 {
        self.border
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == self.cleared
    }

    /// Entry following `key` in insertion order, skipping cleared slots.
    /// `None` as key starts the traversal; `Err` means the key is not present.
    pub fn next(&self, key: Option<&Key>) -> Result<Option<(Key, Value)>, &'static str> {
        let start = match key {
            None => 0,
            Some(key) => match self.entries.get_index_of(key) {
                Some(index) => index + 1,
                None => return Err("invalid key to 'next'"),
            },
        };
        for index in start..self.entries.len() {
            if let Some((k, v)) = self.entries.get_index(index) {
                if !v.is_nil() {
                    return Ok(Some((k.clone(), v.clone())));
                }
            }
        }
        Ok(None)
    }

    /// Drops every entry, breaking reference cycles through this table
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cleared = 0;
        self.border = 0;
        self.alloc.resize(Self::footprint(0));
    }

    pub fn tracker(&self) -> &MemoryTracker {
        self.alloc.tracker()
    }

    /// Visit every table referenced from a key or value of this table
    pub(crate) fn for_each_table(&self, mut visit: impl FnMut(&TableRef)) {
        for (key, value) in &self.entries {
            if let Key::Table(table) = key {
                visit(table);
            }
            if let Value::Table(table) = value {
                visit(table);
            }
        }
    }
}

/// Shared handle to a table; equality and hashing use identity
#[derive(Clone)]
pub struct TableRef(Rc<RefCell<Table>>);

impl TableRef {
    pub fn new(tracker: &MemoryTracker) -> Self {
        let alloc = tracker.allocate(Table::footprint(0));
        let table = Rc::new(RefCell::new(Table {
            entries: IndexMap::new(),
            cleared: 0,
            border: 0,
            alloc,
        }));
        tracker.track(WeakTable(Rc::downgrade(&table)));
        TableRef(table)
    }

    pub fn borrow(&self) -> Ref<'_, Table> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    pub fn get(&self, key: &Key) -> Value {
        self.borrow().get(key)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.borrow().get_str(key)
    }

    pub fn set(&self, key: Key, value: Value) {
        self.borrow_mut().set(key, value);
    }

    pub fn set_str(&self, key: &str, value: Value) {
        let key = Key::Str(ScriptStr::new(key, self.borrow().tracker()));
        self.set(key, value);
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn try_borrow(&self) -> Option<Ref<'_, Table>> {
        self.0.try_borrow().ok()
    }

    pub(crate) fn try_borrow_mut(&self) -> Option<RefMut<'_, Table>> {
        self.0.try_borrow_mut().ok()
    }

    /// Handles to this table currently alive, including this one
    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

/// Non-owning handle the memory tracker keeps for every table it accounts
pub(crate) struct WeakTable(Weak<RefCell<Table>>);

impl WeakTable {
    pub(crate) fn upgrade(&self) -> Option<TableRef> {
        self.0.upgrade().map(TableRef)
    }

    pub(crate) fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakTable({})", if self.is_live() { "live" } else { "dead" })
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TableRef {}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table: {:#x}", self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_float_keys_alias_integer_keys() {
        let tracker = MemoryTracker::new();
        let t = TableRef::new(&tracker);
        t.set(Key::from_value(&Value::Number(2.0)).unwrap(), Value::Bool(true));
        assert_eq!(t.get(&Key::Int(2)), Value::Bool(true));
    }

    #[test]
    fn nil_and_nan_keys_are_rejected() {
        assert!(Key::from_value(&Value::Nil).is_err());
        assert!(Key::from_value(&Value::Number(f64::NAN)).is_err());
    }

    #[test]
    fn string_lookup_without_allocating_a_key() {
        let tracker = MemoryTracker::new();
        let t = TableRef::new(&tracker);
        t.set_str("answer", Value::Integer(42));
        assert_eq!(t.get_str("answer"), Value::Integer(42));
        assert!(t.get_str("question").is_nil());
    }

    #[test]
    fn border_and_traversal_skip_cleared_entries() {
        let tracker = MemoryTracker::new();
        let t = TableRef::new(&tracker);
        for i in 1..=3 {
            t.set(Key::Int(i), Value::Integer(i * 10));
        }
        assert_eq!(t.borrow().len(), 3);

        t.set(Key::Int(2), Value::Nil);
        assert_eq!(t.borrow().len(), 1);

        let table = t.borrow();
        let (k1, _) = table.next(None).unwrap().unwrap();
        let (k3, v3) = table.next(Some(&k1)).unwrap().unwrap();
        assert_eq!(k3, Key::Int(3));
        assert_eq!(v3, Value::Integer(30));
        assert!(table.next(Some(&k3)).unwrap().is_none());
    }

    #[test]
    fn growth_is_reported_to_the_tracker() {
        let tracker = MemoryTracker::new();
        let t = TableRef::new(&tracker);
        let empty = tracker.usage();
        t.set(Key::Int(1), Value::Bool(true));
        assert!(tracker.usage() > empty);
        drop(t);
        assert_eq!(tracker.usage(), 0);
    }

    #[test]
    fn key_churn_does_not_grow_the_table() {
        let tracker = MemoryTracker::new();
        let t = TableRef::new(&tracker);
        let before = tracker.usage();
        for i in 1..=10_000 {
            t.set(Key::Int(i), Value::Bool(true));
            t.set(Key::Int(i), Value::Nil);
        }
        assert!(tracker.usage() <= before + ENTRY_SIZE);
        assert!(t.borrow().is_empty());
        assert_eq!(t.borrow().len(), 0);
    }

    #[test]
    fn compaction_releases_cleared_table_keys() {
        let tracker = MemoryTracker::new();
        let t = TableRef::new(&tracker);
        let key = TableRef::new(&tracker);
        t.set(Key::Table(key.clone()), Value::Bool(true));
        t.set(Key::Table(key.clone()), Value::Nil);
        assert_eq!(Rc::strong_count(&key.0), 2);

        t.set_str("other", Value::Integer(1));
        assert_eq!(Rc::strong_count(&key.0), 1);
        assert_eq!(t.get_str("other"), Value::Integer(1));
    }

    #[test]
    fn border_follows_appends_and_removals() {
        let tracker = MemoryTracker::new();
        let t = TableRef::new(&tracker);
        t.set(Key::Int(3), Value::Integer(3));
        assert_eq!(t.borrow().len(), 0);
        t.set(Key::Int(1), Value::Integer(1));
        assert_eq!(t.borrow().len(), 1);
        t.set(Key::Int(2), Value::Integer(2));
        assert_eq!(t.borrow().len(), 3);

        for i in 4..=1000 {
            t.set(Key::Int(i), Value::Integer(i));
        }
        assert_eq!(t.borrow().len(), 1000);
        t.set(Key::Int(1000), Value::Nil);
        assert_eq!(t.borrow().len(), 999);
        t.set(Key::Int(500), Value::Nil);
        assert_eq!(t.borrow().len(), 499);
        t.set(Key::Int(500), Value::Integer(500));
        assert_eq!(t.borrow().len(), 999);
        t.set(Key::Int(i64::MAX), Value::Bool(true));
        assert_eq!(t.borrow().len(), 999);
    }
}
