//! VM Memory Accounting
//!
//! Every runtime heap object (string, table, function, native record) owns an
//! [`Allocation`] that reports its footprint through a single hook,
//! [`MemoryTracker::realloc`]. The tracker keeps `usage += new - old` current
//! on every allocate, resize and free.
//!
//! The tracker also remembers every table it accounts for, so that table
//! cycles can be collected and all tables released when the host goes away.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::collect;
use super::table::{TableRef, WeakTable};
use crate::error::{EmberError, EmberResult};

/// Usage below which no cycle collection is started
const COLLECT_THRESHOLD: usize = 256 * 1024;

#[derive(Debug, Default)]
struct TrackerState {
    usage: Cell<usize>,
    limit: Cell<Option<usize>>,
    tables: RefCell<Vec<WeakTable>>,
    /// Usage at which the next cycle collection runs
    next_collect: Cell<usize>,
}

/// Shared running counter of live runtime memory
#[derive(Debug, Clone, Default)]
pub struct MemoryTracker {
    state: Rc<TrackerState>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently accounted to live objects
    pub fn usage(&self) -> usize {
        self.state.usage.get()
    }

    pub fn limit(&self) -> Option<usize> {
        self.state.limit.get()
    }

    pub fn set_limit(&self, limit: Option<usize>) {
        self.state.limit.set(limit);
    }

    /// The allocation hook: an object of `old` bytes now occupies `new` bytes.
    /// `old == 0` is an allocation, `new == 0` a free.
    pub fn realloc(&self, old: usize, new: usize) {
        let usage = self.state.usage.get().saturating_sub(old).saturating_add(new);
        self.state.usage.set(usage);
    }

    pub fn allocate(&self, size: usize) -> Allocation {
        self.realloc(0, size);
        Allocation {
            tracker: self.clone(),
            size,
        }
    }

    /// Fails once usage has grown past the configured limit, after a cycle
    /// collection could not bring it back under
    pub fn check(&self) -> EmberResult<()> {
        let Some(limit) = self.limit() else {
            return Ok(());
        };
        if self.usage() > limit {
            self.collect();
            if self.usage() > limit {
                return Err(EmberError::OutOfMemory);
            }
        }
        Ok(())
    }

    pub(crate) fn track(&self, table: WeakTable) {
        let mut tables = self.state.tables.borrow_mut();
        if tables.len() == tables.capacity() {
            tables.retain(WeakTable::is_live);
        }
        tables.push(table);
    }

    /// Every table accounted to this tracker that is still alive
    pub(crate) fn tables(&self) -> Vec<TableRef> {
        let mut tables = self.state.tables.borrow_mut();
        tables.retain(WeakTable::is_live);
        tables.iter().filter_map(WeakTable::upgrade).collect()
    }

    /// Free tables that are kept alive only by cycles among themselves.
    /// Returns how many tables were cleared.
    pub fn collect(&self) -> usize {
        let cleared = collect::collect_cycles(self.tables());
        let next = self.usage().saturating_mul(2).max(COLLECT_THRESHOLD);
        self.state.next_collect.set(next);
        cleared
    }

    /// Collect once usage has doubled since the previous collection
    pub(crate) fn collect_if_due(&self) {
        if self.usage() >= self.state.next_collect.get().max(COLLECT_THRESHOLD) {
            self.collect();
        }
    }

    /// Clear every live table, breaking all cycles
    pub(crate) fn release_tables(&self) {
        collect::release_all(self.tables());
    }
}

/// Footprint of one live object; released when dropped
pub struct Allocation {
    tracker: MemoryTracker,
    size: usize,
}

impl Allocation {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn resize(&mut self, size: usize) {
        self.tracker.realloc(self.size, size);
        self.size = size;
    }

    pub fn tracker(&self) -> &MemoryTracker {
        &self.tracker
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.tracker.realloc(self.size, 0);
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Allocation({} bytes)", self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_follows_allocate_resize_free() {
        let tracker = MemoryTracker::new();
        let mut a = tracker.allocate(100);
        let b = tracker.allocate(20);
        assert_eq!(tracker.usage(), 120);

        a.resize(40);
        assert_eq!(tracker.usage(), 60);

        drop(b);
        assert_eq!(tracker.usage(), 40);
        drop(a);
        assert_eq!(tracker.usage(), 0);
    }

    #[test]
    fn check_fails_past_limit() {
        let tracker = MemoryTracker::new();
        tracker.set_limit(Some(64));
        let _small = tracker.allocate(64);
        assert!(tracker.check().is_ok());
        let _big = tracker.allocate(1);
        assert_eq!(tracker.check(), Err(EmberError::OutOfMemory));
    }

    #[test]
    fn check_collects_before_failing() {
        let tracker = MemoryTracker::new();
        let a = TableRef::new(&tracker);
        a.set_str("me", crate::vm::value::Value::Table(a.clone()));
        drop(a);
        let garbage = tracker.usage();
        assert!(garbage > 0);

        tracker.set_limit(Some(garbage - 1));
        assert!(tracker.check().is_ok());
        assert_eq!(tracker.usage(), 0);
    }

    #[test]
    fn dead_tables_leave_the_registry() {
        let tracker = MemoryTracker::new();
        let kept = TableRef::new(&tracker);
        for _ in 0..100 {
            TableRef::new(&tracker);
        }
        assert_eq!(tracker.tables(), vec![kept]);
    }
}
