//! Native function handles
//!
//! The tagged callable a script sees when it holds a native function: the
//! owning host's identity paired with the exact function pointer, behind a
//! stable reference-counted handle.

use std::fmt;
use std::mem;
use std::rc::Rc;

use super::NativeFn;
use crate::host::HostId;
use crate::vm::memory::{Allocation, MemoryTracker};

pub struct NativeRecord {
    pub owner: HostId,
    pub function: NativeFn,
    _alloc: Allocation,
}

/// Stable handle to a [`NativeRecord`]; equality uses identity
#[derive(Clone)]
pub struct NativeHandle(Rc<NativeRecord>);

impl NativeHandle {
    pub(crate) fn new(owner: HostId, function: NativeFn, tracker: &MemoryTracker) -> Self {
        NativeHandle(Rc::new(NativeRecord {
            owner,
            function,
            _alloc: tracker.allocate(mem::size_of::<NativeRecord>()),
        }))
    }

    pub fn owner(&self) -> HostId {
        self.0.owner
    }

    pub fn function(&self) -> NativeFn {
        self.0.function
    }

    /// Address of the wrapped function pointer
    pub fn fn_addr(&self) -> usize {
        self.0.function as usize
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for NativeHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NativeHandle {}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native {:#x} (host {})", self.fn_addr(), self.owner())
    }
}
