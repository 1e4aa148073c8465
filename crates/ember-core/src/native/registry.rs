//! Native Function Registry
//!
//! Per-host table of native handles keyed by function pointer. Interning
//! means a function exposed under several names, or pushed repeatedly,
//! is always the same script value.

use std::collections::HashMap;

use super::handle::NativeHandle;
use super::NativeFn;
use crate::error::{EmberError, EmberResult};
use crate::host::HostId;
use crate::vm::memory::MemoryTracker;

#[derive(Debug)]
pub struct NativeRegistry {
    owner: HostId,
    handles: HashMap<usize, NativeHandle>,
}

impl NativeRegistry {
    pub fn new(owner: HostId) -> Self {
        NativeRegistry {
            owner,
            handles: HashMap::new(),
        }
    }

    /// Handle for `function`, created on first use
    pub fn intern(&mut self, function: NativeFn, tracker: &MemoryTracker) -> NativeHandle {
        let owner = self.owner;
        self.handles
            .entry(function as usize)
            .or_insert_with(|| NativeHandle::new(owner, function, tracker))
            .clone()
    }

    /// True when `handle` was issued by this registry
    pub fn owns(&self, handle: &NativeHandle) -> bool {
        handle.owner() == self.owner
            && self
                .handles
                .get(&handle.fn_addr())
                .is_some_and(|known| known == handle)
    }

    /// Check a handle before dispatch and fail closed if it is foreign
    pub fn check(&self, handle: &NativeHandle) -> EmberResult<()> {
        if self.owns(handle) {
            Ok(())
        } else {
            Err(EmberError::Call(format!(
                "native function of host {} called from host {}",
                handle.owner(),
                self.owner
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.handles.clear();
    }
}
