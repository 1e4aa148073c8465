//! Ember Configuration
//!
//! Defines runtime limits for a scripting host.
//! Configuration specifies constraints only; enforcement is handled by the VM.

/// Host configuration
#[derive(Debug, Clone)]
pub struct EmberConfig {
    /// Maximum number of value stack slots a script call may occupy
    pub max_stack_size: usize,

    /// Maximum call depth (recursion limit)
    pub max_call_depth: usize,

    /// Upper bound on tracked runtime memory, in bytes
    pub memory_limit: Option<usize>,

    /// Install the base, math, string and table libraries
    pub open_libs: bool,
}

impl Default for EmberConfig {
    fn default() -> Self {
        EmberConfig {
            max_stack_size: 1 << 16,
            max_call_depth: 200,
            memory_limit: None,
            open_libs: true,
        }
    }
}

impl EmberConfig {
    /// Create a new configuration with default limits
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_stack_size(mut self, max_stack_size: usize) -> Self {
        self.max_stack_size = max_stack_size;
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = Some(limit);
        self
    }

    pub fn with_libs(mut self, open_libs: bool) -> Self {
        self.open_libs = open_libs;
        self
    }
}
