//! Scripting Host
//!
//! A [`Host`] owns one runtime instance: its value stack, global namespace,
//! native registry, memory counter and current-error slot. Native code
//! exchanges values with scripts through [`Host::push`] and [`Host::pop`],
//! installs functions with [`Host::expose`] and drives scripts through
//! [`Host::load`] and [`Host::call`].
//!
//! Every failing operation stores its error in the host's error slot
//! before returning it.

pub mod convert;
pub mod namespace;

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

pub use convert::{FromScript, IntoScript};
pub use namespace::{resolve, Namespace, Resolve, Slot};

use crate::bytecode::{is_bytecode, MULTRET};
use crate::config::EmberConfig;
use crate::error::{EmberError, EmberResult, ErrorKind};
use crate::loader::BytecodeLoader;
use crate::native::{NativeFn, NativeRegistry};
use crate::script;
use crate::stdlib;
use crate::vm::function::Function;
use crate::vm::memory::MemoryTracker;
use crate::vm::table::TableRef;
use crate::vm::value::Value;
use crate::vm::vm::{call_value, VirtualMachine};

static NEXT_HOST_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a host, stamped on every native function it exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostId(u64);

impl HostId {
    pub(crate) fn next() -> Self {
        HostId(NEXT_HOST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Host {
    id: HostId,
    config: EmberConfig,
    pub(crate) vm: VirtualMachine,
    pub(crate) natives: NativeRegistry,
    pub(crate) memory: MemoryTracker,
    last_error: Option<EmberError>,
}

impl Host {
    /// Create a host with default limits and the standard libraries
    pub fn new() -> Self {
        Self::with_config(EmberConfig::default())
    }

    pub fn with_config(config: EmberConfig) -> Self {
        let id = HostId::next();
        let memory = MemoryTracker::new();
        let mut host = Host {
            id,
            vm: VirtualMachine::new(&config, &memory),
            natives: NativeRegistry::new(id),
            memory,
            last_error: None,
            config,
        };
        if host.config.open_libs {
            if let Err(err) = stdlib::open(&mut host) {
                host.report(err);
            }
        }
        host.memory.set_limit(host.config.memory_limit);
        debug!(host = %id, "host created");
        host
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn config(&self) -> &EmberConfig {
        &self.config
    }

    /// The global namespace every qualified name is rooted at
    pub fn globals(&self) -> &TableRef {
        self.vm.globals()
    }

    // Value Stack Protocol

    /// Push `value` onto the top of the stack. Never fails.
    pub fn push<T: IntoScript>(&mut self, value: T) {
        let value = value.into_value(self);
        self.vm.stack.push(value);
    }

    /// Pop the top value if its dynamic type is exactly `T`. On mismatch the
    /// stack is left untouched and a `TypeMismatch` is reported.
    pub fn pop<T: FromScript>(&mut self) -> EmberResult<T> {
        let converted = match self.top() {
            None => Err("no value"),
            Some(value) => T::from_value(value, self.id).ok_or(value.value_type().name()),
        };
        match converted {
            Ok(value) => {
                self.vm.stack.pop()?;
                Ok(value)
            }
            Err(found) => Err(self.report(EmberError::TypeMismatch {
                expected: T::EXPECTED,
                found,
            })),
        }
    }

    fn top(&self) -> Option<&Value> {
        if self.vm.stack.size() > self.vm.floor {
            self.vm.stack.peek().ok()
        } else {
            None
        }
    }

    /// Drop up to `count` values from the top of the stack
    pub fn discard(&mut self, count: usize) {
        let len = self.vm.stack.size().saturating_sub(count).max(self.vm.floor);
        self.vm.stack.truncate(len);
    }

    /// Values currently on the stack. Inside a native function this counts
    /// only the values above that call's arguments floor.
    pub fn stack_depth(&self) -> usize {
        self.vm.stack.size() - self.vm.floor
    }

    // Exposition

    /// Assign `value` to the qualified `name`, creating intermediate tables
    pub fn set<T: IntoScript>(&mut self, name: &str, value: T) -> EmberResult<()> {
        let value = value.into_value(self);
        let (parent, key) = resolve(self.globals(), name, Resolve::Create).map_err(|e| self.report(e))?;
        parent.set_str(key, value);
        self.memory.check().map_err(|e| self.report(e))
    }

    /// Read the qualified `name`. Missing intermediates are not created.
    pub fn get<T: FromScript>(&mut self, name: &str) -> EmberResult<T> {
        let value = self.lookup(name).map_err(|e| self.report(e))?;
        T::from_value(&value, self.id).ok_or_else(|| {
            self.report(EmberError::TypeMismatch {
                expected: T::EXPECTED,
                found: value.value_type().name(),
            })
        })
    }

    fn lookup(&self, name: &str) -> EmberResult<Value> {
        let (parent, key) = resolve(self.globals(), name, Resolve::Lookup)?;
        Ok(parent.get_str(key))
    }

    /// Install `function` as a script-callable value at the qualified `name`
    pub fn expose(&mut self, name: &str, function: NativeFn) -> EmberResult<()> {
        debug!(host = %self.id, name, "expose");
        self.set(name, function)
    }

    /// Ensure a module table exists at the qualified `name`
    pub fn add_module(&mut self, name: &str) -> EmberResult<()> {
        let (parent, key) = resolve(self.globals(), name, Resolve::Create).map_err(|e| self.report(e))?;
        match parent.get_str(key) {
            Value::Table(_) => Ok(()),
            Value::Nil => {
                let module = TableRef::new(&self.memory);
                parent.set_str(key, Value::Table(module));
                Ok(())
            }
            other => Err(self.report(EmberError::name_resolution(
                name,
                format!("already holds a {} value", other.value_type()),
            ))),
        }
    }

    pub fn add_module_function(&mut self, module: &str, name: &str, function: NativeFn) -> EmberResult<()> {
        self.add_module(module)?;
        self.expose(&format!("{module}.{name}"), function)
    }

    // Call/Load Engine

    /// Load source text or a bytecode artifact under the diagnostic tag
    /// `name`, then run it once at top level.
    pub fn load(&mut self, name: &str, code: impl AsRef<[u8]>) -> EmberResult<()> {
        let bytes = code.as_ref();
        debug!(host = %self.id, name, bytes = bytes.len(), "load");

        let proto = if is_bytecode(bytes) {
            BytecodeLoader::load(bytes).map_err(|e| EmberError::Load(format!("{name}: {e}")))
        } else {
            std::str::from_utf8(bytes)
                .map_err(|_| EmberError::Load(format!("{name}: source is not valid utf-8")))
                .and_then(|source| {
                    script::compile(name, source).map_err(|d| EmberError::Load(d.to_string()))
                })
        };
        let proto = proto.map_err(|e| self.report(e))?;

        let chunk: Rc<str> = Rc::from(name);
        let function = Function::instantiate(&proto, &chunk, &self.memory);
        let func_index = self.vm.stack.size();
        self.vm.stack.push(Value::Function(function));
        self.protected_call(func_index, 0).map(|_| ())
    }

    /// Call the function at the qualified `name` with the `num_args` most
    /// recently pushed values. On success the results are left on the stack
    /// and their count returned. On failure the arguments and anything the
    /// call pushed are discarded.
    pub fn call(&mut self, name: &str, num_args: usize) -> EmberResult<usize> {
        debug!(host = %self.id, name, num_args, "call");
        let available = self.stack_depth();
        if num_args > available {
            return Err(self.report(EmberError::Call(format!(
                "cannot call '{name}' with {num_args} arguments, only {available} staged"
            ))));
        }
        let func_index = self.vm.stack.size() - num_args;

        let callee = match self.lookup(name) {
            Ok(Value::Nil) => Err(EmberError::name_resolution(name, "is not defined")),
            other => other,
        };
        let callee = match callee {
            Ok(callee) => callee,
            Err(err) => {
                self.vm.stack.truncate(func_index);
                return Err(self.report(err));
            }
        };

        self.vm.stack.insert(func_index, callee)?;
        self.protected_call(func_index, MULTRET)
    }

    /// Run the callee at `func_index`; failure restores the stack and frames
    fn protected_call(&mut self, func_index: usize, nret: u8) -> EmberResult<usize> {
        let frames = self.vm.frames.len();
        match call_value(self, func_index, nret) {
            Ok(()) => Ok(self.vm.stack.size() - func_index),
            Err(err) => {
                self.vm.stack.truncate(func_index);
                self.vm.frames.truncate(frames);
                let err = match err.kind() {
                    ErrorKind::Load | ErrorKind::Compile | ErrorKind::Io => {
                        EmberError::Call(err.to_string())
                    }
                    _ => err,
                };
                Err(self.report(err))
            }
        }
    }

    // Error channel and memory

    /// Record `err` as the current error and hand it back
    pub(crate) fn report(&mut self, err: EmberError) -> EmberError {
        warn!(host = %self.id, error = %err, "operation failed");
        self.last_error = Some(err.clone());
        err
    }

    pub fn last_error(&self) -> Option<&EmberError> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Bytes currently held by runtime objects
    pub fn memory_usage(&self) -> usize {
        self.memory.usage()
    }

    /// Free tables that scripts can no longer reach but that keep each
    /// other alive. Returns how many tables were released.
    pub fn collect_garbage(&mut self) -> usize {
        let cleared = self.memory.collect();
        debug!(host = %self.id, cleared, "collect garbage");
        cleared
    }

    pub(crate) fn memory(&self) -> &MemoryTracker {
        &self.memory
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id)
            .field("vm", &self.vm)
            .field("natives", &self.natives.len())
            .field("memory", &self.memory.usage())
            .finish()
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.vm.teardown();
        self.memory.release_tables();
        self.natives.clear();
        debug!(host = %self.id, "host destroyed");
    }
}
