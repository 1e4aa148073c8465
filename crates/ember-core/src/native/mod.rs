//! Native Function Exposition
//!
//! A native function becomes a script value through a [`NativeHandle`]
//! stamped with the owning host. Every call goes through [`trampoline`],
//! which recovers host and function pointer from the handle.

pub mod arguments;
pub mod handle;
pub mod registry;

use std::mem;

use tracing::trace;

pub use arguments::Arguments;
pub use handle::NativeHandle;
pub use registry::NativeRegistry;

use crate::error::EmberResult;
use crate::host::Host;

/// Signature of every function exposed to scripts. Results are pushed onto
/// the host stack; the return value says how many of the topmost values
/// are results.
pub type NativeFn = fn(&mut Host, Arguments) -> EmberResult<usize>;

/// Single entry point for invoking a native function whose callee slot is
/// `func_index`. Arguments stay on the stack above a raised floor so the
/// function may pop them or read them through [`Arguments`].
pub(crate) fn trampoline(
    host: &mut Host,
    handle: &NativeHandle,
    func_index: usize,
    nret: u8,
) -> EmberResult<()> {
    host.natives.check(handle)?;
    host.vm.check_depth()?;

    let base = func_index + 1;
    let args = Arguments::new(host.id(), host.vm.stack.slice_from(base).to_vec());
    trace!(native = handle.fn_addr(), argc = args.len(), "trampoline");

    let saved_floor = mem::replace(&mut host.vm.floor, base);
    host.vm.native_depth += 1;
    let result = (handle.function())(host, args);
    host.vm.native_depth -= 1;
    host.vm.floor = saved_floor;
    let count = result?;

    let available = host.vm.stack.size().saturating_sub(base);
    if count > available {
        return Err(host.vm.runtime_error(format!(
            "native function returned {count} values but left {available} on the stack"
        )));
    }
    let results = host.vm.stack.split_off(host.vm.stack.size() - count);
    host.vm.place_results(func_index, results, nret);
    Ok(())
}
