//! Virtual Machine Core
//!
//! Defines the Ember virtual machine: call frames over the shared value
//! stack and the instruction dispatch loop.
//!
//! Frame layout on the stack:
//!
//! ```text
//! [callee] [local 0 .. local max_locals-1] [operands ...]
//!          ^ base
//! ```
//!
//! Arguments land in the first locals. On return the results replace the
//! callee slot and everything above it.

use std::fmt;

use tracing::trace;

use crate::bytecode::instruction::Instruction;
use crate::bytecode::opcode::{OpCode, MULTRET};
use crate::config::EmberConfig;
use crate::error::{EmberError, EmberResult};
use crate::host::Host;
use crate::native;

use super::function::FunctionRef;
use super::memory::MemoryTracker;
use super::ops::{self, Arith, Compare};
use super::stack::Stack;
use super::table::{Key, TableRef};
use super::value::Value;

/// Slots every script frame must have free above its locals
const FRAME_HEADROOM: usize = 32;

/// Call frame representing a single script function invocation
#[derive(Debug)]
pub struct CallFrame {
    pub function: FunctionRef,
    pub ip: usize,
    /// Offset of the instruction being executed, for diagnostics
    pub op_start: usize,
    pub base: usize,
    pub nret: u8,
}

impl CallFrame {
    fn operand_base(&self) -> usize {
        self.base + self.function.max_locals as usize
    }
}

enum Flow {
    Continue,
    Call { func_index: usize, nret: u8 },
    Returned,
}

/// Ember Virtual Machine
pub struct VirtualMachine {
    pub(crate) stack: Stack,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) globals: TableRef,
    /// Lowest slot a running native function may pop
    pub(crate) floor: usize,
    /// First slot of the results of the last call that returned every value
    pub(crate) var_base: usize,
    pub(crate) native_depth: usize,
    max_call_depth: usize,
}

impl VirtualMachine {
    /// Create a new VM instance
    pub fn new(config: &EmberConfig, tracker: &MemoryTracker) -> Self {
        VirtualMachine {
            stack: Stack::new(config.max_stack_size),
            frames: Vec::new(),
            globals: TableRef::new(tracker),
            floor: 0,
            var_base: 0,
            native_depth: 0,
            max_call_depth: config.max_call_depth,
        }
    }

    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Script frames plus native calls currently in flight
    pub fn depth(&self) -> usize {
        self.frames.len() + self.native_depth
    }

    pub(crate) fn check_depth(&self) -> EmberResult<()> {
        if self.depth() >= self.max_call_depth {
            return Err(self.runtime_error("stack overflow"));
        }
        Ok(())
    }

    /// `chunk:line:` of the instruction executing in the innermost script frame
    pub fn location(&self) -> Option<String> {
        let frame = self.frames.last()?;
        Some(format!(
            "{}:{}:",
            frame.function.chunk,
            frame.function.line_at(frame.op_start)
        ))
    }

    pub(crate) fn runtime_error(&self, message: impl fmt::Display) -> EmberError {
        match self.location() {
            Some(location) => EmberError::Call(format!("{location} {message}")),
            None => EmberError::Call(message.to_string()),
        }
    }

    /// Push a frame for `function`, whose callee slot is `func_index`
    pub(crate) fn enter(&mut self, function: FunctionRef, func_index: usize, nret: u8) -> EmberResult<()> {
        self.check_depth()?;
        let base = func_index + 1;
        self.stack.truncate(base + function.num_params as usize);
        self.stack.resize(base + function.max_locals as usize);
        self.stack.reserve(FRAME_HEADROOM)?;

        trace!(function = %function.name, base, "enter");
        self.frames.push(CallFrame {
            function,
            ip: 0,
            op_start: 0,
            base,
            nret,
        });
        Ok(())
    }

    /// Move `results` into the callee slot at `func_index`, adjusted to `nret`
    pub(crate) fn place_results(&mut self, func_index: usize, mut results: Vec<Value>, nret: u8) {
        self.stack.truncate(func_index);
        if nret == MULTRET {
            self.var_base = func_index;
        } else {
            results.resize(nret as usize, Value::Nil);
        }
        for value in results {
            self.stack.push(value);
        }
    }

    fn frame(&self) -> EmberResult<&CallFrame> {
        self.frames.last().ok_or(EmberError::StackUnderflow)
    }

    fn frame_mut(&mut self) -> EmberResult<&mut CallFrame> {
        self.frames.last_mut().ok_or(EmberError::StackUnderflow)
    }

    fn fetch(&mut self) -> EmberResult<Instruction> {
        let frame = self.frame_mut()?;
        frame.op_start = frame.ip;
        if frame.ip >= frame.function.code.len() {
            // Falling off the end returns nothing
            return Ok(Instruction {
                offset: frame.ip,
                opcode: OpCode::Return,
                a: 0,
                b: 0,
            });
        }
        let instruction = Instruction::decode(&frame.function.code, frame.ip)?;
        frame.ip = instruction.next_offset();
        Ok(instruction)
    }

    fn constant(&self, index: u16) -> EmberResult<Value> {
        self.frame()?
            .function
            .constants
            .get(index as usize)
            .cloned()
            .ok_or_else(|| EmberError::MalformedBytecode(format!("constant {index} out of range")))
    }

    fn local_slot(&self, index: u16) -> EmberResult<usize> {
        Ok(self.frame()?.base + index as usize)
    }

    fn jump(&mut self, target: u16) -> EmberResult<()> {
        self.frame_mut()?.ip = target as usize;
        Ok(())
    }

    fn pop2(&mut self) -> EmberResult<(Value, Value)> {
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        Ok((a, b))
    }

    /// Read `obj[key]`; strings index the global `string` table
    pub(crate) fn index_value(&self, obj: &Value, key: &Value) -> EmberResult<Value> {
        match obj {
            Value::Table(table) => match Key::from_value(key) {
                Ok(key) => Ok(table.get(&key)),
                Err(_) => Ok(Value::Nil),
            },
            Value::Str(_) => match self.globals.get_str("string") {
                Value::Table(strings) => self.index_value(&Value::Table(strings), key),
                _ => Err(self.runtime_error("attempt to index a string value")),
            },
            other => Err(self.runtime_error(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn set_index(&self, obj: &Value, key: &Value, value: Value) -> EmberResult<()> {
        let Value::Table(table) = obj else {
            return Err(self.runtime_error(format!(
                "attempt to index a {} value",
                obj.type_name()
            )));
        };
        let key = Key::from_value(key).map_err(|message| self.runtime_error(message))?;
        table.set(key, value);
        Ok(())
    }

    fn arith(&mut self, op: Arith) -> EmberResult<()> {
        let (a, b) = self.pop2()?;
        let result = ops::arith(op, &a, &b).map_err(|message| self.runtime_error(message))?;
        self.stack.push(result);
        Ok(())
    }

    fn compare(&mut self, op: Compare, swapped: bool) -> EmberResult<()> {
        let (a, b) = self.pop2()?;
        let (a, b) = if swapped { (b, a) } else { (a, b) };
        let result = ops::compare(op, &a, &b).map_err(|message| self.runtime_error(message))?;
        self.stack.push(Value::Bool(result));
        Ok(())
    }

    fn for_number(&self, value: &Value, what: &str) -> EmberResult<Value> {
        match value {
            Value::Integer(_) | Value::Number(_) => Ok(value.clone()),
            _ => Err(self.runtime_error(format!("'for' {what} must be a number"))),
        }
    }

    /// Validate the loop control slots and decide whether the body runs at all
    fn for_prep(&mut self, base: usize) -> EmberResult<bool> {
        let init = self.for_number(self.stack.get(base)?, "initial value")?;
        let limit = self.for_number(self.stack.get(base + 1)?, "limit")?;
        let step = self.for_number(self.stack.get(base + 2)?, "step")?;

        if let (Value::Integer(init), Value::Integer(step)) = (&init, &step) {
            let (init, step) = (*init, *step);
            if step == 0 {
                return Err(self.runtime_error("'for' step is zero"));
            }
            let limit = match limit {
                Value::Integer(limit) => limit,
                Value::Number(f) if f.is_nan() => return Ok(false),
                Value::Number(f) => {
                    let f = if step > 0 { f.floor() } else { f.ceil() };
                    if f >= 2f64.powi(63) {
                        i64::MAX
                    } else if f < -(2f64.powi(63)) {
                        i64::MIN
                    } else {
                        f as i64
                    }
                }
                _ => return Ok(false),
            };
            if (step > 0 && init > limit) || (step < 0 && init < limit) {
                return Ok(false);
            }
            self.stack.set(base + 1, Value::Integer(limit))?;
            self.stack.set(base + 3, Value::Integer(init))?;
            return Ok(true);
        }

        let (Some(init), Some(limit), Some(step)) =
            (init.as_number(), limit.as_number(), step.as_number())
        else {
            return Ok(false);
        };
        if step == 0.0 {
            return Err(self.runtime_error("'for' step is zero"));
        }
        if (step > 0.0 && init > limit) || (step < 0.0 && init < limit) {
            return Ok(false);
        }
        self.stack.set(base, Value::Number(init))?;
        self.stack.set(base + 1, Value::Number(limit))?;
        self.stack.set(base + 2, Value::Number(step))?;
        self.stack.set(base + 3, Value::Number(init))?;
        Ok(true)
    }

    /// Advance the loop counter; true when the body runs again
    fn for_loop(&mut self, base: usize) -> EmberResult<bool> {
        let next = match (self.stack.get(base)?, self.stack.get(base + 1)?, self.stack.get(base + 2)?) {
            (Value::Integer(index), Value::Integer(limit), Value::Integer(step)) => {
                match index.checked_add(*step) {
                    Some(n) if (*step > 0 && n <= *limit) || (*step < 0 && n >= *limit) => {
                        Value::Integer(n)
                    }
                    _ => return Ok(false),
                }
            }
            (Value::Number(index), Value::Number(limit), Value::Number(step)) => {
                let n = index + step;
                if (*step > 0.0 && n <= *limit) || (*step < 0.0 && n >= *limit) {
                    Value::Number(n)
                } else {
                    return Ok(false);
                }
            }
            _ => return Err(self.runtime_error("'for' control slots corrupted")),
        };
        self.stack.set(base, next.clone())?;
        self.stack.set(base + 3, next)?;
        Ok(true)
    }

    fn do_return(&mut self, count: u8) -> EmberResult<()> {
        let frame = self.frames.pop().ok_or(EmberError::StackUnderflow)?;
        let first = if count == MULTRET {
            frame.operand_base()
        } else {
            self.stack
                .size()
                .checked_sub(count as usize)
                .ok_or(EmberError::StackUnderflow)?
        };
        let results = self.stack.split_off(first);
        self.place_results(frame.base - 1, results, frame.nret);
        Ok(())
    }

    /// Execute a single instruction
    fn step(&mut self, ins: Instruction, tracker: &MemoryTracker) -> EmberResult<Flow> {
        match ins.opcode {
            OpCode::Nop => {}

            // Stack
            OpCode::Nil => self.stack.push(Value::Nil),
            OpCode::True => self.stack.push(Value::Bool(true)),
            OpCode::False => self.stack.push(Value::Bool(false)),
            OpCode::Push => {
                let value = self.constant(ins.a)?;
                self.stack.push(value);
            }
            OpCode::Pop => {
                let len = self
                    .stack
                    .size()
                    .checked_sub(ins.a as usize)
                    .ok_or(EmberError::StackUnderflow)?;
                self.stack.truncate(len);
            }
            OpCode::Dup => self.stack.dup()?,
            OpCode::Swap => self.stack.swap()?,
            OpCode::Rotate => self.stack.rotate()?,

            // Variables
            OpCode::LoadLocal => {
                let value = self.stack.get(self.local_slot(ins.a)?)?.clone();
                self.stack.push(value);
            }
            OpCode::StoreLocal => {
                let value = self.stack.pop()?;
                let slot = self.local_slot(ins.a)?;
                self.stack.set(slot, value)?;
            }
            OpCode::GetGlobal => {
                let name = self.constant(ins.a)?;
                let value = self.index_value(&Value::Table(self.globals.clone()), &name)?;
                self.stack.push(value);
            }
            OpCode::SetGlobal => {
                let name = self.constant(ins.a)?;
                let value = self.stack.pop()?;
                self.set_index(&Value::Table(self.globals.clone()), &name, value)?;
                tracker.check()?;
            }

            // Tables
            OpCode::NewTable => {
                tracker.collect_if_due();
                self.stack.push(Value::Table(TableRef::new(tracker)));
                tracker.check()?;
            }
            OpCode::GetField => {
                let key = self.constant(ins.a)?;
                let obj = self.stack.pop()?;
                let value = self.index_value(&obj, &key)?;
                self.stack.push(value);
            }
            OpCode::SetField => {
                let key = self.constant(ins.a)?;
                let (obj, value) = self.pop2()?;
                self.set_index(&obj, &key, value)?;
                tracker.check()?;
            }
            OpCode::GetIndex => {
                let (obj, key) = self.pop2()?;
                let value = self.index_value(&obj, &key)?;
                self.stack.push(value);
            }
            OpCode::SetIndex => {
                let value = self.stack.pop()?;
                let (obj, key) = self.pop2()?;
                self.set_index(&obj, &key, value)?;
                tracker.check()?;
            }
            OpCode::SetList => {
                let values = self.stack.split_off(self.var_base);
                let table = self.stack.peek()?.clone();
                for (i, value) in values.into_iter().enumerate() {
                    let key = Value::Integer(ins.a as i64 + i as i64);
                    self.set_index(&table, &key, value)?;
                }
                tracker.check()?;
            }
            OpCode::Method => {
                let key = self.constant(ins.a)?;
                let obj = self.stack.pop()?;
                let function = self.index_value(&obj, &key)?;
                self.stack.push(function);
                self.stack.push(obj);
            }

            // Arithmetic
            OpCode::Add => self.arith(Arith::Add)?,
            OpCode::Sub => self.arith(Arith::Sub)?,
            OpCode::Mul => self.arith(Arith::Mul)?,
            OpCode::Div => self.arith(Arith::Div)?,
            OpCode::IDiv => self.arith(Arith::IDiv)?,
            OpCode::Mod => self.arith(Arith::Mod)?,
            OpCode::Pow => self.arith(Arith::Pow)?,
            OpCode::Neg => {
                let value = self.stack.pop()?;
                let result = ops::negate(&value).map_err(|message| self.runtime_error(message))?;
                self.stack.push(result);
            }
            OpCode::Concat => {
                let (a, b) = self.pop2()?;
                let result =
                    ops::concat(&a, &b, tracker).map_err(|message| self.runtime_error(message))?;
                self.stack.push(result);
                tracker.check()?;
            }
            OpCode::Len => {
                let value = self.stack.pop()?;
                let result = ops::length(&value).map_err(|message| self.runtime_error(message))?;
                self.stack.push(result);
            }
            OpCode::Not => {
                let value = self.stack.pop()?;
                self.stack.push(Value::Bool(!value.is_truthy()));
            }

            // Comparison
            OpCode::Equal | OpCode::NotEqual => {
                let (a, b) = self.pop2()?;
                let equal = a.raw_equals(&b);
                self.stack.push(Value::Bool(equal == (ins.opcode == OpCode::Equal)));
            }
            OpCode::Less => self.compare(Compare::Less, false)?,
            OpCode::LessEqual => self.compare(Compare::LessEqual, false)?,
            OpCode::Greater => self.compare(Compare::Less, true)?,
            OpCode::GreaterEqual => self.compare(Compare::LessEqual, true)?,

            // Control flow
            OpCode::Jump => self.jump(ins.a)?,
            OpCode::JumpIfFalse => {
                if !self.stack.pop()?.is_truthy() {
                    self.jump(ins.a)?;
                }
            }
            OpCode::JumpIfFalseOrPop => {
                if self.stack.peek()?.is_truthy() {
                    self.stack.pop()?;
                } else {
                    self.jump(ins.a)?;
                }
            }
            OpCode::JumpIfTrueOrPop => {
                if self.stack.peek()?.is_truthy() {
                    self.jump(ins.a)?;
                } else {
                    self.stack.pop()?;
                }
            }
            OpCode::Call => {
                let func_index = self
                    .stack
                    .size()
                    .checked_sub(ins.a as usize + 1)
                    .ok_or(EmberError::StackUnderflow)?;
                return Ok(Flow::Call {
                    func_index,
                    nret: ins.b as u8,
                });
            }
            OpCode::CallVar => {
                let func_index = self
                    .var_base
                    .checked_sub(ins.a as usize + 1)
                    .ok_or(EmberError::StackUnderflow)?;
                return Ok(Flow::Call {
                    func_index,
                    nret: ins.b as u8,
                });
            }
            OpCode::Return => {
                self.do_return(ins.a as u8)?;
                return Ok(Flow::Returned);
            }
            OpCode::Closure => {
                let child = self
                    .frame()?
                    .function
                    .children
                    .get(ins.a as usize)
                    .cloned()
                    .ok_or_else(|| {
                        EmberError::MalformedBytecode(format!("closure {} out of range", ins.a))
                    })?;
                self.stack.push(Value::Function(child));
            }
            OpCode::ForPrep => {
                let base = self.local_slot(ins.a)?;
                if !self.for_prep(base)? {
                    self.jump(ins.b)?;
                }
            }
            OpCode::ForLoop => {
                let base = self.local_slot(ins.a)?;
                if self.for_loop(base)? {
                    self.jump(ins.b)?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Drop every stack value and frame
    pub(crate) fn teardown(&mut self) {
        self.stack.clear();
        self.frames.clear();
    }
}

impl fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("stack", &self.stack.size())
            .field("frames", &self.frames.len())
            .field("floor", &self.floor)
            .finish()
    }
}

/// Run script frames until the frame count drops back to `stop_depth`
pub(crate) fn execute(host: &mut Host, stop_depth: usize) -> EmberResult<()> {
    loop {
        let ins = host.vm.fetch()?;
        match host.vm.step(ins, &host.memory)? {
            Flow::Continue => {}
            Flow::Call { func_index, nret } => dispatch(host, func_index, nret)?,
            Flow::Returned => {
                if host.vm.frames.len() <= stop_depth {
                    return Ok(());
                }
            }
        }
    }
}

/// Start a call from inside the dispatch loop; script callees get a new frame
fn dispatch(host: &mut Host, func_index: usize, nret: u8) -> EmberResult<()> {
    match host.vm.stack.get(func_index)?.clone() {
        Value::Function(function) => host.vm.enter(function, func_index, nret),
        Value::Native(handle) => native::trampoline(host, &handle, func_index, nret),
        other => Err(host.vm.runtime_error(format!(
            "attempt to call a {} value",
            other.type_name()
        ))),
    }
}

/// Call the value at `func_index` with everything above it as arguments
/// and run it to completion. Results replace the callee and arguments.
pub(crate) fn call_value(host: &mut Host, func_index: usize, nret: u8) -> EmberResult<()> {
    let depth = host.vm.frames.len();
    match host.vm.stack.get(func_index)?.clone() {
        Value::Function(function) => {
            host.vm.enter(function, func_index, nret)?;
            execute(host, depth)
        }
        Value::Native(handle) => native::trampoline(host, &handle, func_index, nret),
        other => Err(EmberError::Call(format!(
            "attempt to call a {} value",
            other.type_name()
        ))),
    }
}
