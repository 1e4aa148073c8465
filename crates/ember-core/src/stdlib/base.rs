use std::io::{self, Write};

use super::{check_table, mismatch, Entry};
use crate::error::{EmberError, EmberResult};
use crate::host::Host;
use crate::native::{Arguments, NativeFn};
use crate::vm::ops::{self, str_to_number};
use crate::vm::table::Key;
use crate::vm::value::Value;

pub(super) const FUNCTIONS: &[Entry] = &[
    ("print", print),
    ("type", type_of),
    ("tostring", tostring),
    ("tonumber", tonumber),
    ("error", error),
    ("assert", assert),
    ("pairs", pairs),
    ("ipairs", ipairs),
    ("next", next),
    ("select", select),
    ("rawget", rawget),
    ("rawset", rawset),
    ("rawequal", rawequal),
    ("rawlen", rawlen),
];

/// Writes its arguments to stdout, tab separated
fn print(_host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let line = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\t");
    let mut out = io::stdout().lock();
    writeln!(out, "{line}")?;
    Ok(0)
}

fn type_of(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let name = args.value(0)?.type_name();
    host.push(name);
    Ok(1)
}

fn tostring(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let text = args.value(0)?.to_string();
    host.push(text);
    Ok(1)
}

fn tonumber(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let value = args.value(0)?;
    let result = match args.opt::<i64>(1)? {
        None => match value {
            Value::Integer(_) | Value::Number(_) => value.clone(),
            Value::Str(s) => str_to_number(s.as_str()).unwrap_or(Value::Nil),
            _ => Value::Nil,
        },
        Some(base) => {
            if !(2..=36).contains(&base) {
                return Err(EmberError::argument(1, "base out of range"));
            }
            let Value::Str(s) = value else {
                return Err(mismatch(0, "string", Some(value)));
            };
            i64::from_str_radix(s.as_str().trim(), base as u32)
                .map(Value::Integer)
                .unwrap_or(Value::Nil)
        }
    };
    host.push(result);
    Ok(1)
}

/// Raises a `Call` error. String messages get the caller's location unless
/// level 0 is requested.
fn error(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let message = args.iter().next().cloned().unwrap_or_default();
    let level = args.opt::<i64>(1)?.unwrap_or(1);
    let text = match (&message, host.vm.location()) {
        (Value::Str(s), Some(location)) if level > 0 => format!("{location} {}", s.as_str()),
        _ => message.to_string(),
    };
    Err(EmberError::Call(text))
}

fn assert(_host: &mut Host, args: Arguments) -> EmberResult<usize> {
    if args.value(0)?.is_truthy() {
        // The arguments are still the topmost values
        return Ok(args.len());
    }
    match args.iter().nth(1) {
        Some(message) => Err(EmberError::Call(message.to_string())),
        None => Err(EmberError::Call("assertion failed!".to_string())),
    }
}

fn pairs(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    host.push(next as NativeFn);
    host.push(table);
    host.push(());
    Ok(3)
}

fn next(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    let key = match args.iter().nth(1) {
        None | Some(Value::Nil) => None,
        Some(value) => Some(Key::from_value(value).map_err(|e| host.vm.runtime_error(e))?),
    };
    let entry = table.borrow().next(key.as_ref());
    match entry.map_err(|e| host.vm.runtime_error(e))? {
        Some((key, value)) => {
            host.push(key.to_value());
            host.push(value);
            Ok(2)
        }
        None => {
            host.push(());
            Ok(1)
        }
    }
}

fn ipairs(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    host.push(ipairs_step as NativeFn);
    host.push(table);
    host.push(0i64);
    Ok(3)
}

fn ipairs_step(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    let index = args.get::<i64>(1)?.wrapping_add(1);
    let value = table.get(&Key::Int(index));
    if value.is_nil() {
        host.push(());
        return Ok(1);
    }
    host.push(index);
    host.push(value);
    Ok(2)
}

fn select(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let extra = args.len().saturating_sub(1);
    if let Some(Value::Str(s)) = args.iter().next() {
        if s.as_str() == "#" {
            host.push(extra as i64);
            return Ok(1);
        }
    }
    let n = super::check_integer(&args, 0)?;
    if n < 0 {
        let back = n.unsigned_abs() as usize;
        if back > extra {
            return Err(EmberError::argument(0, "index out of range"));
        }
        return Ok(back);
    }
    if n == 0 {
        return Err(EmberError::argument(0, "index out of range"));
    }
    Ok(extra.saturating_sub(n as usize - 1))
}

fn rawget(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    let value = match Key::from_value(args.value(1)?) {
        Ok(key) => table.get(&key),
        Err(_) => Value::Nil,
    };
    host.push(value);
    Ok(1)
}

fn rawset(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    let key = Key::from_value(args.value(1)?).map_err(|e| host.vm.runtime_error(e))?;
    table.set(key, args.value(2)?.clone());
    host.memory().check()?;
    host.push(table);
    Ok(1)
}

fn rawequal(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let equal = args.value(0)?.raw_equals(args.value(1)?);
    host.push(equal);
    Ok(1)
}

fn rawlen(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let value = args.value(0)?;
    match value {
        Value::Table(_) | Value::Str(_) => {
            let length = ops::length(value).map_err(EmberError::Call)?;
            host.push(length);
            Ok(1)
        }
        other => Err(EmberError::argument(0, format!("table or string expected, got {}", other.value_type()))),
    }
}
