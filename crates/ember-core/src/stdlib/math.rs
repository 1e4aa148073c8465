use std::f64::consts::PI;

use super::{check_number, float_to_integer, Entry};
use crate::error::{EmberError, EmberResult};
use crate::host::Host;
use crate::native::Arguments;
use crate::vm::ops::{self, Compare};
use crate::vm::value::Value;

pub(super) const FUNCTIONS: &[Entry] = &[
    ("floor", floor),
    ("ceil", ceil),
    ("abs", abs),
    ("sqrt", sqrt),
    ("min", min),
    ("max", max),
    ("tointeger", tointeger),
    ("type", math_type),
];

pub(super) fn open_constants(host: &mut Host) -> EmberResult<()> {
    host.set("math.pi", PI)?;
    host.set("math.huge", f64::INFINITY)?;
    host.set("math.maxinteger", i64::MAX)?;
    host.set("math.mininteger", i64::MIN)
}

/// Float results that fit an integer are returned as integers
fn integral(n: f64) -> Value {
    float_to_integer(n).map_or(Value::Number(n), Value::Integer)
}

fn floor(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let result = match check_number(&args, 0)? {
        Value::Number(n) => integral(n.floor()),
        integer => integer,
    };
    host.push(result);
    Ok(1)
}

fn ceil(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let result = match check_number(&args, 0)? {
        Value::Number(n) => integral(n.ceil()),
        integer => integer,
    };
    host.push(result);
    Ok(1)
}

fn abs(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let result = match check_number(&args, 0)? {
        Value::Integer(i) => Value::Integer(i.wrapping_abs()),
        Value::Number(n) => Value::Number(n.abs()),
        other => other,
    };
    host.push(result);
    Ok(1)
}

fn sqrt(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let n = check_number(&args, 0)?.as_number().unwrap_or(f64::NAN);
    host.push(n.sqrt());
    Ok(1)
}

/// Smallest or largest argument, returned unconverted
fn extremum(args: &Arguments, want_max: bool) -> EmberResult<Value> {
    let mut best = check_number(args, 0)?;
    for index in 1..args.len() {
        let candidate = check_number(args, index)?;
        let (lhs, rhs) = if want_max { (&best, &candidate) } else { (&candidate, &best) };
        if ops::compare(Compare::Less, lhs, rhs).map_err(EmberError::Call)? {
            best = candidate;
        }
    }
    Ok(best)
}

fn min(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let result = extremum(&args, false)?;
    host.push(result);
    Ok(1)
}

fn max(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let result = extremum(&args, true)?;
    host.push(result);
    Ok(1)
}

fn tointeger(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let result = match args.value(0)? {
        Value::Integer(i) => Value::Integer(*i),
        Value::Number(n) => float_to_integer(*n).map_or(Value::Nil, Value::Integer),
        _ => Value::Nil,
    };
    host.push(result);
    Ok(1)
}

/// "integer", "float", or nil for non-numbers
fn math_type(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    match args.value(0)? {
        Value::Integer(_) => host.push("integer"),
        Value::Number(_) => host.push("float"),
        _ => host.push(()),
    }
    Ok(1)
}
