//! Standard Libraries
//!
//! Base functions plus the `math`, `string` and `table` modules. Every
//! entry is an ordinary [`NativeFn`] installed through [`Host::expose`], so
//! the libraries exercise the same trampoline path as embedder functions.

mod base;
mod math;
mod string;
mod table;

use tracing::debug;

use crate::error::{EmberError, EmberResult};
use crate::host::Host;
use crate::native::{Arguments, NativeFn};
use crate::vm::table::TableRef;
use crate::vm::value::{format_number, Value};

/// Registration entry: script-visible name and implementation
type Entry = (&'static str, NativeFn);

const MODULES: &[(&str, &[Entry])] = &[
    ("math", math::FUNCTIONS),
    ("string", string::FUNCTIONS),
    ("table", table::FUNCTIONS),
];

/// Install every library into the host's global namespace
pub(crate) fn open(host: &mut Host) -> EmberResult<()> {
    for (name, function) in base::FUNCTIONS {
        host.expose(name, *function)?;
    }
    for (module, functions) in MODULES {
        host.add_module(module)?;
        for (name, function) in *functions {
            host.expose(&format!("{module}.{name}"), *function)?;
        }
    }
    math::open_constants(host)?;

    let globals = host.globals().clone();
    host.set("_G", globals)?;
    debug!(host = %host.id(), "standard libraries opened");
    Ok(())
}

fn mismatch(index: usize, expected: &str, value: Option<&Value>) -> EmberError {
    let found = value.map_or("no value", |v| v.value_type().name());
    EmberError::argument(index, format!("{expected} expected, got {found}"))
}

/// Integer or float argument
fn check_number(args: &Arguments, index: usize) -> EmberResult<Value> {
    match args.iter().nth(index) {
        Some(value @ (Value::Integer(_) | Value::Number(_))) => Ok(value.clone()),
        other => Err(mismatch(index, "number", other)),
    }
}

/// Integer argument; floats with an exact integer value are accepted
fn check_integer(args: &Arguments, index: usize) -> EmberResult<i64> {
    match args.iter().nth(index) {
        Some(Value::Integer(i)) => Ok(*i),
        Some(Value::Number(n)) => float_to_integer(*n).ok_or_else(|| {
            EmberError::argument(index, "number has no integer representation")
        }),
        other => Err(mismatch(index, "number", other)),
    }
}

fn opt_integer(args: &Arguments, index: usize, default: i64) -> EmberResult<i64> {
    match args.iter().nth(index) {
        None | Some(Value::Nil) => Ok(default),
        Some(_) => check_integer(args, index),
    }
}

/// String argument; numbers are converted to their text form
fn check_str(args: &Arguments, index: usize) -> EmberResult<String> {
    match args.iter().nth(index) {
        Some(Value::Str(s)) => Ok(s.as_str().to_string()),
        Some(Value::Integer(i)) => Ok(i.to_string()),
        Some(Value::Number(n)) => Ok(format_number(*n)),
        other => Err(mismatch(index, "string", other)),
    }
}

fn check_table(args: &Arguments, index: usize) -> EmberResult<TableRef> {
    match args.iter().nth(index) {
        Some(Value::Table(table)) => Ok(table.clone()),
        other => Err(mismatch(index, "table", other)),
    }
}

fn float_to_integer(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n >= -(2f64.powi(63)) && n < 2f64.powi(63) {
        Some(n as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn run(source: &str) -> Host {
        let mut host = Host::new();
        host.load("test", source).unwrap();
        host
    }

    #[test]
    fn libraries_are_installed_as_natives() {
        let mut host = Host::new();
        for name in ["print", "math.floor", "string.upper", "table.insert"] {
            let value = host.get::<Value>(name).unwrap();
            assert!(matches!(value, Value::Native(_)), "{name}");
        }
        assert_eq!(host.get::<TableRef>("_G").unwrap(), *host.globals());
    }

    #[test]
    fn base_functions() {
        let mut host = run(
            r##"
            t = type(1) .. type("s") .. type(nil) .. type({})
            n = tonumber("0x10") + tonumber("2.5") + tonumber("11", 2)
            s = tostring(12) .. tostring(1.5) .. tostring(true)
            c = select("#", 1, nil, 3)
            last = select(-1, "a", "b")
            bad = tonumber("nope")
            "##,
        );
        assert_eq!(host.get::<String>("t").unwrap(), "numberstringniltable");
        assert_eq!(host.get::<f64>("n").unwrap(), 21.5);
        assert_eq!(host.get::<String>("s").unwrap(), "121.5true");
        assert_eq!(host.get::<i64>("c").unwrap(), 3);
        assert_eq!(host.get::<String>("last").unwrap(), "b");
        assert_eq!(host.get::<Option<i64>>("bad").unwrap(), None);
    }

    #[test]
    fn pairs_and_ipairs_traverse_in_order() {
        let mut host = run(
            r#"
            local t = {10, 20, 30, x = 1}
            sum = 0
            for i, v in ipairs(t) do sum = sum + i * v end
            keys = ""
            for k in pairs({a = 1, b = 2, c = 3}) do keys = keys .. k end
            "#,
        );
        assert_eq!(host.get::<i64>("sum").unwrap(), 140);
        assert_eq!(host.get::<String>("keys").unwrap(), "abc");
    }

    #[test]
    fn error_carries_the_script_location() {
        let mut host = Host::new();
        let err = host.load("boom.ember", "local x = 1\nerror('bad thing')").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Call);
        assert_eq!(err.to_string(), "boom.ember:2: bad thing");
    }

    #[test]
    fn assert_passes_values_through() {
        let mut host = run("a, b = assert(1, 'two')");
        assert_eq!(host.get::<i64>("a").unwrap(), 1);
        assert_eq!(host.get::<String>("b").unwrap(), "two");

        let err = host.load("t", "assert(false, 'nope')").unwrap_err();
        assert_eq!(err.to_string(), "nope");
        let err = host.load("t", "assert(nil)").unwrap_err();
        assert_eq!(err.to_string(), "assertion failed!");
    }

    #[test]
    fn argument_errors_keep_their_kind() {
        let mut host = Host::new();
        let err = host.load("t", "math.floor('x')").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }
}
