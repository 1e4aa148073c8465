use super::{check_integer, check_table, opt_integer, Entry};
use crate::error::{EmberError, EmberResult};
use crate::host::Host;
use crate::native::Arguments;
use crate::vm::table::Key;
use crate::vm::value::{format_number, Value};

pub(super) const FUNCTIONS: &[Entry] = &[
    ("insert", insert),
    ("remove", remove),
    ("concat", concat),
    ("unpack", unpack),
];

/// Upper bound on values `unpack` may push in one call
const MAX_UNPACK: i64 = 1 << 20;

fn insert(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    let n = table.borrow().len();
    match args.len() {
        2 => table.set(Key::Int(n + 1), args.value(1)?.clone()),
        3 => {
            let pos = check_integer(&args, 1)?;
            if pos < 1 || pos > n + 1 {
                return Err(EmberError::argument(1, "position out of bounds"));
            }
            let mut entries = table.borrow_mut();
            for i in (pos..=n).rev() {
                let moved = entries.get_int(i);
                entries.set(Key::Int(i + 1), moved);
            }
            entries.set(Key::Int(pos), args.value(2)?.clone());
        }
        _ => return Err(EmberError::Call("wrong number of arguments to 'insert'".to_string())),
    }
    host.memory().check()?;
    Ok(0)
}

fn remove(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    let n = table.borrow().len();
    let pos = opt_integer(&args, 1, n)?;
    if n == 0 && (pos == 0 || pos == n) {
        host.push(table.get(&Key::Int(pos)));
        return Ok(1);
    }
    if pos < 1 || pos > n + 1 {
        return Err(EmberError::argument(1, "position out of bounds"));
    }
    let removed = {
        let mut entries = table.borrow_mut();
        let removed = entries.get_int(pos);
        for i in pos..n {
            let moved = entries.get_int(i + 1);
            entries.set(Key::Int(i), moved);
        }
        if pos <= n {
            entries.set(Key::Int(n), Value::Nil);
        }
        removed
    };
    host.push(removed);
    Ok(1)
}

fn concat(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    let sep = args.opt::<String>(1)?.unwrap_or_default();
    let first = opt_integer(&args, 2, 1)?;
    let last = opt_integer(&args, 3, table.borrow().len())?;

    let mut pieces = Vec::new();
    for i in first..=last {
        match table.get(&Key::Int(i)) {
            Value::Str(s) => pieces.push(s.as_str().to_string()),
            Value::Integer(n) => pieces.push(n.to_string()),
            Value::Number(n) => pieces.push(format_number(n)),
            other => {
                return Err(EmberError::Call(format!(
                    "invalid value (at index {i}) in table for 'concat': {}",
                    other.type_name()
                )))
            }
        }
    }
    host.push(pieces.join(&sep));
    Ok(1)
}

fn unpack(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let table = check_table(&args, 0)?;
    let first = opt_integer(&args, 1, 1)?;
    let last = opt_integer(&args, 2, table.borrow().len())?;
    if first > last {
        return Ok(0);
    }
    if last.saturating_sub(first) >= MAX_UNPACK {
        return Err(EmberError::Call("too many results to unpack".to_string()));
    }
    for i in first..=last {
        host.push(table.get(&Key::Int(i)));
    }
    Ok((last - first + 1) as usize)
}

#[cfg(test)]
mod tests {
    use crate::host::Host;

    #[test]
    fn insert_remove_concat() {
        let mut host = Host::new();
        host.load(
            "t",
            r#"
            local t = {"b", "d"}
            table.insert(t, "e")
            table.insert(t, 1, "a")
            table.insert(t, 3, "c")
            joined = table.concat(t, ",")
            last = table.remove(t)
            first = table.remove(t, 1)
            rest = table.concat(t)
            "#,
        )
        .unwrap();
        assert_eq!(host.get::<String>("joined").unwrap(), "a,b,c,d,e");
        assert_eq!(host.get::<String>("last").unwrap(), "e");
        assert_eq!(host.get::<String>("first").unwrap(), "a");
        assert_eq!(host.get::<String>("rest").unwrap(), "bcd");
    }

    #[test]
    fn unpack_spreads_into_calls() {
        let mut host = Host::new();
        host.load("t", "a, b, c = table.unpack({1, 2, 3}) n = select('#', table.unpack({1, 2}))")
            .unwrap();
        assert_eq!(host.get::<i64>("c").unwrap(), 3);
        assert_eq!(host.get::<i64>("n").unwrap(), 2);
    }

    #[test]
    fn concat_rejects_non_strings() {
        let mut host = Host::new();
        let err = host.load("t", "table.concat({1, {}})").unwrap_err();
        assert!(err.to_string().contains("invalid value (at index 2)"));
    }
}
