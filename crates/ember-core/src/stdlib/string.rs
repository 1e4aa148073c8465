//! Byte-oriented string functions. Positions are 1-based; negative
//! positions count from the end.

use super::{check_integer, check_str, opt_integer, Entry};
use crate::error::{EmberError, EmberResult};
use crate::host::Host;
use crate::native::Arguments;

pub(super) const FUNCTIONS: &[Entry] = &[
    ("len", len),
    ("sub", sub),
    ("upper", upper),
    ("lower", lower),
    ("rep", rep),
    ("reverse", reverse),
];

fn len(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let s = check_str(&args, 0)?;
    host.push(s.len() as i64);
    Ok(1)
}

/// Clamp Lua-style `[i, j]` positions to a byte range of a string of `len`
fn byte_range(len: usize, i: i64, j: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = match i {
        i if i < 0 => (len + i + 1).max(1),
        0 => 1,
        i => i,
    };
    let end = if j < 0 { len + j + 1 } else { j.min(len) };
    if start > end {
        return None;
    }
    Some((start as usize - 1, end as usize))
}

fn sub(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let s = check_str(&args, 0)?;
    let i = opt_integer(&args, 1, 1)?;
    let j = opt_integer(&args, 2, -1)?;
    let piece = match byte_range(s.len(), i, j) {
        Some((start, end)) => String::from_utf8_lossy(&s.as_bytes()[start..end]).into_owned(),
        None => String::new(),
    };
    host.push(piece);
    Ok(1)
}

fn upper(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let s = check_str(&args, 0)?;
    host.push(s.to_ascii_uppercase());
    Ok(1)
}

fn lower(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let s = check_str(&args, 0)?;
    host.push(s.to_ascii_lowercase());
    Ok(1)
}

/// Largest string `rep` will build when no memory limit is configured
const MAX_STRING_SIZE: usize = 1 << 31;

/// Bytes in `count` copies of `piece` joined by `sep`, if that fits in `room`
fn rep_size(piece: usize, sep: usize, count: usize, room: usize) -> Option<usize> {
    if count == 0 {
        return Some(0);
    }
    let total = piece
        .checked_mul(count)?
        .checked_add(sep.checked_mul(count - 1)?)?;
    (total <= room).then_some(total)
}

fn rep(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let s = check_str(&args, 0)?;
    let n = check_integer(&args, 1)?;
    let sep = match args.opt::<String>(2)? {
        Some(sep) => sep,
        None => String::new(),
    };
    let count = usize::try_from(n).unwrap_or(0);

    let memory = host.memory();
    let room = match memory.limit() {
        Some(limit) => limit.saturating_sub(memory.usage()).min(MAX_STRING_SIZE),
        None => MAX_STRING_SIZE,
    };
    let Some(size) = rep_size(s.len(), sep.len(), count, room) else {
        return Err(EmberError::Call("resulting string too large".to_string()));
    };

    let mut result = String::with_capacity(size);
    for i in 0..count {
        if i > 0 {
            result.push_str(&sep);
        }
        result.push_str(&s);
    }
    host.push(result);
    host.memory().check()?;
    Ok(1)
}

fn reverse(host: &mut Host, args: Arguments) -> EmberResult<usize> {
    let s = check_str(&args, 0)?;
    let mut bytes = s.into_bytes();
    bytes.reverse();
    host.push(String::from_utf8_lossy(&bytes).into_owned());
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::{byte_range, rep_size};
    use crate::config::EmberConfig;
    use crate::error::{EmberError, ErrorKind};
    use crate::host::Host;

    #[test]
    fn ranges_follow_one_based_positions() {
        assert_eq!(byte_range(5, 2, 4), Some((1, 4)));
        assert_eq!(byte_range(5, -3, -1), Some((2, 5)));
        assert_eq!(byte_range(5, 0, 100), Some((0, 5)));
        assert_eq!(byte_range(5, 4, 2), None);
    }

    #[test]
    fn string_functions_and_methods() {
        let mut host = Host::new();
        host.load(
            "t",
            r#"
            local s = "Hello"
            a = string.sub(s, 2, 3) .. s:upper() .. s:lower()
            b = string.rep("ab", 3, "-")
            c = ("abc"):reverse() .. #s .. string.len(s)
            "#,
        )
        .unwrap();
        assert_eq!(host.get::<String>("a").unwrap(), "elHELLOhello");
        assert_eq!(host.get::<String>("b").unwrap(), "ab-ab-ab");
        assert_eq!(host.get::<String>("c").unwrap(), "cba55");
    }

    #[test]
    fn rep_size_rejects_overflow_and_oversized_results() {
        assert_eq!(rep_size(2, 1, 3, 100), Some(8));
        assert_eq!(rep_size(5, 3, 0, 0), Some(0));
        assert_eq!(rep_size(1, 0, usize::MAX, usize::MAX), Some(usize::MAX));
        assert_eq!(rep_size(2, 0, usize::MAX, usize::MAX), None);
        assert_eq!(rep_size(4, 0, 10, 39), None);
    }

    #[test]
    fn huge_rep_is_a_call_error() {
        let mut host = Host::with_config(EmberConfig::new().with_memory_limit(1 << 20));
        let err = host
            .load("r", "x = string.rep('x', 4611686018427387904)")
            .unwrap_err();
        assert_eq!(err, EmberError::Call("resulting string too large".to_string()));
        assert_eq!(err.kind(), ErrorKind::Call);

        let mut host = Host::new();
        let err = host.load("r", "x = string.rep('ab', 1099511627776, ',')").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Call);
        host.load("r", "x = string.rep('ab', 2)").unwrap();
        assert_eq!(host.get::<String>("x").unwrap(), "abab");
    }

    #[test]
    fn reverse_works_on_bytes() {
        let mut host = Host::new();
        host.set("s", "ab\u{e9}").unwrap();
        host.load("t", "r = string.reverse(s) n = #s").unwrap();
        assert_eq!(host.get::<i64>("n").unwrap(), 4);
        assert_eq!(host.get::<String>("r").unwrap(), "\u{fffd}\u{fffd}ba");
    }
}
