//! Operator Semantics
//!
//! Arithmetic, comparison, concatenation and length on runtime values.
//! Integer operations wrap; `/` and `^` always produce floats. Errors are
//! plain messages, the VM attaches the source location.

use super::memory::MemoryTracker;
use super::value::{format_number, Value};

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

/// Ordering comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Less,
    LessEqual,
}

/// Parse a numeral the way the lexer and `tonumber` read them
pub fn str_to_number(text: &str) -> Option<Value> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        // Hex integers wrap around like the reference implementation
        let value = hex.bytes().fold(0i64, |acc, b| {
            let digit = (b as char).to_digit(16).unwrap_or(0) as i64;
            acc.wrapping_mul(16).wrapping_add(digit)
        });
        return Some(Value::Integer(if negative { value.wrapping_neg() } else { value }));
    }
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit() || b".eE+-".contains(&b)) {
        return None;
    }
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Value::Integer(i));
        }
    }
    text.parse::<f64>().ok().map(Value::Number)
}

fn to_arith_operand(value: &Value) -> Option<Value> {
    match value {
        Value::Integer(_) | Value::Number(_) => Some(value.clone()),
        Value::Str(s) => str_to_number(s.as_str()),
        _ => None,
    }
}

fn arith_error(a: &Value, b: &Value) -> String {
    let culprit = if to_arith_operand(a).is_none() { a } else { b };
    if let Value::Str(_) = culprit {
        return "attempt to perform arithmetic on a string value".to_string();
    }
    format!("attempt to perform arithmetic on a {} value", culprit.type_name())
}

fn float_floor_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

pub fn arith(op: Arith, a: &Value, b: &Value) -> Result<Value, String> {
    let (Some(x), Some(y)) = (to_arith_operand(a), to_arith_operand(b)) else {
        return Err(arith_error(a, b));
    };

    if let (Value::Integer(x), Value::Integer(y)) = (&x, &y) {
        let (x, y) = (*x, *y);
        match op {
            Arith::Add => return Ok(Value::Integer(x.wrapping_add(y))),
            Arith::Sub => return Ok(Value::Integer(x.wrapping_sub(y))),
            Arith::Mul => return Ok(Value::Integer(x.wrapping_mul(y))),
            Arith::IDiv => {
                if y == 0 {
                    return Err("attempt to perform 'n//0'".to_string());
                }
                let q = x.wrapping_div(y);
                let q = if x.wrapping_rem(y) != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q };
                return Ok(Value::Integer(q));
            }
            Arith::Mod => {
                if y == 0 {
                    return Err("attempt to perform 'n%0'".to_string());
                }
                let r = x.wrapping_rem(y);
                let r = if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r };
                return Ok(Value::Integer(r));
            }
            Arith::Div | Arith::Pow => {}
        }
    }

    let (Some(x), Some(y)) = (x.as_number(), y.as_number()) else {
        return Err(arith_error(a, b));
    };
    Ok(Value::Number(match op {
        Arith::Add => x + y,
        Arith::Sub => x - y,
        Arith::Mul => x * y,
        Arith::Div => x / y,
        Arith::IDiv => (x / y).floor(),
        Arith::Mod => {
            if y.is_infinite() && x.is_finite() {
                if (x < 0.0) != (y < 0.0) && x != 0.0 { y } else { x }
            } else {
                float_floor_mod(x, y)
            }
        }
        Arith::Pow => x.powf(y),
    }))
}

pub fn negate(value: &Value) -> Result<Value, String> {
    match to_arith_operand(value) {
        Some(Value::Integer(i)) => Ok(Value::Integer(i.wrapping_neg())),
        Some(Value::Number(n)) => Ok(Value::Number(-n)),
        _ => Err(arith_error(value, value)),
    }
}

fn compare_error(a: &Value, b: &Value) -> String {
    if a.type_name() == b.type_name() {
        format!("attempt to compare two {} values", a.type_name())
    } else {
        format!("attempt to compare {} with {}", a.type_name(), b.type_name())
    }
}

/// Exact integer/float ordering without precision loss for large integers
fn less_int_float(i: i64, f: f64, or_equal: bool) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= 2f64.powi(63) {
        return true;
    }
    if f < -(2f64.powi(63)) {
        return false;
    }
    let floor = f.floor();
    let fi = floor as i64;
    if floor == f {
        if or_equal { i <= fi } else { i < fi }
    } else {
        i <= fi
    }
}

pub fn compare(op: Compare, a: &Value, b: &Value) -> Result<bool, String> {
    let or_equal = op == Compare::LessEqual;
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(if or_equal { x <= y } else { x < y }),
        (Value::Number(x), Value::Number(y)) => Ok(if or_equal { x <= y } else { x < y }),
        (Value::Integer(x), Value::Number(y)) => Ok(less_int_float(*x, *y, or_equal)),
        (Value::Number(x), Value::Integer(y)) => {
            // x < y  <=>  !(y <= x), and x <= y  <=>  !(y < x), for non-NaN x
            if x.is_nan() {
                return Ok(false);
            }
            Ok(!less_int_float(*y, *x, !or_equal))
        }
        (Value::Str(x), Value::Str(y)) => {
            let (x, y) = (x.as_str(), y.as_str());
            Ok(if or_equal { x <= y } else { x < y })
        }
        _ => Err(compare_error(a, b)),
    }
}

fn concat_piece(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.as_str().to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

pub fn concat(a: &Value, b: &Value, tracker: &MemoryTracker) -> Result<Value, String> {
    match (concat_piece(a), concat_piece(b)) {
        (Some(x), Some(y)) => Ok(Value::string(&(x + &y), tracker)),
        (None, _) => Err(format!("attempt to concatenate a {} value", a.type_name())),
        (_, None) => Err(format!("attempt to concatenate a {} value", b.type_name())),
    }
}

pub fn length(value: &Value) -> Result<Value, String> {
    match value {
        Value::Str(s) => Ok(Value::Integer(s.len() as i64)),
        Value::Table(t) => Ok(Value::Integer(t.borrow().len())),
        _ => Err(format!("attempt to get length of a {} value", value.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_stays_integral() {
        let r = arith(Arith::Add, &Value::Integer(2), &Value::Integer(3)).unwrap();
        assert!(matches!(r, Value::Integer(5)));
        let r = arith(Arith::Div, &Value::Integer(6), &Value::Integer(3)).unwrap();
        assert!(matches!(r, Value::Number(n) if n == 2.0));
    }

    #[test]
    fn floor_division_and_modulo_round_down() {
        assert_eq!(arith(Arith::IDiv, &Value::Integer(-7), &Value::Integer(2)), Ok(Value::Integer(-4)));
        assert_eq!(arith(Arith::Mod, &Value::Integer(-7), &Value::Integer(2)), Ok(Value::Integer(1)));
        assert_eq!(arith(Arith::Mod, &Value::Number(5.5), &Value::Integer(-2)), Ok(Value::Number(-0.5)));
    }

    #[test]
    fn integer_division_by_zero_fails() {
        assert!(arith(Arith::IDiv, &Value::Integer(1), &Value::Integer(0)).is_err());
        assert!(arith(Arith::Mod, &Value::Integer(1), &Value::Integer(0)).is_err());
        assert_eq!(
            arith(Arith::Div, &Value::Integer(1), &Value::Integer(0)),
            Ok(Value::Number(f64::INFINITY))
        );
    }

    #[test]
    fn most_negative_integer_by_minus_one_wraps() {
        let min = Value::Integer(i64::MIN);
        let minus_one = Value::Integer(-1);
        assert_eq!(arith(Arith::IDiv, &min, &minus_one), Ok(Value::Integer(i64::MIN)));
        assert_eq!(arith(Arith::Mod, &min, &minus_one), Ok(Value::Integer(0)));
        assert_eq!(arith(Arith::Mul, &min, &minus_one), Ok(Value::Integer(i64::MIN)));
    }

    #[test]
    fn numeric_strings_coerce_in_arithmetic() {
        let tracker = MemoryTracker::new();
        let ten = Value::string("10", &tracker);
        assert_eq!(arith(Arith::Mul, &ten, &Value::Integer(2)), Ok(Value::Integer(20)));
        let word = Value::string("ten", &tracker);
        assert_eq!(
            arith(Arith::Add, &word, &Value::Integer(1)),
            Err("attempt to perform arithmetic on a string value".to_string())
        );
    }

    #[test]
    fn mixed_comparisons() {
        assert_eq!(compare(Compare::Less, &Value::Integer(1), &Value::Number(1.5)), Ok(true));
        assert_eq!(compare(Compare::LessEqual, &Value::Number(2.0), &Value::Integer(2)), Ok(true));
        assert_eq!(compare(Compare::Less, &Value::Number(2.0), &Value::Integer(2)), Ok(false));
        assert_eq!(
            compare(Compare::Less, &Value::Integer(1), &Value::Nil),
            Err("attempt to compare number with nil".to_string())
        );
    }

    #[test]
    fn numerals() {
        assert_eq!(str_to_number("0x10"), Some(Value::Integer(16)));
        assert_eq!(str_to_number(" 42 "), Some(Value::Integer(42)));
        assert_eq!(str_to_number("1e2"), Some(Value::Number(100.0)));
        assert_eq!(str_to_number("abc"), None);
        assert_eq!(str_to_number(""), None);
    }

    #[test]
    fn concat_formats_numbers() {
        let tracker = MemoryTracker::new();
        let s = concat(&Value::Integer(1), &Value::Number(2.0), &tracker).unwrap();
        assert_eq!(s.as_str(), Some("12.0"));
    }
}
