//! Operator semantics and primitive conversions.

use std::cmp::Ordering;

use crate::ast::BinaryOp;

use super::error::RuntimeError;
use super::format::{number_to_string, to_display};
use super::value::{Function, Value};

const TWO_32: f64 = 4_294_967_296.0;

/// JavaScript `ToNumber`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::Str(s) => string_to_number(s),
        Value::Array(_) => string_to_number(&to_display(value)),
        Value::Object(_) | Value::Function(_) | Value::Promise(_) => f64::NAN,
    }
}

pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let radix_literal = |prefix_len: usize, radix: u32| {
        u64::from_str_radix(&trimmed[prefix_len..], radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN)
    };
    match trimmed.get(..2) {
        Some("0x" | "0X") => return radix_literal(2, 16),
        Some("0b" | "0B") => return radix_literal(2, 2),
        Some("0o" | "0O") => return radix_literal(2, 8),
        _ => {}
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(TWO_32) as u32
}

/// Integer conversion used by index arguments (`slice`, `at`, ...).
pub fn to_integer(value: &Value) -> f64 {
    let n = to_number(value);
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolves a possibly negative relative index against `len`, clamped to
/// `0..=len`.
pub fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = to_integer(value);
    let len_f = len as f64;
    let resolved = if n < 0.0 { (len_f + n).max(0.0) } else { n.min(len_f) };
    resolved as usize
}

/// Containers convert to their string form; primitives are unchanged.
pub fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_) => {
            Value::string(to_display(value))
        }
        other => other.clone(),
    }
}

/// Property key for an index expression.
pub fn property_key(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        Value::Number(n) => number_to_string(*n),
        other => to_display(other),
    }
}

/// Parses a canonical array index (`"0"`, `"12"`, not `"01"` or `"-1"`).
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

/// `==` semantics.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() || y.is_nullish() => x.is_nullish() && y.is_nullish(),
        (Value::Number(_), Value::Str(_)) | (Value::Str(_), Value::Number(_)) => {
            to_number(a) == to_number(b)
        }
        (Value::Bool(_), _) => loose_equals(&Value::Number(to_number(a)), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(to_number(b))),
        (Value::Array(_) | Value::Object(_), Value::Number(_) | Value::Str(_)) => {
            loose_equals(&to_primitive(a), b)
        }
        (Value::Number(_) | Value::Str(_), Value::Array(_) | Value::Object(_)) => {
            loose_equals(a, &to_primitive(b))
        }
        _ => a.strict_equals(b),
    }
}

/// Equality used by `includes`: like `===` but `NaN` equals itself.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (to_primitive(a), to_primitive(b)) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(&y)),
        (x, y) => to_number(&x).partial_cmp(&to_number(&y)),
    }
}

pub fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let number = |f: fn(f64, f64) -> f64| Value::Number(f(to_number(left), to_number(right)));
    let value = match op {
        BinaryOp::Add => {
            let (l, r) = (to_primitive(left), to_primitive(right));
            if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
                Value::string(format!("{}{}", to_display(&l), to_display(&r)))
            } else {
                Value::Number(to_number(&l) + to_number(&r))
            }
        }
        BinaryOp::Sub => number(|a, b| a - b),
        BinaryOp::Mul => number(|a, b| a * b),
        BinaryOp::Div => number(|a, b| a / b),
        BinaryOp::Mod => number(|a, b| a % b),
        BinaryOp::Pow => number(js_pow),
        BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(left, right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::LtEq => Value::Bool(matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::GtEq => {
            Value::Bool(matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)))
        }
        BinaryOp::BitAnd => number(|a, b| f64::from(to_int32(a) & to_int32(b))),
        BinaryOp::BitOr => number(|a, b| f64::from(to_int32(a) | to_int32(b))),
        BinaryOp::BitXor => number(|a, b| f64::from(to_int32(a) ^ to_int32(b))),
        BinaryOp::Shl => number(|a, b| f64::from(to_int32(a).wrapping_shl(to_uint32(b) & 31))),
        BinaryOp::Shr => number(|a, b| f64::from(to_int32(a).wrapping_shr(to_uint32(b) & 31))),
        BinaryOp::UShr => number(|a, b| f64::from(to_uint32(a).wrapping_shr(to_uint32(b) & 31))),
        BinaryOp::In => Value::Bool(has_property(left, right)?),
        BinaryOp::Instanceof => Value::Bool(instance_of(left, right)?),
    };
    Ok(value)
}

fn has_property(key: &Value, target: &Value) -> Result<bool, RuntimeError> {
    let key = property_key(key);
    match target {
        Value::Object(obj) => Ok(obj.borrow().props.contains_key(&key)),
        Value::Array(items) => Ok(key == "length"
            || array_index(&key).is_some_and(|i| i < items.borrow().len())),
        Value::Function(_) | Value::Promise(_) => Ok(false),
        other => Err(RuntimeError::type_error(format!(
            "Cannot use 'in' operator to search for '{key}' in {}",
            to_display(other)
        ))),
    }
}

fn instance_of(value: &Value, constructor: &Value) -> Result<bool, RuntimeError> {
    let Value::Function(func) = constructor else {
        return Err(RuntimeError::type_error(
            "Right-hand side of 'instanceof' is not callable",
        ));
    };
    Ok(match &**func {
        Function::Host(host) => host.is_instance(value),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_conversion_rejects_rust_only_spellings() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("nan").is_nan());
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn addition_concatenates_when_either_side_is_a_string() {
        let out = binary_op(BinaryOp::Add, &Value::str("a"), &Value::Number(1.0)).unwrap();
        assert!(matches!(out, Value::Str(s) if &*s == "a1"));
        let out = binary_op(BinaryOp::Add, &Value::array(vec![Value::Number(1.0)]), &Value::Number(1.0)).unwrap();
        assert!(matches!(out, Value::Str(s) if &*s == "11"));
        let out = binary_op(BinaryOp::Add, &Value::Bool(true), &Value::Number(1.0)).unwrap();
        assert!(matches!(out, Value::Number(n) if n == 2.0));
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!loose_equals(&Value::Null, &Value::Number(0.0)));
        assert!(loose_equals(&Value::str("1"), &Value::Number(1.0)));
        assert!(loose_equals(&Value::Bool(true), &Value::str("1")));
    }

    #[test]
    fn bitwise_operators_wrap_to_32_bits() {
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_uint32(-1.0), u32::MAX);
        let out = binary_op(BinaryOp::UShr, &Value::Number(-1.0), &Value::Number(28.0)).unwrap();
        assert!(matches!(out, Value::Number(n) if n == 15.0));
    }

    #[test]
    fn relative_indices_clamp() {
        assert_eq!(relative_index(&Value::Number(-2.0), 5, 0), 3);
        assert_eq!(relative_index(&Value::Number(9.0), 5, 0), 5);
        assert_eq!(relative_index(&Value::Undefined, 5, 5), 5);
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("7"), Some(7));
    }

    #[test]
    fn comparisons_with_nan_are_false() {
        let nan = Value::Number(f64::NAN);
        let one = Value::Number(1.0);
        for op in [BinaryOp::Lt, BinaryOp::LtEq, BinaryOp::Gt, BinaryOp::GtEq] {
            assert!(matches!(binary_op(op, &nan, &one).unwrap(), Value::Bool(false)));
        }
        assert!(matches!(binary_op(BinaryOp::Lt, &Value::str("a"), &Value::str("b")).unwrap(), Value::Bool(true)));
    }
}
