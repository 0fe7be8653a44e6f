//! Equality and ordering between JSON scalars.
//!
//! Numbers compare by value: exactly when both sides are integers, as `f64`
//! otherwise. Ordering is only defined between booleans, numbers and
//! strings; `null` stands for the other side's zero value. Strings order by
//! UTF-16 code unit, so characters outside the BMP sort before U+E000..U+FFFF.

use std::cmp::Ordering;

use serde_json::{Number, Value};

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
}

pub fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    match (as_integer(a), as_integer(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        (Value::Number(_), _) | (_, Value::Number(_)) => false,
        _ => a == b,
    }
}

pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, other) => compare_values(other, a).map(Ordering::reverse),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Null) => Some(x.cmp(&false)),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::Number(x), Value::Null) => compare_numbers(x, &Number::from(0)),
        (Value::String(x), Value::String(y)) => Some(x.encode_utf16().cmp(y.encode_utf16())),
        (Value::String(x), Value::Null) => Some(x.as_str().cmp("")),
        _ => None,
    }
}
