//! Scalar values returned by the instrumentation provider.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single field value read from a result row.
///
/// The provider is dynamically typed, so the collector never knows ahead of
/// time which kind a field holds. Values are serialized as bare JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// The provider returned an empty (null) property.
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Returns the string form used in synthesized metric names and values.
    ///
    /// Strings are returned verbatim, numbers use their shortest decimal
    /// representation and null becomes the empty string.
    pub fn to_string_form(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Returns the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write_float(f, *v),
            Value::String(s) => f.write_str(s),
        }
    }
}

/// Shortest round-trip form; exponent notation below 1e-4 and from 1e21 up,
/// with a signed two-digit exponent (`1e-05`, `1.5e+21`).
fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        return f.write_str("NaN");
    }
    if v.is_infinite() {
        return f.write_str(if v > 0.0 { "+Inf" } else { "-Inf" });
    }

    let scientific = format!("{:e}", v);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return write!(f, "{}", v);
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if v == 0.0 || (-4..21).contains(&exponent) {
        return write!(f, "{}", v);
    }

    let sign = if exponent < 0 { '-' } else { '+' };
    write!(f, "{}e{}{:02}", mantissa, sign, exponent.abs())
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
