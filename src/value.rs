//! Scalar cell values and the numeric coercion rules shared by every aggregation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell: a number, a string, or nothing.
///
/// Serializes as a bare JSON scalar (`null`, `1.5`, `"East US"`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    /// Null and the empty string both count as missing.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::Number(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form used for join keys, group labels and text output.
    ///
    /// Integral numbers print without a fractional part, so `2024.0` and `"2024"`
    /// produce the same key.
    pub fn key_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Hashable projection used for de-duplication and grouping.
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Number(n) => {
                // -0.0 and 0.0 compare equal as numbers; give them one key.
                let n = if *n == 0.0 { 0.0 } else { *n };
                ValueKey::Number(n.to_bits())
            }
            Value::Text(s) => ValueKey::Text(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Type-tagged, hashable identity of a [`Value`]. `1` and `"1"` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Number(u64),
    Text(String),
}

/// What to do with a value that does not coerce to a finite number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericPolicy {
    /// Drop it (statistics: the row does not count).
    Exclude,
    /// Count it as 0 (sums: the row still contributes).
    Zero,
}

/// Coerce a cell to a finite number.
///
/// Numbers pass through; text is trimmed and parsed. Missing, unparseable and
/// non-finite values are resolved by `policy`.
pub fn coerce_number(value: &Value, policy: NumericPolicy) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => Some(*n),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        Value::Null => None,
    };
    match parsed.filter(|n| n.is_finite()) {
        Some(n) => Some(n),
        None => match policy {
            NumericPolicy::Exclude => None,
            NumericPolicy::Zero => Some(0.0),
        },
    }
}

/// Format a number the way it should appear in keys and exported text.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
