//! Decoded value model
//!
//! A `Value` is one cell of a record set: the JSON data model plus raw bytes
//! (which JSON itself cannot carry, but binary columns can). Records are
//! `Value::Object`s; columns are `Vec<Value>`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::{JonxError, Result};

/// A single decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Integers representable as i64.
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is an integer (signed or unsigned)
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_))
    }

    /// Check if this value is any number
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Float(_))
    }

    /// Integer content widened to i128, if this is an integer.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v as i128),
            Value::UInt(v) => Some(*v as i128),
            _ => None,
        }
    }

    /// Numeric content as f64, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert from a parsed JSON value.
    pub fn from_json(json: JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::Str(s),
            JsonValue::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            JsonValue::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a JSON value. Fails for `Bytes` (no JSON form) and
    /// non-finite floats.
    pub fn to_json(&self) -> Result<JsonValue> {
        match self {
            Value::Null => Ok(JsonValue::Null),
            Value::Bool(b) => Ok(JsonValue::Bool(*b)),
            Value::Int(v) => Ok(JsonValue::from(*v)),
            Value::UInt(v) => Ok(JsonValue::from(*v)),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .ok_or_else(|| {
                    JonxError::UnsupportedValue {
                        field: String::new(),
                        detail: format!("non-finite float {} has no JSON form", v),
                    }
                }),
            Value::Str(s) => Ok(JsonValue::String(s.clone())),
            Value::Bytes(_) => Err(JonxError::UnsupportedValue {
                field: String::new(),
                detail: "raw bytes have no JSON form".to_string(),
            }),
            Value::Array(items) => {
                let out: Result<Vec<JsonValue>> = items.iter().map(|v| v.to_json()).collect();
                Ok(JsonValue::Array(out?))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json()?);
                }
                Ok(JsonValue::Object(out))
            }
        }
    }

    /// Total order over values, used by the index builder and extremum scans.
    ///
    /// Numbers compare numerically regardless of representation (`Int`,
    /// `UInt`, `Float`); `+0.0` and `-0.0` compare equal. Strings and bytes
    /// compare lexicographically. Values of different classes order as
    /// Null < Bool < number < Str < Bytes < Array < Object.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (a, b) if a.is_number() && b.is_number() => cmp_numeric(a, b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ord = ka.cmp(kb).then_with(|| va.total_cmp(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => class_rank(a).cmp(&class_rank(b)),
        }
    }
}

fn class_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::UInt(_) | Value::Float(_) => 2,
        Value::Str(_) => 3,
        Value::Bytes(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

fn cmp_numeric(a: &Value, b: &Value) -> Ordering {
    // Integer pairs compare exactly; anything involving a float goes
    // through f64 with NaN ordered greatest.
    match (a.as_i128(), b.as_i128()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or_else(|| {
                if x.is_nan() && y.is_nan() {
                    Ordering::Equal
                } else if x.is_nan() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            })
        }
    }
}
