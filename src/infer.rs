//! Column type inference
//!
//! Scans a column of decoded values and picks the most compact physical type
//! that can represent every element. Presence of any null wraps the result in
//! `nullable<T>`, with T inferred from the non-null subset alone.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use half::f16;

use crate::types::{ColumnType, INT_RANGES, UINT_RANGES};
use crate::value::Value;

/// Distinct-ratio cutoff for `string_dict`.
const STRING_DICT_RATIO: f64 = 0.30;
/// Distinct-count cutoff for `enum`.
const ENUM_MAX_DISTINCT: usize = 256;
/// IEEE binary16 magnitude limit.
const F16_MAX: f64 = 65504.0;

/// Infer the physical type of one column.
///
/// Deterministic: identical input order always yields the same type. An empty
/// column infers `json`; an all-null column infers `nullable<json>`.
pub fn infer_column_type(values: &[Value]) -> ColumnType {
    let nullable = values.iter().any(Value::is_null);
    let clean: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();

    let base = infer_non_null(&clean);
    if nullable {
        ColumnType::Nullable(Box::new(base))
    } else {
        base
    }
}

fn infer_non_null(clean: &[&Value]) -> ColumnType {
    if clean.is_empty() {
        return ColumnType::Json;
    }

    if clean.iter().all(|v| matches!(v, Value::Bool(_))) {
        return ColumnType::Bool;
    }

    if clean.iter().all(|v| matches!(v, Value::Bytes(_))) {
        return ColumnType::Binary;
    }

    if clean.iter().all(|v| v.is_integer()) {
        return infer_integer(clean);
    }

    if clean.iter().all(|v| v.is_number()) {
        return infer_float(clean);
    }

    if clean.iter().all(|v| matches!(v, Value::Str(_))) {
        return infer_string(clean);
    }

    ColumnType::Json
}

/// Narrowest integer type covering [min, max]; unsigned preferred when
/// min >= 0, `int64` as the final fallback.
fn infer_integer(clean: &[&Value]) -> ColumnType {
    let mut lo = i128::MAX;
    let mut hi = i128::MIN;
    for v in clean {
        if let Some(x) = v.as_i128() {
            lo = lo.min(x);
            hi = hi.max(x);
        }
    }

    if lo >= 0 {
        for (ty, range_lo, range_hi) in UINT_RANGES {
            if lo >= range_lo && hi <= range_hi {
                return ty;
            }
        }
    }
    for (ty, range_lo, range_hi) in INT_RANGES {
        if lo >= range_lo && hi <= range_hi {
            return ty;
        }
    }
    ColumnType::Int64
}

fn infer_float(clean: &[&Value]) -> ColumnType {
    let mut fits_f16 = true;
    let mut fits_f32 = true;

    for v in clean {
        let x = match v.as_f64() {
            Some(x) => x,
            None => continue,
        };
        if fits_f16 && !float_fits_f16(x) {
            fits_f16 = false;
        }
        if fits_f32 && (f64::from(x as f32) != x) {
            fits_f32 = false;
        }
        if !fits_f16 && !fits_f32 {
            break;
        }
    }

    if fits_f16 {
        ColumnType::Float16
    } else if fits_f32 {
        ColumnType::Float32
    } else {
        ColumnType::Float64
    }
}

/// A value qualifies for half width only if formatting with three fractional
/// digits round-trips and the binary16 conversion is exact, so decoded
/// columns reproduce the input bit-for-bit.
fn float_fits_f16(x: f64) -> bool {
    if !(-F16_MAX..=F16_MAX).contains(&x) {
        return false;
    }
    let formatted: f64 = match format!("{:.3}", x).parse() {
        Ok(v) => v,
        Err(_) => return false,
    };
    formatted == x && f16::from_f64(x).to_f64() == x
}

fn infer_string(clean: &[&Value]) -> ColumnType {
    let distinct: HashSet<&str> = clean.iter().filter_map(|v| v.as_str()).collect();

    if distinct.iter().all(|s| is_uuid(s)) {
        return ColumnType::Uuid;
    }
    if distinct.iter().all(|s| is_date(s)) {
        return ColumnType::Date;
    }
    if distinct.iter().all(|s| is_datetime(s)) {
        return ColumnType::DateTime;
    }

    if distinct.len() <= ENUM_MAX_DISTINCT {
        ColumnType::Enum
    } else if (distinct.len() as f64) <= (clean.len() as f64) * STRING_DICT_RATIO {
        ColumnType::StringDict
    } else {
        ColumnType::Str
    }
}

/// Canonical hyphenated 8-4-4-4-12 form only.
fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::parse_str(s).is_ok()
}

fn is_date(s: &str) -> bool {
    s.len() == 10 && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// ISO 8601 datetime, with or without fractional seconds and offset.
fn is_datetime(s: &str) -> bool {
    if s.len() < 19 {
        return false;
    }
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infer(values: Vec<Value>) -> String {
        infer_column_type(&values).name()
    }

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(infer(vec![Value::Int(1), Value::Int(255)]), "uint8");
        assert_eq!(infer(vec![Value::Int(0), Value::Int(256)]), "uint16");
        assert_eq!(infer(vec![Value::Int(-1), Value::Int(127)]), "int8");
        assert_eq!(infer(vec![Value::Int(-1), Value::Int(128)]), "int16");
        assert_eq!(infer(vec![Value::Int(5_000_000_000)]), "uint64");
        assert_eq!(infer(vec![Value::Int(-5_000_000_000)]), "int64");
        assert_eq!(infer(vec![Value::UInt(u64::MAX)]), "uint64");
    }

    #[test]
    fn test_single_element_narrowing() {
        assert_eq!(infer(vec![Value::Int(0)]), "uint8");
        assert_eq!(infer(vec![Value::Int(-1)]), "int8");
    }

    #[test]
    fn test_mixed_sign_wide_column_falls_back_to_int64() {
        // Cannot actually fit: negative low plus a high above i64::MAX.
        assert_eq!(
            infer(vec![Value::Int(-1), Value::UInt(u64::MAX)]),
            "int64"
        );
    }

    #[test]
    fn test_float_widths() {
        assert_eq!(infer(vec![Value::Float(0.5), Value::Float(1.25)]), "float16");
        // Three decimals but representable in neither binary16 nor binary32.
        assert_eq!(infer(vec![Value::Float(0.123)]), "float64");
        // Too many fractional digits for the half gate, f32-exact.
        assert_eq!(infer(vec![Value::Float(0.0001220703125)]), "float32");
        assert_eq!(infer(vec![Value::Float(0.1)]), "float64");
        assert_eq!(infer(vec![Value::Float(1e39)]), "float64");
        // One float makes the whole column a float column.
        assert_eq!(infer(vec![Value::Int(1), Value::Float(2.5)]), "float16");
    }

    #[test]
    fn test_bool_and_binary() {
        assert_eq!(infer(vec![Value::Bool(true), Value::Bool(false)]), "bool");
        assert_eq!(infer(vec![Value::Bytes(vec![1]), Value::Bytes(vec![])]), "binary");
    }

    #[test]
    fn test_string_kinds() {
        assert_eq!(
            infer(vec![
                Value::Str("550e8400-e29b-41d4-a716-446655440000".into()),
                Value::Str("6BA7B810-9DAD-11D1-80B4-00C04FD430C8".into()),
            ]),
            "uuid"
        );
        assert_eq!(
            infer(vec![
                Value::Str("2024-01-31".into()),
                Value::Str("2023-12-01".into()),
            ]),
            "date"
        );
        assert_eq!(
            infer(vec![
                Value::Str("2024-01-31T10:00:00".into()),
                Value::Str("2024-01-31T10:00:00.250+02:00".into()),
            ]),
            "datetime"
        );
        // Malformed date demotes to the dictionary family.
        assert_eq!(
            infer(vec![
                Value::Str("2024-01-31".into()),
                Value::Str("2024-13-99".into()),
            ]),
            "enum"
        );
    }

    #[test]
    fn test_dictionary_thresholds() {
        let few: Vec<Value> = (0..1000)
            .map(|i| Value::Str(format!("v{}", i % 10)))
            .collect();
        assert_eq!(infer(few), "enum");

        // 300 distinct over 1000 rows: above 256, exactly at the 0.30 ratio.
        let dict: Vec<Value> = (0..1000)
            .map(|i| Value::Str(format!("v{}", i % 300)))
            .collect();
        assert_eq!(infer(dict), "string_dict");

        let unique: Vec<Value> = (0..1000).map(|i| Value::Str(format!("v{}", i))).collect();
        assert_eq!(infer(unique), "str");
    }

    #[test]
    fn test_nullable_wrapping() {
        assert_eq!(
            infer(vec![Value::Null, Value::Int(1), Value::Int(2)]),
            "nullable<uint8>"
        );
        assert_eq!(infer(vec![Value::Null, Value::Null]), "nullable<json>");
        assert_eq!(infer(vec![]), "json");
    }

    #[test]
    fn test_mixed_classes_fall_back_to_json() {
        assert_eq!(infer(vec![Value::Int(1), Value::Str("x".into())]), "json");
        assert_eq!(
            infer(vec![Value::Array(vec![Value::Int(1)]), Value::Int(2)]),
            "json"
        );
    }
}
