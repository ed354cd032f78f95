//! Per-type column payload codec
//!
//! For each physical type T this module defines a deterministic, bit-exact
//! pair `encode`/`decode` over the uncompressed block payload. Packed types
//! produce little-endian fixed-width arrays with no length prefix; the
//! remaining types produce JSON text rendered through the [`JsonCodec`]
//! collaborator. Compression happens one layer up.
//!
//! Payload contracts:
//! ```text
//! int*/uint*/float*        packed little-endian array, fixed element width
//! bool                     one byte per value, 0x00 or 0x01
//! timestamp_ms             packed little-endian i64
//! date/datetime/uuid/str   JSON array of strings
//! binary                   JSON array of base64 strings
//! json                     JSON array of arbitrary values
//! enum/string_dict         JSON object {"dict": [...], "idx": [...]}
//! nullable<T>              JSON object {"nulls": [...], "values": ...};
//!                          packed T rides as one base64 string of the
//!                          dense bytes, other T embed their JSON payload
//! ```

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use half::f16;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::compress::JsonCodec;
use crate::types::ColumnType;
use crate::value::Value;
use crate::{JonxError, Result};

/// Dictionary-encoded block: table in first-seen order plus one ordinal per
/// original position.
#[derive(Debug, Serialize, Deserialize)]
struct DictBlock {
    dict: Vec<String>,
    idx: Vec<u32>,
}

/// Nullable block: one flag per row, dense payload over the non-null rows.
#[derive(Debug, Serialize, Deserialize)]
struct NullableBlock {
    nulls: Vec<bool>,
    values: JsonValue,
}

const ENUM_MAX_DICT: usize = 256;

/// Encode one column into its uncompressed block payload.
pub fn encode_column(
    field: &str,
    ty: &ColumnType,
    values: &[Value],
    json: &dyn JsonCodec,
) -> Result<Vec<u8>> {
    if let ColumnType::Nullable(base) = ty {
        let nulls: Vec<bool> = values.iter().map(Value::is_null).collect();
        let dense: Vec<Value> = values.iter().filter(|v| !v.is_null()).cloned().collect();
        let dense_json = if base.is_packed() {
            JsonValue::String(BASE64.encode(pack_fixed(field, base, &dense)?))
        } else {
            encode_json_payload(field, base, &dense)?
        };
        let block = NullableBlock {
            nulls,
            values: dense_json,
        };
        return json.encode(&serde_json::to_value(&block).map_err(|e| {
            JonxError::JsonEncode(format!("field '{}': {}", field, e))
        })?);
    }

    if ty.is_packed() {
        return pack_fixed(field, ty, values);
    }

    let payload = encode_json_payload(field, ty, values)?;
    json.encode(&payload)
}

/// Decode one column from its uncompressed block payload.
///
/// `expected_rows` is the row count established by a previously decoded
/// column, if any; a mismatching block is rejected rather than truncated.
pub fn decode_column(
    field: &str,
    ty: &ColumnType,
    bytes: &[u8],
    expected_rows: Option<usize>,
    json: &dyn JsonCodec,
) -> Result<Vec<Value>> {
    if let ColumnType::Nullable(base) = ty {
        let block: NullableBlock = parse_block(field, bytes, json)?;
        if let Some(n) = expected_rows {
            if block.nulls.len() != n {
                return Err(JonxError::BlockLength {
                    field: field.to_string(),
                    detail: format!("null mask has {} entries, expected {}", block.nulls.len(), n),
                });
            }
        }
        let dense_count = block.nulls.iter().filter(|&&is_null| !is_null).count();
        let dense = if base.is_packed() {
            let text = block.values.as_str().ok_or_else(|| JonxError::MalformedBlock {
                field: field.to_string(),
                detail: "packed nullable values must be a base64 string".to_string(),
            })?;
            let raw = BASE64.decode(text).map_err(|e| JonxError::MalformedBlock {
                field: field.to_string(),
                detail: format!("invalid base64 in nullable payload: {}", e),
            })?;
            unpack_fixed(field, base, &raw, Some(dense_count))?
        } else {
            decode_json_payload(field, base, block.values, Some(dense_count))?
        };
        return interleave(field, &block.nulls, dense);
    }

    if ty.is_packed() {
        return unpack_fixed(field, ty, bytes, expected_rows);
    }

    let payload = json.decode(bytes).map_err(|e| JonxError::MalformedBlock {
        field: field.to_string(),
        detail: e.to_string(),
    })?;
    decode_json_payload(field, ty, payload, expected_rows)
}

// ============================================================================
// Packed payloads
// ============================================================================

fn pack_fixed(field: &str, ty: &ColumnType, values: &[Value]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(values.len() * ty.width());
    match ty {
        ColumnType::Int8 => {
            for v in values {
                let x = int_in_range(field, v, i8::MIN as i128, i8::MAX as i128)?;
                buf.extend_from_slice(&(x as i8).to_le_bytes());
            }
        }
        ColumnType::Int16 => {
            for v in values {
                let x = int_in_range(field, v, i16::MIN as i128, i16::MAX as i128)?;
                buf.extend_from_slice(&(x as i16).to_le_bytes());
            }
        }
        ColumnType::Int32 => {
            for v in values {
                let x = int_in_range(field, v, i32::MIN as i128, i32::MAX as i128)?;
                buf.extend_from_slice(&(x as i32).to_le_bytes());
            }
        }
        ColumnType::Int64 | ColumnType::TimestampMs => {
            for v in values {
                let x = int_in_range(field, v, i64::MIN as i128, i64::MAX as i128)?;
                buf.extend_from_slice(&(x as i64).to_le_bytes());
            }
        }
        ColumnType::UInt8 => {
            for v in values {
                let x = int_in_range(field, v, 0, u8::MAX as i128)?;
                buf.push(x as u8);
            }
        }
        ColumnType::UInt16 => {
            for v in values {
                let x = int_in_range(field, v, 0, u16::MAX as i128)?;
                buf.extend_from_slice(&(x as u16).to_le_bytes());
            }
        }
        ColumnType::UInt32 => {
            for v in values {
                let x = int_in_range(field, v, 0, u32::MAX as i128)?;
                buf.extend_from_slice(&(x as u32).to_le_bytes());
            }
        }
        ColumnType::UInt64 => {
            for v in values {
                let x = int_in_range(field, v, 0, u64::MAX as i128)?;
                buf.extend_from_slice(&(x as u64).to_le_bytes());
            }
        }
        ColumnType::Float16 => {
            for v in values {
                let x = number(field, v)?;
                buf.extend_from_slice(&f16::from_f64(x).to_le_bytes());
            }
        }
        ColumnType::Float32 => {
            for v in values {
                let x = number(field, v)?;
                buf.extend_from_slice(&(x as f32).to_le_bytes());
            }
        }
        ColumnType::Float64 => {
            for v in values {
                let x = number(field, v)?;
                buf.extend_from_slice(&x.to_le_bytes());
            }
        }
        ColumnType::Bool => {
            for v in values {
                match v {
                    Value::Bool(b) => buf.push(u8::from(*b)),
                    other => {
                        return Err(JonxError::UnsupportedValue {
                            field: field.to_string(),
                            detail: format!("expected boolean, got {:?}", other),
                        })
                    }
                }
            }
        }
        other => {
            return Err(JonxError::UnsupportedValue {
                field: field.to_string(),
                detail: format!("type {} has no packed form", other),
            })
        }
    }
    Ok(buf)
}

fn unpack_fixed(
    field: &str,
    ty: &ColumnType,
    bytes: &[u8],
    expected_rows: Option<usize>,
) -> Result<Vec<Value>> {
    let width = ty.width();
    if width == 0 || bytes.len() % width != 0 {
        return Err(JonxError::BlockLength {
            field: field.to_string(),
            detail: format!(
                "{} payload bytes do not divide into elements of width {}",
                bytes.len(),
                width
            ),
        });
    }
    let n = bytes.len() / width;
    if let Some(expected) = expected_rows {
        if n != expected {
            return Err(JonxError::BlockLength {
                field: field.to_string(),
                detail: format!("block holds {} values, expected {}", n, expected),
            });
        }
    }

    let mut out = Vec::with_capacity(n);
    match ty {
        ColumnType::Int8 => {
            for chunk in bytes.chunks_exact(1) {
                out.push(Value::Int(i8::from_le_bytes([chunk[0]]) as i64));
            }
        }
        ColumnType::Int16 => {
            for chunk in bytes.chunks_exact(2) {
                out.push(Value::Int(
                    i16::from_le_bytes([chunk[0], chunk[1]]) as i64
                ));
            }
        }
        ColumnType::Int32 => {
            for chunk in bytes.chunks_exact(4) {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(chunk);
                out.push(Value::Int(i32::from_le_bytes(raw) as i64));
            }
        }
        ColumnType::Int64 | ColumnType::TimestampMs => {
            for chunk in bytes.chunks_exact(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                out.push(Value::Int(i64::from_le_bytes(raw)));
            }
        }
        ColumnType::UInt8 => {
            for &b in bytes {
                out.push(Value::Int(b as i64));
            }
        }
        ColumnType::UInt16 => {
            for chunk in bytes.chunks_exact(2) {
                out.push(Value::Int(
                    u16::from_le_bytes([chunk[0], chunk[1]]) as i64
                ));
            }
        }
        ColumnType::UInt32 => {
            for chunk in bytes.chunks_exact(4) {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(chunk);
                out.push(Value::Int(u32::from_le_bytes(raw) as i64));
            }
        }
        ColumnType::UInt64 => {
            for chunk in bytes.chunks_exact(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                let v = u64::from_le_bytes(raw);
                if v <= i64::MAX as u64 {
                    out.push(Value::Int(v as i64));
                } else {
                    out.push(Value::UInt(v));
                }
            }
        }
        ColumnType::Float16 => {
            for chunk in bytes.chunks_exact(2) {
                let x = f16::from_le_bytes([chunk[0], chunk[1]]);
                out.push(Value::Float(x.to_f64()));
            }
        }
        ColumnType::Float32 => {
            for chunk in bytes.chunks_exact(4) {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(chunk);
                out.push(Value::Float(f32::from_le_bytes(raw) as f64));
            }
        }
        ColumnType::Float64 => {
            for chunk in bytes.chunks_exact(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                out.push(Value::Float(f64::from_le_bytes(raw)));
            }
        }
        ColumnType::Bool => {
            for &b in bytes {
                match b {
                    0x00 => out.push(Value::Bool(false)),
                    0x01 => out.push(Value::Bool(true)),
                    other => {
                        return Err(JonxError::MalformedBlock {
                            field: field.to_string(),
                            detail: format!("invalid boolean byte 0x{:02x}", other),
                        })
                    }
                }
            }
        }
        other => {
            return Err(JonxError::MalformedBlock {
                field: field.to_string(),
                detail: format!("type {} has no packed form", other),
            })
        }
    }
    Ok(out)
}

// ============================================================================
// JSON payloads
// ============================================================================

fn encode_json_payload(field: &str, ty: &ColumnType, values: &[Value]) -> Result<JsonValue> {
    match ty {
        ColumnType::Date | ColumnType::DateTime | ColumnType::Uuid | ColumnType::Str => {
            let mut out = Vec::with_capacity(values.len());
            for v in values {
                out.push(JsonValue::String(expect_string(field, v)?.to_string()));
            }
            Ok(JsonValue::Array(out))
        }
        ColumnType::Binary => {
            let mut out = Vec::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Bytes(raw) => out.push(JsonValue::String(BASE64.encode(raw))),
                    other => {
                        return Err(JonxError::UnsupportedValue {
                            field: field.to_string(),
                            detail: format!("expected bytes, got {:?}", other),
                        })
                    }
                }
            }
            Ok(JsonValue::Array(out))
        }
        ColumnType::Json => {
            let mut out = Vec::with_capacity(values.len());
            for v in values {
                out.push(v.to_json().map_err(|e| with_field(field, e))?);
            }
            Ok(JsonValue::Array(out))
        }
        ColumnType::Enum | ColumnType::StringDict => {
            let block = build_dict(field, ty, values)?;
            serde_json::to_value(&block)
                .map_err(|e| JonxError::JsonEncode(format!("field '{}': {}", field, e)))
        }
        other => Err(JonxError::UnsupportedValue {
            field: field.to_string(),
            detail: format!("type {} has no JSON payload", other),
        }),
    }
}

/// Dictionary table in first-seen order; observable in file output and
/// therefore part of the format contract.
fn build_dict(field: &str, ty: &ColumnType, values: &[Value]) -> Result<DictBlock> {
    let mut seen: HashMap<String, u32> = HashMap::new();
    let mut dict: Vec<String> = Vec::new();
    let mut idx: Vec<u32> = Vec::with_capacity(values.len());

    for v in values {
        let s = expect_string(field, v)?;
        let ordinal = match seen.get(s) {
            Some(&i) => i,
            None => {
                let i = dict.len() as u32;
                seen.insert(s.to_string(), i);
                dict.push(s.to_string());
                i
            }
        };
        idx.push(ordinal);
    }

    if *ty == ColumnType::Enum && dict.len() > ENUM_MAX_DICT {
        return Err(JonxError::UnsupportedValue {
            field: field.to_string(),
            detail: format!("enum dictionary holds {} entries, limit {}", dict.len(), ENUM_MAX_DICT),
        });
    }
    Ok(DictBlock { dict, idx })
}

fn decode_json_payload(
    field: &str,
    ty: &ColumnType,
    payload: JsonValue,
    expected_rows: Option<usize>,
) -> Result<Vec<Value>> {
    match ty {
        ColumnType::Date | ColumnType::DateTime | ColumnType::Uuid | ColumnType::Str => {
            let items = expect_array(field, payload)?;
            check_rows(field, items.len(), expected_rows)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    JsonValue::String(s) => out.push(Value::Str(s)),
                    other => {
                        return Err(JonxError::MalformedBlock {
                            field: field.to_string(),
                            detail: format!("expected string element, got {}", other),
                        })
                    }
                }
            }
            Ok(out)
        }
        ColumnType::Binary => {
            let items = expect_array(field, payload)?;
            check_rows(field, items.len(), expected_rows)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let text = item.as_str().ok_or_else(|| JonxError::MalformedBlock {
                    field: field.to_string(),
                    detail: "binary elements must be base64 strings".to_string(),
                })?;
                let raw = BASE64.decode(text).map_err(|e| JonxError::MalformedBlock {
                    field: field.to_string(),
                    detail: format!("invalid base64: {}", e),
                })?;
                out.push(Value::Bytes(raw));
            }
            Ok(out)
        }
        ColumnType::Json => {
            let items = expect_array(field, payload)?;
            check_rows(field, items.len(), expected_rows)?;
            Ok(items.into_iter().map(Value::from_json).collect())
        }
        ColumnType::Enum | ColumnType::StringDict => {
            let block: DictBlock =
                serde_json::from_value(payload).map_err(|e| JonxError::MalformedBlock {
                    field: field.to_string(),
                    detail: format!("malformed dictionary block: {}", e),
                })?;
            if *ty == ColumnType::Enum && block.dict.len() > ENUM_MAX_DICT {
                return Err(JonxError::MalformedBlock {
                    field: field.to_string(),
                    detail: format!(
                        "enum dictionary holds {} entries, limit {}",
                        block.dict.len(),
                        ENUM_MAX_DICT
                    ),
                });
            }
            check_rows(field, block.idx.len(), expected_rows)?;
            let mut out = Vec::with_capacity(block.idx.len());
            for ordinal in block.idx {
                let entry =
                    block
                        .dict
                        .get(ordinal as usize)
                        .ok_or_else(|| JonxError::MalformedBlock {
                            field: field.to_string(),
                            detail: format!(
                                "dictionary ordinal {} out of range for table of {}",
                                ordinal,
                                block.dict.len()
                            ),
                        })?;
                out.push(Value::Str(entry.clone()));
            }
            Ok(out)
        }
        other => Err(JonxError::MalformedBlock {
            field: field.to_string(),
            detail: format!("type {} has no JSON payload", other),
        }),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_block<T: serde::de::DeserializeOwned>(
    field: &str,
    bytes: &[u8],
    json: &dyn JsonCodec,
) -> Result<T> {
    let payload = json.decode(bytes).map_err(|e| JonxError::MalformedBlock {
        field: field.to_string(),
        detail: e.to_string(),
    })?;
    serde_json::from_value(payload).map_err(|e| JonxError::MalformedBlock {
        field: field.to_string(),
        detail: format!("malformed block structure: {}", e),
    })
}

fn interleave(field: &str, nulls: &[bool], dense: Vec<Value>) -> Result<Vec<Value>> {
    let mut values = dense.into_iter();
    let mut out = Vec::with_capacity(nulls.len());
    for &is_null in nulls {
        if is_null {
            out.push(Value::Null);
        } else {
            out.push(values.next().ok_or_else(|| JonxError::BlockLength {
                field: field.to_string(),
                detail: "dense payload shorter than null mask requires".to_string(),
            })?);
        }
    }
    Ok(out)
}

fn int_in_range(field: &str, v: &Value, lo: i128, hi: i128) -> Result<i128> {
    let x = v.as_i128().ok_or_else(|| JonxError::UnsupportedValue {
        field: field.to_string(),
        detail: format!("expected integer, got {:?}", v),
    })?;
    if x < lo || x > hi {
        return Err(JonxError::ValueOutOfRange {
            field: field.to_string(),
            detail: format!("{} outside [{}, {}]", x, lo, hi),
        });
    }
    Ok(x)
}

fn number(field: &str, v: &Value) -> Result<f64> {
    v.as_f64().ok_or_else(|| JonxError::UnsupportedValue {
        field: field.to_string(),
        detail: format!("expected number, got {:?}", v),
    })
}

fn expect_string<'a>(field: &str, v: &'a Value) -> Result<&'a str> {
    v.as_str().ok_or_else(|| JonxError::UnsupportedValue {
        field: field.to_string(),
        detail: format!("expected string, got {:?}", v),
    })
}

fn expect_array(field: &str, payload: JsonValue) -> Result<Vec<JsonValue>> {
    match payload {
        JsonValue::Array(items) => Ok(items),
        other => Err(JonxError::MalformedBlock {
            field: field.to_string(),
            detail: format!("expected JSON array payload, got {}", other),
        }),
    }
}

fn check_rows(field: &str, actual: usize, expected: Option<usize>) -> Result<()> {
    if let Some(expected) = expected {
        if actual != expected {
            return Err(JonxError::BlockLength {
                field: field.to_string(),
                detail: format!("block holds {} values, expected {}", actual, expected),
            });
        }
    }
    Ok(())
}

fn with_field(field: &str, err: JonxError) -> JonxError {
    match err {
        JonxError::UnsupportedValue { detail, .. } => JonxError::UnsupportedValue {
            field: field.to_string(),
            detail,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::SerdeJsonCodec;

    fn round_trip(ty: ColumnType, values: Vec<Value>) -> Vec<Value> {
        let json = SerdeJsonCodec;
        let block = encode_column("f", &ty, &values, &json).unwrap();
        decode_column("f", &ty, &block, Some(values.len()), &json).unwrap()
    }

    #[test]
    fn test_packed_integers() {
        let values = vec![Value::Int(-128), Value::Int(0), Value::Int(127)];
        assert_eq!(round_trip(ColumnType::Int8, values.clone()), values);

        let block = encode_column(
            "f",
            &ColumnType::Int32,
            &[Value::Int(1), Value::Int(2), Value::Int(3)],
            &SerdeJsonCodec,
        )
        .unwrap();
        assert_eq!(
            block,
            vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0],
        );
    }

    #[test]
    fn test_packed_uint64_beyond_i64() {
        let values = vec![Value::Int(7), Value::UInt(u64::MAX)];
        assert_eq!(round_trip(ColumnType::UInt64, values.clone()), values);
    }

    #[test]
    fn test_out_of_range_integer_rejected() {
        let err = encode_column(
            "f",
            &ColumnType::UInt8,
            &[Value::Int(256)],
            &SerdeJsonCodec,
        )
        .unwrap_err();
        assert!(matches!(err, JonxError::ValueOutOfRange { .. }));

        // int64 cannot carry a value above i64::MAX.
        let err = encode_column(
            "f",
            &ColumnType::Int64,
            &[Value::UInt(u64::MAX)],
            &SerdeJsonCodec,
        )
        .unwrap_err();
        assert!(matches!(err, JonxError::ValueOutOfRange { .. }));
    }

    #[test]
    fn test_floats() {
        let values = vec![Value::Float(0.5), Value::Float(-1.25)];
        assert_eq!(round_trip(ColumnType::Float16, values.clone()), values);
        assert_eq!(round_trip(ColumnType::Float32, values.clone()), values);
        assert_eq!(round_trip(ColumnType::Float64, values.clone()), values);
    }

    #[test]
    fn test_bool_payload() {
        let values = vec![Value::Bool(true), Value::Bool(false)];
        let block = encode_column("f", &ColumnType::Bool, &values, &SerdeJsonCodec).unwrap();
        assert_eq!(block, vec![0x01, 0x00]);

        let err =
            decode_column("f", &ColumnType::Bool, &[0x02], Some(1), &SerdeJsonCodec).unwrap_err();
        assert!(matches!(err, JonxError::MalformedBlock { .. }));
    }

    #[test]
    fn test_block_length_mismatch() {
        // Three bytes cannot be int16 elements.
        let err = decode_column(
            "f",
            &ColumnType::Int16,
            &[0, 1, 2],
            None,
            &SerdeJsonCodec,
        )
        .unwrap_err();
        assert!(matches!(err, JonxError::BlockLength { .. }));

        let err = decode_column(
            "f",
            &ColumnType::Int16,
            &[0, 1, 2, 3],
            Some(3),
            &SerdeJsonCodec,
        )
        .unwrap_err();
        assert!(matches!(err, JonxError::BlockLength { .. }));
    }

    #[test]
    fn test_timestamp_ms_packs_as_i64() {
        let values = vec![Value::Int(1_700_000_000_000), Value::Int(-1)];
        let block =
            encode_column("f", &ColumnType::TimestampMs, &values, &SerdeJsonCodec).unwrap();
        assert_eq!(block.len(), 16);
        assert_eq!(round_trip(ColumnType::TimestampMs, values.clone()), values);
    }

    #[test]
    fn test_dictionary_first_seen_order() {
        let values = vec![
            Value::Str("A".into()),
            Value::Str("B".into()),
            Value::Str("A".into()),
            Value::Str("A".into()),
        ];
        let block = encode_column("f", &ColumnType::Enum, &values, &SerdeJsonCodec).unwrap();
        let payload: JsonValue = serde_json::from_slice(&block).unwrap();
        assert_eq!(payload["dict"], serde_json::json!(["A", "B"]));
        assert_eq!(payload["idx"], serde_json::json!([0, 1, 0, 0]));

        assert_eq!(round_trip(ColumnType::Enum, values.clone()), values);
        assert_eq!(round_trip(ColumnType::StringDict, values.clone()), values);
    }

    #[test]
    fn test_dictionary_ordinal_out_of_range() {
        let bad = serde_json::to_vec(&serde_json::json!({"dict": ["A"], "idx": [0, 1]})).unwrap();
        let err =
            decode_column("f", &ColumnType::Enum, &bad, Some(2), &SerdeJsonCodec).unwrap_err();
        assert!(matches!(err, JonxError::MalformedBlock { .. }));
    }

    #[test]
    fn test_strings_and_binary() {
        let values = vec![Value::Str("a".into()), Value::Str("b".into())];
        assert_eq!(round_trip(ColumnType::Str, values.clone()), values);
        assert_eq!(round_trip(ColumnType::Uuid, values.clone()), values);

        let values = vec![Value::Bytes(vec![0, 1, 255]), Value::Bytes(vec![])];
        assert_eq!(round_trip(ColumnType::Binary, values.clone()), values);
    }

    #[test]
    fn test_json_fallback() {
        let values = vec![
            Value::Array(vec![Value::Int(1), Value::Null]),
            Value::Object([("k".to_string(), Value::Bool(true))].into_iter().collect()),
        ];
        assert_eq!(round_trip(ColumnType::Json, values.clone()), values);
    }

    #[test]
    fn test_nullable_packed_base() {
        let ty = ColumnType::Nullable(Box::new(ColumnType::UInt8));
        let values = vec![Value::Null, Value::Int(1), Value::Int(2)];

        let block = encode_column("v", &ty, &values, &SerdeJsonCodec).unwrap();
        let payload: JsonValue = serde_json::from_slice(&block).unwrap();
        assert_eq!(payload["nulls"], serde_json::json!([true, false, false]));
        // Dense payload is the two packed bytes, base64-encoded.
        assert_eq!(payload["values"], serde_json::json!(BASE64.encode([1u8, 2u8])));

        assert_eq!(round_trip(ty, values.clone()), values);
    }

    #[test]
    fn test_nullable_json_base() {
        let ty = ColumnType::Nullable(Box::new(ColumnType::Str));
        let values = vec![Value::Str("x".into()), Value::Null, Value::Str("y".into())];
        assert_eq!(round_trip(ty, values.clone()), values);

        let ty = ColumnType::Nullable(Box::new(ColumnType::Enum));
        let values = vec![Value::Null, Value::Str("A".into()), Value::Str("A".into())];
        assert_eq!(round_trip(ty, values.clone()), values);
    }

    #[test]
    fn test_nullable_dense_count_mismatch() {
        let bad = serde_json::to_vec(&serde_json::json!({
            "nulls": [false, false],
            "values": BASE64.encode([1u8]),
        }))
        .unwrap();
        let ty = ColumnType::Nullable(Box::new(ColumnType::UInt8));
        let err = decode_column("v", &ty, &bad, Some(2), &SerdeJsonCodec).unwrap_err();
        assert!(matches!(err, JonxError::BlockLength { .. }));
    }

    #[test]
    fn test_nullable_bool_is_packed() {
        let ty = ColumnType::Nullable(Box::new(ColumnType::Bool));
        let values = vec![Value::Bool(true), Value::Null, Value::Bool(false)];
        assert_eq!(round_trip(ty, values.clone()), values);
    }
}
