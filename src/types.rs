//! Physical column type catalogue
//!
//! Every column in a file carries exactly one of these types. The catalogue
//! exposes the classification predicates the rest of the crate dispatches on
//! (numeric, temporal, indexable, fixed-width packed) and the integer range
//! table used by type inference.

use crate::{JonxError, Result};

/// Physical column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Bool,
    /// ISO 8601 `YYYY-MM-DD` strings.
    Date,
    /// ISO 8601 datetime strings.
    DateTime,
    /// Signed milliseconds since the Unix epoch.
    TimestampMs,
    /// Canonical hyphenated UUID strings.
    Uuid,
    /// Dictionary-encoded strings, at most 256 distinct values.
    Enum,
    /// Dictionary-encoded strings, distinct ratio at most 0.30.
    StringDict,
    Str,
    /// Raw bytes, stored base64-encoded.
    Binary,
    /// Arbitrary JSON values.
    Json,
    /// Nullable wrapper around any non-nullable type.
    Nullable(Box<ColumnType>),
}

/// Signed integer ranges, narrowest first.
pub const INT_RANGES: [(ColumnType, i128, i128); 4] = [
    (ColumnType::Int8, i8::MIN as i128, i8::MAX as i128),
    (ColumnType::Int16, i16::MIN as i128, i16::MAX as i128),
    (ColumnType::Int32, i32::MIN as i128, i32::MAX as i128),
    (ColumnType::Int64, i64::MIN as i128, i64::MAX as i128),
];

/// Unsigned integer ranges, narrowest first.
pub const UINT_RANGES: [(ColumnType, i128, i128); 4] = [
    (ColumnType::UInt8, 0, u8::MAX as i128),
    (ColumnType::UInt16, 0, u16::MAX as i128),
    (ColumnType::UInt32, 0, u32::MAX as i128),
    (ColumnType::UInt64, 0, u64::MAX as i128),
];

impl ColumnType {
    /// Spec-exact type name as persisted in the schema block.
    pub fn name(&self) -> String {
        match self {
            ColumnType::Int8 => "int8".to_string(),
            ColumnType::Int16 => "int16".to_string(),
            ColumnType::Int32 => "int32".to_string(),
            ColumnType::Int64 => "int64".to_string(),
            ColumnType::UInt8 => "uint8".to_string(),
            ColumnType::UInt16 => "uint16".to_string(),
            ColumnType::UInt32 => "uint32".to_string(),
            ColumnType::UInt64 => "uint64".to_string(),
            ColumnType::Float16 => "float16".to_string(),
            ColumnType::Float32 => "float32".to_string(),
            ColumnType::Float64 => "float64".to_string(),
            ColumnType::Bool => "bool".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::DateTime => "datetime".to_string(),
            ColumnType::TimestampMs => "timestamp_ms".to_string(),
            ColumnType::Uuid => "uuid".to_string(),
            ColumnType::Enum => "enum".to_string(),
            ColumnType::StringDict => "string_dict".to_string(),
            ColumnType::Str => "str".to_string(),
            ColumnType::Binary => "binary".to_string(),
            ColumnType::Json => "json".to_string(),
            ColumnType::Nullable(inner) => format!("nullable<{}>", inner.name()),
        }
    }

    /// Parse a persisted type name. Single-level `nullable<T>` only.
    pub fn parse(name: &str) -> Result<ColumnType> {
        if let Some(inner) = name
            .strip_prefix("nullable<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            let base = ColumnType::parse(inner)?;
            if matches!(base, ColumnType::Nullable(_)) {
                return Err(JonxError::UnknownType(name.to_string()));
            }
            return Ok(ColumnType::Nullable(Box::new(base)));
        }
        match name {
            "int8" => Ok(ColumnType::Int8),
            "int16" => Ok(ColumnType::Int16),
            "int32" => Ok(ColumnType::Int32),
            "int64" => Ok(ColumnType::Int64),
            "uint8" => Ok(ColumnType::UInt8),
            "uint16" => Ok(ColumnType::UInt16),
            "uint32" => Ok(ColumnType::UInt32),
            "uint64" => Ok(ColumnType::UInt64),
            "float16" => Ok(ColumnType::Float16),
            "float32" => Ok(ColumnType::Float32),
            "float64" => Ok(ColumnType::Float64),
            "bool" => Ok(ColumnType::Bool),
            "date" => Ok(ColumnType::Date),
            "datetime" => Ok(ColumnType::DateTime),
            "timestamp_ms" => Ok(ColumnType::TimestampMs),
            "uuid" => Ok(ColumnType::Uuid),
            "enum" => Ok(ColumnType::Enum),
            "string_dict" => Ok(ColumnType::StringDict),
            "str" => Ok(ColumnType::Str),
            "binary" => Ok(ColumnType::Binary),
            "json" => Ok(ColumnType::Json),
            _ => Err(JonxError::UnknownType(name.to_string())),
        }
    }

    /// Check if this is a signed or unsigned integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Int8
                | ColumnType::Int16
                | ColumnType::Int32
                | ColumnType::Int64
                | ColumnType::UInt8
                | ColumnType::UInt16
                | ColumnType::UInt32
                | ColumnType::UInt64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            ColumnType::Float16 | ColumnType::Float32 | ColumnType::Float64
        )
    }

    /// Numeric means integer or float. The nullable wrapper is never numeric.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnType::Date | ColumnType::DateTime | ColumnType::TimestampMs
        )
    }

    /// Indexable columns carry a sorted-ordinal permutation in the file.
    /// Nullable columns never do.
    pub fn is_indexable(&self) -> bool {
        self.is_numeric() || self.is_temporal()
    }

    /// Types whose payload is a fixed-width little-endian array rather than
    /// JSON text. `bool` packs one byte per value.
    pub fn is_packed(&self) -> bool {
        self.is_numeric() || matches!(self, ColumnType::Bool | ColumnType::TimestampMs)
    }

    /// Element width in bytes for packed types, 0 otherwise.
    pub fn width(&self) -> usize {
        match self {
            ColumnType::Int8 | ColumnType::UInt8 | ColumnType::Bool => 1,
            ColumnType::Int16 | ColumnType::UInt16 | ColumnType::Float16 => 2,
            ColumnType::Int32 | ColumnType::UInt32 | ColumnType::Float32 => 4,
            ColumnType::Int64
            | ColumnType::UInt64
            | ColumnType::Float64
            | ColumnType::TimestampMs => 8,
            _ => 0,
        }
    }

    /// The wrapped type for `nullable<T>`, the type itself otherwise.
    pub fn base(&self) -> &ColumnType {
        match self {
            ColumnType::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ColumnType::Nullable(_))
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_parse_round_trip() {
        let all = [
            "int8",
            "int16",
            "int32",
            "int64",
            "uint8",
            "uint16",
            "uint32",
            "uint64",
            "float16",
            "float32",
            "float64",
            "bool",
            "date",
            "datetime",
            "timestamp_ms",
            "uuid",
            "enum",
            "string_dict",
            "str",
            "binary",
            "json",
            "nullable<uint8>",
            "nullable<json>",
        ];
        for name in all {
            let ty = ColumnType::parse(name).unwrap();
            assert_eq!(ty.name(), name);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_and_nested() {
        assert!(ColumnType::parse("string").is_err());
        assert!(ColumnType::parse("nullable<nullable<int8>>").is_err());
        assert!(ColumnType::parse("nullable<>").is_err());
    }

    #[test]
    fn test_predicates() {
        assert!(ColumnType::UInt32.is_integer());
        assert!(ColumnType::UInt32.is_indexable());
        assert!(ColumnType::Float16.is_float());
        assert!(ColumnType::Date.is_temporal());
        assert!(ColumnType::Date.is_indexable());
        assert!(!ColumnType::Date.is_packed());
        assert!(ColumnType::TimestampMs.is_packed());
        assert!(ColumnType::Bool.is_packed());
        assert!(!ColumnType::Enum.is_indexable());

        // The wrapper is neither numeric nor indexable.
        let wrapped = ColumnType::Nullable(Box::new(ColumnType::Int32));
        assert!(!wrapped.is_numeric());
        assert!(!wrapped.is_indexable());
        assert!(wrapped.base().is_numeric());
    }

    #[test]
    fn test_widths() {
        assert_eq!(ColumnType::Int8.width(), 1);
        assert_eq!(ColumnType::Float16.width(), 2);
        assert_eq!(ColumnType::UInt32.width(), 4);
        assert_eq!(ColumnType::TimestampMs.width(), 8);
        assert_eq!(ColumnType::Str.width(), 0);
    }
}
