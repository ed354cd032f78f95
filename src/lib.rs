//! JONX columnar container
//!
//! A single-file binary format for homogeneous JSON record sets. Each column
//! is typed independently (the narrowest physical encoding that fits),
//! packed bit-exactly, and Zstandard-compressed; numeric and temporal
//! columns carry a sorted-ordinal index so extremum lookups cost one index
//! decompression, then O(1).
//!
//! ```no_run
//! use jonx::{JonxReader, Value};
//!
//! let records: Vec<Value> = serde_json::from_str::<Vec<serde_json::Value>>(
//!     r#"[{"id": 1, "price": 9.5}, {"id": 2, "price": 3.25}]"#,
//! )
//! .unwrap()
//! .into_iter()
//! .map(Value::from_json)
//! .collect();
//!
//! let bytes = jonx::encode(&records).unwrap();
//! let reader = JonxReader::from_bytes(bytes).unwrap();
//! let cheapest = reader.find_min("price", true).unwrap();
//! # let _ = cheapest;
//! ```

pub mod codec;
pub mod compress;
pub mod encoder;
pub mod index;
pub mod infer;
pub mod reader;
pub mod types;
pub mod value;

// Re-export main types
pub use compress::{
    Compressor, Decompressor, JsonCodec, SerdeJsonCodec, ZstdCompression, COMPRESSION_LEVEL,
};
pub use encoder::{encode, encode_to_path, JonxEncoder, Schema};
pub use infer::infer_column_type;
pub use reader::{ColumnSum, FileInfo, JonxReader, SchemaReport};
pub use types::ColumnType;
pub use value::Value;

/// File signature, the first four bytes of every JONX file.
pub const SIGNATURE: &[u8; 4] = b"JONX";
/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Failure category, one per error kind the format distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments or inconsistent schema.
    Validation,
    /// Malformed or truncated file content.
    Decode,
    /// Unencodable input record sets.
    Encode,
    /// Underlying I/O failures.
    File,
}

/// Crate error type
#[derive(Debug, thiserror::Error)]
pub enum JonxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("record set is empty")]
    EmptyRecordSet,

    #[error("record at index {index} is not an object")]
    NotAnObject { index: usize },

    #[error("column '{0}' has no values")]
    EmptyColumn(String),

    #[error("column '{field}' of type {type_name} is not numeric")]
    NotNumeric { field: String, type_name: String },

    #[error("invalid schema: {0}")]
    SchemaInvalid(String),

    #[error("record at index {index} does not match the first record: {detail}")]
    RecordSchemaMismatch { index: usize, detail: String },

    #[error("column '{field}': unsupported value: {detail}")]
    UnsupportedValue { field: String, detail: String },

    #[error("column '{field}': value out of range: {detail}")]
    ValueOutOfRange { field: String, detail: String },

    #[error("column '{field}': block of {len} bytes exceeds the u32 length prefix")]
    BlockTooLarge { field: String, len: usize },

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("JSON serialization failed: {0}")]
    JsonEncode(String),

    #[error("invalid file signature")]
    InvalidSignature,

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("truncated file: {0}")]
    Truncated(String),

    #[error("{extra} trailing bytes after the index section")]
    TrailingData { extra: usize },

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("JSON parsing failed: {0}")]
    JsonDecode(String),

    #[error("unknown column type: {0}")]
    UnknownType(String),

    #[error("column '{field}': block length mismatch: {detail}")]
    BlockLength { field: String, detail: String },

    #[error("column '{field}': malformed block: {detail}")]
    MalformedBlock { field: String, detail: String },

    #[error("index '{field}': {detail}")]
    MalformedIndex { field: String, detail: String },
}

impl JonxError {
    /// The failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            JonxError::Io(_) => ErrorKind::File,

            JonxError::FieldNotFound(_)
            | JonxError::EmptyRecordSet
            | JonxError::NotAnObject { .. }
            | JonxError::EmptyColumn(_)
            | JonxError::NotNumeric { .. }
            | JonxError::SchemaInvalid(_) => ErrorKind::Validation,

            JonxError::RecordSchemaMismatch { .. }
            | JonxError::UnsupportedValue { .. }
            | JonxError::ValueOutOfRange { .. }
            | JonxError::BlockTooLarge { .. }
            | JonxError::Compression(_)
            | JonxError::JsonEncode(_) => ErrorKind::Encode,

            JonxError::InvalidSignature
            | JonxError::UnsupportedVersion(_)
            | JonxError::Truncated(_)
            | JonxError::TrailingData { .. }
            | JonxError::Decompression(_)
            | JonxError::JsonDecode(_)
            | JonxError::UnknownType(_)
            | JonxError::BlockLength { .. }
            | JonxError::MalformedBlock { .. }
            | JonxError::MalformedIndex { .. } => ErrorKind::Decode,
        }
    }
}

pub type Result<T> = std::result::Result<T, JonxError>;
