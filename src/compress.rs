//! Compression and JSON collaborator interfaces
//!
//! The encoder and reader consume these traits rather than calling any
//! library directly, so the core stays library-agnostic. The defaults wrap
//! Zstandard and serde_json.

use serde_json::Value as JsonValue;

use crate::{JonxError, Result};

/// Compression level fixed by the file format.
pub const COMPRESSION_LEVEL: i32 = 7;

/// Upper bound on a single decompressed block.
const MAX_DECOMPRESSED_LEN: usize = 256 * 1024 * 1024;

/// Compresses one block of bytes.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>>;
}

/// Decompresses one block of bytes.
pub trait Decompressor: Send + Sync {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Encodes and decodes JSON documents.
pub trait JsonCodec: Send + Sync {
    fn encode(&self, value: &JsonValue) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<JsonValue>;
}

/// Default Zstandard implementation of both compression traits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdCompression;

impl Compressor for ZstdCompression {
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        zstd::bulk::compress(data, level).map_err(|e| JonxError::Compression(e.to_string()))
    }
}

impl Decompressor for ZstdCompression {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::decompress(data, MAX_DECOMPRESSED_LEN)
            .map_err(|e| JonxError::Decompression(e.to_string()))
    }
}

/// Default serde_json implementation of [`JsonCodec`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SerdeJsonCodec;

impl JsonCodec for SerdeJsonCodec {
    fn encode(&self, value: &JsonValue) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| JonxError::JsonEncode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<JsonValue> {
        serde_json::from_slice(bytes).map_err(|e| JonxError::JsonDecode(e.to_string()))
    }
}
