//! Record-set encoder and file framer
//!
//! Encoding pipeline: validate record homogeneity, pivot to columns, infer
//! one physical type per column, encode and compress each block, then emit
//! the framed file:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Signature "JONX" (4 bytes)                   │
//! │ Version: u32 = 1                             │
//! ├──────────────────────────────────────────────┤
//! │ Schema block length: u32                     │
//! │ Zstd(schema JSON {"fields": .., "types": ..})│
//! ├──────────────────────────────────────────────┤
//! │ Per field, in schema order:                  │
//! │   Column block length: u32                   │
//! │   Zstd(column payload)                       │
//! ├──────────────────────────────────────────────┤
//! │ Index count: u32                             │
//! │ Per index:                                   │
//! │   Name length: u32, name (UTF-8)             │
//! │   Index block length: u32                    │
//! │   Zstd(JSON array of u32 ordinals)           │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All integers little-endian. The encoder is fail-fast: the first
//! heterogeneous record or unencodable value aborts with no partial output.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::compress::{Compressor, JsonCodec, SerdeJsonCodec, ZstdCompression, COMPRESSION_LEVEL};
use crate::index::build_sorted_index;
use crate::infer::infer_column_type;
use crate::value::Value;
use crate::{JonxError, Result, FORMAT_VERSION, SIGNATURE};

/// Persisted schema block: field order plus the type name of every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<String>,
    pub types: BTreeMap<String, String>,
}

/// Encodes record sets into JONX bytes.
pub struct JonxEncoder {
    compressor: Arc<dyn Compressor>,
    json: Arc<dyn JsonCodec>,
}

impl Default for JonxEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JonxEncoder {
    /// Encoder with the default Zstandard and serde_json collaborators.
    pub fn new() -> Self {
        Self {
            compressor: Arc::new(ZstdCompression),
            json: Arc::new(SerdeJsonCodec),
        }
    }

    /// Encoder with caller-supplied collaborators.
    pub fn with_collaborators(
        compressor: Arc<dyn Compressor>,
        json: Arc<dyn JsonCodec>,
    ) -> Self {
        Self { compressor, json }
    }

    /// Encode a record set into a complete JONX byte sequence.
    pub fn encode_records(&self, records: &[Value]) -> Result<Vec<u8>> {
        let (fields, columns) = pivot(records)?;
        debug!(
            "encoding {} records across {} columns",
            records.len(),
            fields.len()
        );

        let mut types = BTreeMap::new();
        let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(fields.len());
        let mut indexes: Vec<(String, Vec<u8>)> = Vec::new();

        for (field, column) in fields.iter().zip(columns.iter()) {
            let ty = infer_column_type(column);

            let payload = codec::encode_column(field, &ty, column, self.json.as_ref())?;
            blocks.push(self.compressor.compress(&payload, COMPRESSION_LEVEL)?);

            if ty.is_indexable() {
                let ordinals = build_sorted_index(column);
                let payload = self.json.encode(&serde_json::to_value(&ordinals).map_err(
                    |e| JonxError::JsonEncode(format!("field '{}': {}", field, e)),
                )?)?;
                indexes.push((
                    field.clone(),
                    self.compressor.compress(&payload, COMPRESSION_LEVEL)?,
                ));
            }

            types.insert(field.clone(), ty.name());
        }

        let schema = Schema {
            fields: fields.clone(),
            types,
        };
        let schema_json = serde_json::to_value(&schema)
            .map_err(|e| JonxError::JsonEncode(e.to_string()))?;
        let schema_block = self
            .compressor
            .compress(&self.json.encode(&schema_json)?, COMPRESSION_LEVEL)?;

        let mut out = Vec::new();
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());

        out.extend_from_slice(&block_len("schema", schema_block.len())?.to_le_bytes());
        out.extend_from_slice(&schema_block);

        for (field, block) in fields.iter().zip(blocks.iter()) {
            out.extend_from_slice(&block_len(field, block.len())?.to_le_bytes());
            out.extend_from_slice(block);
        }

        out.extend_from_slice(&(indexes.len() as u32).to_le_bytes());
        for (field, block) in &indexes {
            out.extend_from_slice(&block_len(field, field.len())?.to_le_bytes());
            out.extend_from_slice(field.as_bytes());
            out.extend_from_slice(&block_len(field, block.len())?.to_le_bytes());
            out.extend_from_slice(block);
        }

        debug!(
            "encoded file: {} bytes, {} indexed columns",
            out.len(),
            indexes.len()
        );
        Ok(out)
    }

    /// Encode and write to a file.
    pub fn encode_to_path(&self, records: &[Value], path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.encode_records(records)?;
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        log::info!(
            "wrote {} bytes to {}",
            bytes.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}

/// Encode a record set with the default collaborators.
pub fn encode(records: &[Value]) -> Result<Vec<u8>> {
    JonxEncoder::new().encode_records(records)
}

/// Encode a record set to a file with the default collaborators.
pub fn encode_to_path(records: &[Value], path: impl AsRef<Path>) -> Result<()> {
    JonxEncoder::new().encode_to_path(records, path)
}

/// Validate homogeneity and pivot records into columns.
fn pivot(records: &[Value]) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    if records.is_empty() {
        return Err(JonxError::EmptyRecordSet);
    }

    let first = match &records[0] {
        Value::Object(map) => map,
        _ => return Err(JonxError::NotAnObject { index: 0 }),
    };
    if first.is_empty() {
        return Err(JonxError::SchemaInvalid(
            "records contain no fields".to_string(),
        ));
    }
    let fields: Vec<String> = first.keys().cloned().collect();

    let mut columns: Vec<Vec<Value>> = fields
        .iter()
        .map(|_| Vec::with_capacity(records.len()))
        .collect();

    for (i, record) in records.iter().enumerate() {
        let map = match record {
            Value::Object(map) => map,
            _ => return Err(JonxError::NotAnObject { index: i }),
        };
        if map.len() != fields.len() || !fields.iter().all(|f| map.contains_key(f)) {
            let missing: Vec<&String> =
                fields.iter().filter(|f| !map.contains_key(*f)).collect();
            let extra: Vec<&String> =
                map.keys().filter(|k| !fields.contains(*k)).collect();
            return Err(JonxError::RecordSchemaMismatch {
                index: i,
                detail: format!("missing keys {:?}, extra keys {:?}", missing, extra),
            });
        }
        for (field, column) in fields.iter().zip(columns.iter_mut()) {
            column.push(map[field].clone());
        }
    }

    Ok((fields, columns))
}

fn block_len(field: &str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| JonxError::BlockTooLarge {
        field: field.to_string(),
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Value {
        Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_file_starts_with_signature_and_version() {
        let records = vec![record(&[("id", Value::Int(1))])];
        let bytes = encode(&records).unwrap();
        assert_eq!(&bytes[0..4], b"JONX");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let records = vec![
            record(&[("id", Value::Int(1)), ("name", Value::Str("a".into()))]),
            record(&[("id", Value::Int(2)), ("name", Value::Str("b".into()))]),
        ];
        assert_eq!(encode(&records).unwrap(), encode(&records).unwrap());
    }

    #[test]
    fn test_empty_record_set_rejected() {
        assert!(matches!(
            encode(&[]).unwrap_err(),
            JonxError::EmptyRecordSet
        ));
    }

    #[test]
    fn test_non_object_record_rejected() {
        let err = encode(&[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, JonxError::NotAnObject { index: 0 }));
    }

    #[test]
    fn test_heterogeneous_records_rejected() {
        let records = vec![
            record(&[("a", Value::Int(1))]),
            record(&[("b", Value::Int(2))]),
        ];
        let err = encode(&records).unwrap_err();
        match err {
            JonxError::RecordSchemaMismatch { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_schema_block_is_parseable() {
        let records = vec![record(&[("id", Value::Int(200))])];
        let bytes = encode(&records).unwrap();

        let schema_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let schema_raw =
            zstd::bulk::decompress(&bytes[12..12 + schema_len], 1 << 20).unwrap();
        let schema: Schema = serde_json::from_slice(&schema_raw).unwrap();
        assert_eq!(schema.fields, vec!["id"]);
        assert_eq!(schema.types["id"], "uint8");
    }
}
