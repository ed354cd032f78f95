//! JONX file reader
//!
//! Parses the header and schema eagerly, records the byte range of every
//! compressed column and index block, and decompresses blocks lazily on
//! first access. Decompressed columns and decoded indexes are cached for
//! the lifetime of the reader.
//!
//! A decode failure in one column leaves the reader usable for every other
//! field; nothing is cached for the failing column.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Cursor;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use memmap2::Mmap;
use parking_lot::RwLock;
use serde::Serialize;

use crate::codec;
use crate::compress::{Decompressor, JsonCodec, SerdeJsonCodec, ZstdCompression};
use crate::encoder::Schema;
use crate::index::is_permutation;
use crate::types::ColumnType;
use crate::value::Value;
use crate::{JonxError, Result, FORMAT_VERSION, SIGNATURE};

/// Exact sum of a numeric column. Integer columns accumulate in i128 so the
/// sum cannot overflow; float columns accumulate in f64.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnSum {
    Int(i128),
    Float(f64),
}

impl ColumnSum {
    pub fn as_f64(&self) -> f64 {
        match self {
            ColumnSum::Int(v) => *v as f64,
            ColumnSum::Float(v) => *v,
        }
    }
}

/// File metadata snapshot returned by [`JonxReader::info`].
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: Option<PathBuf>,
    pub version: u32,
    pub num_rows: usize,
    pub num_columns: usize,
    pub fields: Vec<String>,
    pub types: BTreeMap<String, String>,
    pub indexes: Vec<String>,
    pub file_size: usize,
}

/// Result of [`JonxReader::check_schema`] and [`JonxReader::validate`].
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// The file bytes: either fully buffered or a live file mapping owned by
/// the reader and released on drop.
enum FileBuffer {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl FileBuffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            FileBuffer::Owned(data) => data,
            FileBuffer::Mapped(map) => &map[..],
        }
    }
}

/// Random-access reader over one JONX file.
pub struct JonxReader {
    path: Option<PathBuf>,
    buf: FileBuffer,
    version: u32,
    fields: Vec<String>,
    types: BTreeMap<String, String>,
    /// Compressed column block ranges, in schema order.
    column_blocks: Vec<(String, Range<usize>)>,
    /// Compressed index block ranges, in file order.
    index_blocks: Vec<(String, Range<usize>)>,
    columns: RwLock<HashMap<String, Arc<Vec<Value>>>>,
    indexes: RwLock<HashMap<String, Arc<Vec<u32>>>>,
    num_rows: OnceLock<usize>,
    decompressor: Arc<dyn Decompressor>,
    json: Arc<dyn JsonCodec>,
}

impl std::fmt::Debug for JonxReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JonxReader")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("fields", &self.fields)
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

impl JonxReader {
    /// Construct from an in-memory byte buffer with default collaborators.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, Arc::new(ZstdCompression), Arc::new(SerdeJsonCodec))
    }

    /// Construct from an in-memory byte buffer with caller-supplied
    /// collaborators.
    pub fn from_bytes_with(
        data: Vec<u8>,
        decompressor: Arc<dyn Decompressor>,
        json: Arc<dyn JsonCodec>,
    ) -> Result<Self> {
        Self::build(None, FileBuffer::Owned(data), decompressor, json)
    }

    /// Memory-map a file and construct a reader over it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Arc::new(ZstdCompression), Arc::new(SerdeJsonCodec))
    }

    /// Memory-map a file with caller-supplied collaborators.
    pub fn open_with(
        path: impl AsRef<Path>,
        decompressor: Arc<dyn Decompressor>,
        json: Arc<dyn JsonCodec>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(JonxError::Truncated("file header".to_string()));
        }
        // Files are immutable once written; the mapping stays valid for the
        // reader's lifetime.
        let map = unsafe { Mmap::map(&file)? };
        Self::build(
            Some(path.to_path_buf()),
            FileBuffer::Mapped(map),
            decompressor,
            json,
        )
    }

    fn build(
        path: Option<PathBuf>,
        buf: FileBuffer,
        decompressor: Arc<dyn Decompressor>,
        json: Arc<dyn JsonCodec>,
    ) -> Result<Self> {
        let data = buf.as_slice();
        if data.len() < 8 {
            return Err(JonxError::Truncated("file header".to_string()));
        }
        if &data[0..4] != SIGNATURE {
            return Err(JonxError::InvalidSignature);
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != FORMAT_VERSION {
            return Err(JonxError::UnsupportedVersion(version));
        }

        let mut cursor = Cursor::new(data);
        cursor.set_position(8);

        let schema_range = read_block(&mut cursor, "schema block")?;
        let schema_raw = decompressor.decompress(&data[schema_range])?;
        let schema: Schema = serde_json::from_value(json.decode(&schema_raw)?)
            .map_err(|e| JonxError::SchemaInvalid(format!("malformed schema block: {}", e)))?;
        if schema.fields.is_empty() {
            return Err(JonxError::SchemaInvalid("schema lists no fields".to_string()));
        }
        for field in &schema.fields {
            if !schema.types.contains_key(field) {
                return Err(JonxError::SchemaInvalid(format!(
                    "field '{}' has no declared type",
                    field
                )));
            }
        }

        let mut column_blocks = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let range = read_block(&mut cursor, field)?;
            column_blocks.push((field.clone(), range));
        }

        let count = read_u32(&mut cursor, "index count")?;
        let mut index_blocks = Vec::with_capacity(count as usize);
        for i in 0..count {
            let name_range = read_block(&mut cursor, "index name")?;
            let name = std::str::from_utf8(&data[name_range])
                .map_err(|_| JonxError::MalformedIndex {
                    field: format!("#{}", i),
                    detail: "index name is not valid UTF-8".to_string(),
                })?
                .to_string();
            let range = read_block(&mut cursor, &name)?;
            index_blocks.push((name, range));
        }

        let extra = data.len() as u64 - cursor.position();
        if extra > 0 {
            return Err(JonxError::TrailingData {
                extra: extra as usize,
            });
        }

        debug!(
            "opened JONX file: {} columns, {} indexes, {} bytes",
            column_blocks.len(),
            index_blocks.len(),
            data.len()
        );

        Ok(Self {
            path,
            buf,
            version,
            fields: schema.fields,
            types: schema.types,
            column_blocks,
            index_blocks,
            columns: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            num_rows: OnceLock::new(),
            decompressor,
            json,
        })
    }

    // ========== Column access ==========

    /// Fields in schema order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The parsed physical type of a field.
    pub fn column_type(&self, field: &str) -> Result<ColumnType> {
        let name = self
            .types
            .get(field)
            .ok_or_else(|| JonxError::FieldNotFound(field.to_string()))?;
        ColumnType::parse(name)
    }

    /// Decompress and decode one column, caching the result.
    pub fn get_column(&self, field: &str) -> Result<Arc<Vec<Value>>> {
        if let Some(column) = self.columns.read().get(field) {
            return Ok(Arc::clone(column));
        }

        let (_, range) = self
            .column_blocks
            .iter()
            .find(|(name, _)| name == field)
            .ok_or_else(|| JonxError::FieldNotFound(field.to_string()))?;
        let ty = self.column_type(field)?;

        let payload = self
            .decompressor
            .decompress(&self.buf.as_slice()[range.clone()])
            .map_err(|e| JonxError::MalformedBlock {
                field: field.to_string(),
                detail: e.to_string(),
            })?;
        let expected = self.num_rows.get().copied();
        let values = codec::decode_column(field, &ty, &payload, expected, self.json.as_ref())?;
        let _ = self.num_rows.set(values.len());

        let column = Arc::new(values);
        self.columns
            .write()
            .insert(field.to_string(), Arc::clone(&column));
        Ok(column)
    }

    /// Fetch several columns at once.
    pub fn get_columns(&self, fields: &[&str]) -> Result<HashMap<String, Arc<Vec<Value>>>> {
        let mut out = HashMap::with_capacity(fields.len());
        for field in fields {
            out.insert((*field).to_string(), self.get_column(field)?);
        }
        Ok(out)
    }

    /// Reconstruct the full record set in schema order.
    pub fn records(&self) -> Result<Vec<Value>> {
        let mut columns = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            columns.push(self.get_column(field)?);
        }
        let n = self.num_rows()?;

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let record: BTreeMap<String, Value> = self
                .fields
                .iter()
                .zip(columns.iter())
                .map(|(field, column)| (field.clone(), column[i].clone()))
                .collect();
            out.push(Value::Object(record));
        }
        Ok(out)
    }

    // ========== Queries ==========

    /// Minimum of a column. With `use_index` and an index present this costs
    /// one index decompression, then O(1); otherwise a linear scan. Nulls in
    /// `nullable<T>` columns are skipped.
    pub fn find_min(&self, field: &str, use_index: bool) -> Result<Value> {
        self.find_extremum(field, use_index, false)
    }

    /// Maximum of a column; see [`JonxReader::find_min`].
    pub fn find_max(&self, field: &str, use_index: bool) -> Result<Value> {
        self.find_extremum(field, use_index, true)
    }

    fn find_extremum(&self, field: &str, use_index: bool, want_max: bool) -> Result<Value> {
        let column = self.get_column(field)?;

        if use_index {
            if let Some(ordinals) = self.load_index(field)? {
                if ordinals.len() != column.len() {
                    return Err(JonxError::MalformedIndex {
                        field: field.to_string(),
                        detail: format!(
                            "index has {} ordinals for {} rows",
                            ordinals.len(),
                            column.len()
                        ),
                    });
                }
                let slot = if want_max {
                    ordinals.last()
                } else {
                    ordinals.first()
                };
                let ordinal = *slot.ok_or_else(|| JonxError::EmptyColumn(field.to_string()))?;
                let value = column.get(ordinal as usize).ok_or_else(|| {
                    JonxError::MalformedIndex {
                        field: field.to_string(),
                        detail: format!("ordinal {} out of range", ordinal),
                    }
                })?;
                return Ok(value.clone());
            }
        }

        let mut best: Option<&Value> = None;
        for value in column.iter().filter(|v| !v.is_null()) {
            best = match best {
                None => Some(value),
                Some(current) => {
                    let ord = value.total_cmp(current);
                    let better = if want_max {
                        ord == std::cmp::Ordering::Greater
                    } else {
                        ord == std::cmp::Ordering::Less
                    };
                    if better {
                        Some(value)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best.cloned()
            .ok_or_else(|| JonxError::EmptyColumn(field.to_string()))
    }

    /// Exact sum of a numeric column.
    pub fn sum(&self, field: &str) -> Result<ColumnSum> {
        let ty = self.column_type(field)?;
        if !ty.is_numeric() {
            return Err(JonxError::NotNumeric {
                field: field.to_string(),
                type_name: ty.name(),
            });
        }
        let column = self.get_column(field)?;
        if column.is_empty() {
            return Err(JonxError::EmptyColumn(field.to_string()));
        }

        if ty.is_integer() {
            let mut acc: i128 = 0;
            for value in column.iter() {
                acc += value.as_i128().ok_or_else(|| JonxError::MalformedBlock {
                    field: field.to_string(),
                    detail: "non-integer value in integer column".to_string(),
                })?;
            }
            Ok(ColumnSum::Int(acc))
        } else {
            let mut acc = 0.0f64;
            for value in column.iter() {
                acc += value.as_f64().ok_or_else(|| JonxError::MalformedBlock {
                    field: field.to_string(),
                    detail: "non-numeric value in float column".to_string(),
                })?;
            }
            Ok(ColumnSum::Float(acc))
        }
    }

    /// Mean of a numeric column.
    pub fn avg(&self, field: &str) -> Result<f64> {
        let total = self.sum(field)?;
        let n = self.get_column(field)?.len();
        Ok(total.as_f64() / n as f64)
    }

    /// Row count, or the length of one column (equal by invariant).
    pub fn count(&self, field: Option<&str>) -> Result<usize> {
        match field {
            Some(field) => Ok(self.get_column(field)?.len()),
            None => self.num_rows(),
        }
    }

    /// Whether a sorted-ordinal index exists for this field.
    pub fn has_index(&self, field: &str) -> Result<bool> {
        if !self.fields.iter().any(|f| f == field) {
            return Err(JonxError::FieldNotFound(field.to_string()));
        }
        Ok(self.index_blocks.iter().any(|(name, _)| name == field))
    }

    /// Whether the field's physical type is numeric.
    pub fn is_numeric(&self, field: &str) -> Result<bool> {
        Ok(self.column_type(field)?.is_numeric())
    }

    /// File metadata. Materialises one column if the row count is not yet
    /// known.
    pub fn info(&self) -> Result<FileInfo> {
        Ok(FileInfo {
            path: self.path.clone(),
            version: self.version,
            num_rows: self.num_rows()?,
            num_columns: self.fields.len(),
            fields: self.fields.clone(),
            types: self.types.clone(),
            indexes: self
                .index_blocks
                .iter()
                .map(|(name, _)| name.clone())
                .collect(),
            file_size: self.buf.as_slice().len(),
        })
    }

    // ========== Validation ==========

    /// Internal schema consistency check. Never touches column data.
    pub fn check_schema(&self) -> SchemaReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field) {
                errors.push(format!("duplicate field '{}'", field));
            }
            match self.types.get(field) {
                None => errors.push(format!("field '{}' has no declared type", field)),
                Some(name) => {
                    if let Err(e) = ColumnType::parse(name) {
                        errors.push(format!("field '{}': {}", field, e));
                    }
                }
            }
        }

        for name in self.types.keys() {
            if !self.fields.iter().any(|f| f == name) {
                warnings.push(format!("type entry '{}' matches no field", name));
            }
        }

        for (name, _) in &self.index_blocks {
            match self.column_type(name) {
                Err(_) => warnings.push(format!("index '{}' matches no field", name)),
                Ok(ty) if !ty.is_indexable() => {
                    warnings.push(format!("index '{}' covers non-indexable type {}", name, ty))
                }
                Ok(_) => {}
            }
        }
        for field in &self.fields {
            if let Ok(ty) = self.column_type(field) {
                if ty.is_indexable() && !self.index_blocks.iter().any(|(n, _)| n == field) {
                    warnings.push(format!("indexable field '{}' has no index", field));
                }
            }
        }

        SchemaReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Full structural validation: schema check, then every column and index
    /// block is decompressed and verified. Aggregates failures instead of
    /// stopping at the first.
    pub fn validate(&self) -> SchemaReport {
        let mut report = self.check_schema();

        let mut n = self.num_rows.get().copied();
        for field in &self.fields {
            match self.get_column(field) {
                Ok(column) => match n {
                    None => n = Some(column.len()),
                    Some(expected) if column.len() != expected => {
                        report.errors.push(format!(
                            "column '{}' has {} rows, expected {}",
                            field,
                            column.len(),
                            expected
                        ));
                    }
                    Some(_) => {}
                },
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        for (name, _) in &self.index_blocks {
            match self.load_index(name) {
                Ok(Some(ordinals)) => {
                    if let Some(expected) = n {
                        if !is_permutation(&ordinals, expected) {
                            report.errors.push(format!(
                                "index '{}' is not a permutation of [0, {})",
                                name, expected
                            ));
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        report.valid = report.errors.is_empty();
        report
    }

    // ========== Internals ==========

    fn num_rows(&self) -> Result<usize> {
        if let Some(&n) = self.num_rows.get() {
            return Ok(n);
        }
        // Row count is not part of the wire format; the first materialised
        // column establishes it.
        let first = self.fields[0].clone();
        Ok(self.get_column(&first)?.len())
    }

    fn load_index(&self, field: &str) -> Result<Option<Arc<Vec<u32>>>> {
        if let Some(ordinals) = self.indexes.read().get(field) {
            return Ok(Some(Arc::clone(ordinals)));
        }
        let range = match self.index_blocks.iter().find(|(name, _)| name == field) {
            Some((_, range)) => range.clone(),
            None => return Ok(None),
        };

        let payload = self
            .decompressor
            .decompress(&self.buf.as_slice()[range])
            .map_err(|e| JonxError::MalformedIndex {
                field: field.to_string(),
                detail: e.to_string(),
            })?;
        let ordinals: Vec<u32> = serde_json::from_value(self.json.decode(&payload)?)
            .map_err(|e| JonxError::MalformedIndex {
                field: field.to_string(),
                detail: format!("index payload is not a u32 array: {}", e),
            })?;

        let ordinals = Arc::new(ordinals);
        self.indexes
            .write()
            .insert(field.to_string(), Arc::clone(&ordinals));
        Ok(Some(ordinals))
    }
}

fn read_u32(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u32> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| JonxError::Truncated(what.to_string()))
}

/// Read a u32 length prefix and return the byte range of the block that
/// follows, advancing the cursor past it.
fn read_block(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<Range<usize>> {
    let len = read_u32(cursor, what)? as usize;
    let start = cursor.position() as usize;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= cursor.get_ref().len())
        .ok_or_else(|| JonxError::Truncated(what.to_string()))?;
    cursor.set_position(end as u64);
    Ok(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;

    fn record(pairs: &[(&str, Value)]) -> Value {
        Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn sample_reader() -> JonxReader {
        let records = vec![
            record(&[
                ("id", Value::Int(3)),
                ("name", Value::Str("c".into())),
                ("score", Value::Float(1.5)),
            ]),
            record(&[
                ("id", Value::Int(1)),
                ("name", Value::Str("a".into())),
                ("score", Value::Float(0.5)),
            ]),
            record(&[
                ("id", Value::Int(2)),
                ("name", Value::Str("b".into())),
                ("score", Value::Float(-2.0)),
            ]),
        ];
        JonxReader::from_bytes(encode(&records).unwrap()).unwrap()
    }

    #[test]
    fn test_get_column_and_cache() {
        let reader = sample_reader();
        let ids = reader.get_column("id").unwrap();
        assert_eq!(
            *ids,
            vec![Value::Int(3), Value::Int(1), Value::Int(2)]
        );
        // Second fetch returns the same cached allocation.
        let again = reader.get_column("id").unwrap();
        assert!(Arc::ptr_eq(&ids, &again));

        assert!(matches!(
            reader.get_column("missing").unwrap_err(),
            JonxError::FieldNotFound(_)
        ));
    }

    #[test]
    fn test_extremum_with_and_without_index() {
        let reader = sample_reader();
        assert_eq!(reader.find_min("id", true).unwrap(), Value::Int(1));
        assert_eq!(reader.find_min("id", false).unwrap(), Value::Int(1));
        assert_eq!(reader.find_max("score", true).unwrap(), Value::Float(1.5));
        assert_eq!(reader.find_max("score", false).unwrap(), Value::Float(1.5));
        // Strings have no index; the scan path serves them.
        assert_eq!(
            reader.find_min("name", true).unwrap(),
            Value::Str("a".into())
        );
    }

    #[test]
    fn test_aggregates() {
        let reader = sample_reader();
        assert_eq!(reader.sum("id").unwrap(), ColumnSum::Int(6));
        assert_eq!(reader.avg("id").unwrap(), 2.0);
        assert_eq!(reader.sum("score").unwrap(), ColumnSum::Float(0.0));
        assert!(matches!(
            reader.sum("name").unwrap_err(),
            JonxError::NotNumeric { .. }
        ));
    }

    #[test]
    fn test_count_and_info() {
        let reader = sample_reader();
        assert_eq!(reader.count(None).unwrap(), 3);
        assert_eq!(reader.count(Some("name")).unwrap(), 3);

        let info = reader.info().unwrap();
        assert_eq!(info.version, FORMAT_VERSION);
        assert_eq!(info.num_rows, 3);
        assert_eq!(info.num_columns, 3);
        assert_eq!(info.fields, vec!["id", "name", "score"]);
        assert_eq!(info.types["id"], "uint8");
        assert_eq!(info.indexes, vec!["id", "score"]);
    }

    #[test]
    fn test_predicates() {
        let reader = sample_reader();
        assert!(reader.has_index("id").unwrap());
        assert!(!reader.has_index("name").unwrap());
        assert!(reader.is_numeric("score").unwrap());
        assert!(!reader.is_numeric("name").unwrap());
        assert!(reader.has_index("missing").is_err());
    }

    #[test]
    fn test_reports() {
        let reader = sample_reader();
        let schema = reader.check_schema();
        assert!(schema.valid, "errors: {:?}", schema.errors);
        let report = reader.validate();
        assert!(report.valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_bad_signature_and_version() {
        let records = vec![record(&[("id", Value::Int(1))])];
        let mut bytes = encode(&records).unwrap();

        let mut corrupt = bytes.clone();
        corrupt[0] = b'X';
        assert!(matches!(
            JonxReader::from_bytes(corrupt).unwrap_err(),
            JonxError::InvalidSignature
        ));

        bytes[4] = 99;
        assert!(matches!(
            JonxReader::from_bytes(bytes).unwrap_err(),
            JonxError::UnsupportedVersion(99)
        ));
    }

    #[test]
    fn test_truncated_file() {
        let records = vec![record(&[("id", Value::Int(1))])];
        let bytes = encode(&records).unwrap();
        let truncated = bytes[..bytes.len() - 3].to_vec();
        assert!(matches!(
            JonxReader::from_bytes(truncated).unwrap_err(),
            JonxError::Truncated(_)
        ));
    }

    #[test]
    fn test_corrupt_column_does_not_poison_others() {
        let records = vec![record(&[
            ("a", Value::Str("only".into())),
            ("b", Value::Int(1)),
        ])];
        let bytes = encode(&records).unwrap();

        // Locate column block 'a' (first after the schema block) and flip a
        // byte inside its compressed payload.
        let schema_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let col_start = 12 + schema_len + 4;
        let mut corrupt = bytes.clone();
        corrupt[col_start] ^= 0xFF;

        let reader = JonxReader::from_bytes(corrupt).unwrap();
        assert!(reader.get_column("a").is_err());
        assert_eq!(*reader.get_column("b").unwrap(), vec![Value::Int(1)]);

        let report = reader.validate();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }
}
