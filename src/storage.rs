//! Blob storage for normalized tables.
//!
//! Tables are stored column by column: each column becomes one typed vector
//! so numeric data is kept as `f64`, timestamps as datetimes and so on. The
//! encoded document is framed as:
//!
//! ```text
//! MAGIC (4 bytes) | SHA-256 of payload (32 bytes) | bincode payload
//! ```
//!
//! A frame whose digest does not match is reported as corrupt rather than
//! decoded.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::NaiveDateTime;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    data::Value,
    dataset::{Column, Representation, Table},
    error::StorageError,
};

pub const STORAGE_FORMAT_VERSION: u32 = 1;
pub const TABLE_EXTENSION: &str = "tbl";
const MAGIC: &[u8; 4] = b"CPTB";
const DIGEST_LEN: usize = 32;

/// Persistent table storage keyed by name.
pub trait BlobStore: Send + Sync {
    fn save(&self, table: &Table, key: &str) -> Result<(), StorageError>;
    fn load(&self, key: &str) -> Result<Table, StorageError>;
    fn list(&self) -> Result<Vec<String>, StorageError>;
}

pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let reason = if key.trim().is_empty() {
        Some("key must not be empty")
    } else if key.contains(['/', '\\']) {
        Some("key must not contain path separators")
    } else if key.contains("..") {
        Some("key must not contain '..'")
    } else if key.contains('\0') {
        Some("key must not contain NUL")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum StoredColumnData {
    Number(Vec<Option<f64>>),
    DateTime(Vec<Option<NaiveDateTime>>),
    Boolean(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    Mixed(Vec<Option<Value>>),
}

impl StoredColumnData {
    fn len(&self) -> usize {
        match self {
            StoredColumnData::Number(v) => v.len(),
            StoredColumnData::DateTime(v) => v.len(),
            StoredColumnData::Boolean(v) => v.len(),
            StoredColumnData::Text(v) => v.len(),
            StoredColumnData::Mixed(v) => v.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredColumn {
    name: String,
    data: StoredColumnData,
}

impl StoredColumn {
    fn from_column(column: &Column) -> Self {
        let cells = column.values.iter();
        let data = match column.representation() {
            Representation::Numeric => StoredColumnData::Number(
                cells.map(|c| c.as_ref().and_then(Value::as_number)).collect(),
            ),
            Representation::DateTime => StoredColumnData::DateTime(
                cells.map(|c| c.as_ref().and_then(Value::as_datetime)).collect(),
            ),
            Representation::Boolean => StoredColumnData::Boolean(
                cells
                    .map(|c| match c {
                        Some(Value::Boolean(b)) => Some(*b),
                        _ => None,
                    })
                    .collect(),
            ),
            Representation::Text => StoredColumnData::Text(
                cells
                    .map(|c| c.as_ref().and_then(Value::as_text).map(str::to_string))
                    .collect(),
            ),
            Representation::Mixed => StoredColumnData::Mixed(column.values.clone()),
        };
        Self {
            name: column.name.clone(),
            data,
        }
    }

    fn into_column(self) -> Column {
        let values = match self.data {
            StoredColumnData::Number(v) => v.into_iter().map(|c| c.map(Value::Number)).collect(),
            StoredColumnData::DateTime(v) => {
                v.into_iter().map(|c| c.map(Value::DateTime)).collect()
            }
            StoredColumnData::Boolean(v) => v.into_iter().map(|c| c.map(Value::Boolean)).collect(),
            StoredColumnData::Text(v) => v.into_iter().map(|c| c.map(Value::Text)).collect(),
            StoredColumnData::Mixed(v) => v,
        };
        Column::new(self.name, values)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredTable {
    version: u32,
    row_count: u64,
    columns: Vec<StoredColumn>,
}

pub fn encode_table(key: &str, table: &Table) -> Result<Vec<u8>, StorageError> {
    let document = StoredTable {
        version: STORAGE_FORMAT_VERSION,
        row_count: table.row_count() as u64,
        columns: table.columns().iter().map(StoredColumn::from_column).collect(),
    };
    let payload = bincode::serde::encode_to_vec(&document, bincode::config::standard())
        .map_err(|err| StorageError::Encode {
            key: key.to_string(),
            operation: "serialize",
            message: err.to_string(),
        })?;
    let digest = Sha256::digest(&payload);
    let mut framed = Vec::with_capacity(MAGIC.len() + DIGEST_LEN + payload.len());
    framed.extend_from_slice(MAGIC);
    framed.extend_from_slice(&digest);
    framed.extend_from_slice(&payload);
    Ok(framed)
}

pub fn decode_table(key: &str, bytes: &[u8]) -> Result<Table, StorageError> {
    let corrupt = |operation: &'static str, reason: String| StorageError::Corrupt {
        key: key.to_string(),
        operation,
        reason,
    };
    let header_len = MAGIC.len() + DIGEST_LEN;
    if bytes.len() < header_len || &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("header check", "missing table header".to_string()));
    }
    let expected = &bytes[MAGIC.len()..header_len];
    let payload = &bytes[header_len..];
    let actual = Sha256::digest(payload);
    if actual.as_slice() != expected {
        return Err(corrupt(
            "checksum",
            format!(
                "checksum mismatch (expected {}, found {:x})",
                hex(expected),
                actual
            ),
        ));
    }
    let (document, _): (StoredTable, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard()).map_err(
            |err| StorageError::Decode {
                key: key.to_string(),
                operation: "deserialize",
                message: err.to_string(),
            },
        )?;
    if document.version != STORAGE_FORMAT_VERSION {
        return Err(StorageError::Decode {
            key: key.to_string(),
            operation: "version check",
            message: format!(
                "unsupported format version {} (expected {STORAGE_FORMAT_VERSION})",
                document.version
            ),
        });
    }
    if let Some(bad) = document
        .columns
        .iter()
        .find(|column| column.data.len() as u64 != document.row_count)
    {
        return Err(corrupt(
            "row count check",
            format!(
                "column '{}' has {} rows, header says {}",
                bad.name,
                bad.data.len(),
                document.row_count
            ),
        ));
    }
    let columns = document
        .columns
        .into_iter()
        .map(StoredColumn::into_column)
        .collect();
    Table::new(columns).map_err(|err| corrupt("rebuild", err.to_string()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Stores each table as `<root>/data/<key>.tbl`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join("data"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{TABLE_EXTENSION}"))
    }

    fn io_error(key: &str, operation: &'static str, source: std::io::Error) -> StorageError {
        StorageError::Io {
            key: key.to_string(),
            operation,
            source,
        }
    }
}

impl BlobStore for FsBlobStore {
    fn save(&self, table: &Table, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let bytes = encode_table(key, table)?;
        fs::create_dir_all(&self.dir).map_err(|err| Self::io_error(key, "create directory", err))?;
        let path = self.path_for(key);
        let staging = path.with_extension(format!("{TABLE_EXTENSION}.tmp"));
        fs::write(&staging, &bytes).map_err(|err| Self::io_error(key, "write", err))?;
        fs::rename(&staging, &path).map_err(|err| Self::io_error(key, "rename", err))?;
        info!("Stored table '{key}' ({} bytes) at {path:?}", bytes.len());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Table, StorageError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(Self::io_error(key, "read", err)),
        };
        debug!("Loaded {} bytes for '{key}' from {path:?}", bytes.len());
        decode_table(key, &bytes)
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Self::io_error("*", "list", err)),
        };
        let suffix = format!(".{TABLE_EXTENSION}");
        let mut keys = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| name.strip_suffix(&suffix).map(str::to_string))
            .collect::<Vec<_>>();
        keys.sort();
        Ok(keys)
    }
}

/// Keeps encoded tables in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned(key: &str) -> StorageError {
        StorageError::Io {
            key: key.to_string(),
            operation: "lock",
            source: std::io::Error::other("memory store lock poisoned"),
        }
    }
}

impl BlobStore for MemoryBlobStore {
    fn save(&self, table: &Table, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let bytes = encode_table(key, table)?;
        let mut blobs = self.blobs.lock().map_err(|_| Self::poisoned(key))?;
        blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Table, StorageError> {
        validate_key(key)?;
        let blobs = self.blobs.lock().map_err(|_| Self::poisoned(key))?;
        let bytes = blobs.get(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })?;
        decode_table(key, bytes)
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let blobs = self.blobs.lock().map_err(|_| Self::poisoned("*"))?;
        Ok(blobs.keys().cloned().collect())
    }
}
