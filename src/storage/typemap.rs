// Source-to-Destination Type Mapping
// Maps source column type names to SQLite storage classes

use serde::Serialize;
use std::fmt;

/// SQLite storage classes a destination column can be declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageClass {
    Text,
    Integer,
    Real,
    Blob,
}

impl StorageClass {
    pub fn as_sql(&self) -> &'static str {
        match self {
            StorageClass::Text => "TEXT",
            StorageClass::Integer => "INTEGER",
            StorageClass::Real => "REAL",
            StorageClass::Blob => "BLOB",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Temporal types are kept as text with no timezone normalization
const TYPE_TABLE: &[(&str, StorageClass)] = &[
    ("CHAR", StorageClass::Text),
    ("VARCHAR", StorageClass::Text),
    ("LONGVARCHAR", StorageClass::Text),
    ("WCHAR", StorageClass::Text),
    ("WVARCHAR", StorageClass::Text),
    ("WLONGVARCHAR", StorageClass::Text),
    ("LCHAR", StorageClass::Text),
    ("LVARCHAR", StorageClass::Text),
    ("INT", StorageClass::Integer),
    ("INTEGER", StorageClass::Integer),
    ("SMALLINT", StorageClass::Integer),
    ("TINYINT", StorageClass::Integer),
    ("BIT", StorageClass::Integer),
    ("BOOLEAN", StorageClass::Integer),
    ("BIGINT", StorageClass::Integer),
    ("DECIMAL", StorageClass::Real),
    ("NUMERIC", StorageClass::Real),
    ("FLOAT", StorageClass::Real),
    ("REAL", StorageClass::Real),
    ("DOUBLE", StorageClass::Real),
    ("BINARY", StorageClass::Blob),
    ("VARBINARY", StorageClass::Blob),
    ("LONGVARBINARY", StorageClass::Blob),
    ("DATE", StorageClass::Text),
    ("TIME", StorageClass::Text),
    ("DATETIME", StorageClass::Text),
    ("TIMESTAMP", StorageClass::Text),
];

/// Storage class for a source type name; unknown names map to TEXT
pub fn map_type(source_type: &str) -> StorageClass {
    let source_type = source_type.trim();
    TYPE_TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(source_type))
        .map(|(_, class)| *class)
        .unwrap_or(StorageClass::Text)
}
