// Source Driver Traits
// Defines the seam between the mirror engine and the driver-based connectivity layer

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::db::quirks::SessionOptions;

/// Supported source engines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Odbc,
    Sqlite,
}

impl SourceKind {
    /// Display name for summaries and logs
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceKind::Odbc => "ODBC",
            SourceKind::Sqlite => "SQLite",
        }
    }

    /// Parse the `engine` connection parameter
    pub fn from_param(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "odbc" => Some(SourceKind::Odbc),
            "sqlite" | "sqlite3" => Some(SourceKind::Sqlite),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Errors raised by source drivers
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Query execution error: {0}")]
    Query(String),

    #[error("Metadata unavailable: {0}")]
    Metadata(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

/// One entry of driver-native column metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub column_name: String,
    pub type_name: String,
    pub column_size: i64,
    /// Driver nullability code (1 = nullable)
    pub nullable: i32,
    pub ordinal_position: i32,
}

/// Type information from a result-set descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    /// Concise SQL type code as reported by an ODBC descriptor
    Code(i16),
    /// Declared type name, for drivers that report names directly
    Name(String),
}

/// Column as described by a (zero-row) result set
#[derive(Debug, Clone, PartialEq)]
pub struct DescribedColumn {
    pub name: String,
    pub declared_type: DeclaredType,
    pub display_size: i64,
    pub nullable: bool,
}

/// Cell value fetched from a source row
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    /// Date, time or timestamp in the driver's textual form
    DateTime(String),
    Binary(Vec<u8>),
}

/// Coarse value family used to decode textual driver output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFamily {
    Text,
    Integer,
    Boolean,
    Exact,
    Approximate,
    Binary,
    Temporal,
}

impl ValueFamily {
    /// Classify an ODBC concise SQL type code
    pub fn from_sql_code(code: i16) -> Self {
        match code {
            4 | 5 | -5 | -6 => ValueFamily::Integer,
            -7 => ValueFamily::Boolean,
            2 | 3 => ValueFamily::Exact,
            6 | 7 | 8 => ValueFamily::Approximate,
            -2 | -3 | -4 => ValueFamily::Binary,
            9 | 10 | 11 | 91 | 92 | 93 => ValueFamily::Temporal,
            _ => ValueFamily::Text,
        }
    }
}

impl SourceValue {
    /// Decode a textual cell as delivered by text-buffered drivers.
    /// Unparseable numbers are kept as text instead of failing the row.
    pub fn from_text(text: Option<String>, family: ValueFamily) -> Self {
        let Some(text) = text else {
            return SourceValue::Null;
        };
        let trimmed = text.trim();
        match family {
            ValueFamily::Text => SourceValue::String(text),
            ValueFamily::Integer => trimmed
                .parse::<i64>()
                .map(SourceValue::Int)
                .unwrap_or(SourceValue::String(text)),
            ValueFamily::Boolean => match trimmed {
                "1" | "true" | "TRUE" => SourceValue::Bool(true),
                "0" | "false" | "FALSE" => SourceValue::Bool(false),
                _ => SourceValue::String(text),
            },
            ValueFamily::Exact => Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map(SourceValue::Decimal)
                .unwrap_or(SourceValue::String(text)),
            ValueFamily::Approximate => trimmed
                .parse::<f64>()
                .map(SourceValue::Float)
                .unwrap_or(SourceValue::String(text)),
            ValueFamily::Binary => decode_hex(trimmed)
                .map(SourceValue::Binary)
                .unwrap_or(SourceValue::String(text)),
            ValueFamily::Temporal => SourceValue::DateTime(text),
        }
    }
}

/// ODBC drivers deliver binary columns bound as text in hex notation
fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Ordered connection parameters assembled from a connection definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectParams {
    pairs: Vec<(String, String)>,
}

impl ConnectParams {
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Case-insensitive parameter lookup
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// `KEY=value;KEY=value` connection string in assembly order
    pub fn connection_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Connection string safe for logs
    pub fn redacted(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("PWD") || k.eq_ignore_ascii_case("password") {
                    format!("{}=***", k)
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Everything a driver needs to open one connection
#[derive(Debug, Clone)]
pub struct ConnectTarget<'a> {
    pub name: &'a str,
    pub params: &'a ConnectParams,
    pub session: SessionOptions,
}

/// Row stream over a source query
pub trait RowCursor {
    /// Fetch up to `max_rows` rows; an empty batch means the source is exhausted
    fn fetch_batch(&mut self, max_rows: usize) -> Result<Vec<Vec<SourceValue>>, SourceError>;
}

/// Live connection handle to a source system
pub trait SourceConnection {
    /// Minimal no-op query used to check a cached handle before reuse
    fn probe(&self) -> Result<(), SourceError>;

    /// Driver-native column metadata for a table
    fn column_metadata(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>, SourceError>;

    /// Result-set descriptor of a query, without fetching rows
    fn describe_query(&self, sql: &str) -> Result<Vec<DescribedColumn>, SourceError>;

    /// Execute a query and stream its rows
    fn query<'a>(&'a self, sql: &str) -> Result<Box<dyn RowCursor + 'a>, SourceError>;

    /// Stream every row of a table
    fn scan_table<'a>(&'a self, table: &str) -> Result<Box<dyn RowCursor + 'a>, SourceError> {
        self.query(&format!("SELECT * FROM {}", table))
    }

    /// Release the handle
    fn close(self: Box<Self>) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Source driver - opens connections for one engine kind
pub trait SourceDriver {
    /// Engine this driver serves
    fn kind(&self) -> SourceKind;

    /// Get the display name for this driver
    fn driver_name(&self) -> &'static str {
        self.kind().display_name()
    }

    /// Open a new connection
    fn connect(&self, target: &ConnectTarget<'_>) -> Result<Box<dyn SourceConnection>, SourceError>;
}
