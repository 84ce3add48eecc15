// Source Schema Inspection
// Reads ordered column definitions for a source table, falling back to a probe query

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::traits::{ColumnMetadata, DeclaredType, DescribedColumn, SourceConnection};
use crate::error::MirrorError;

/// Represents a column of a source table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub type_name: String,
    /// Driver-reported size, may be approximate
    pub size: i64,
    pub nullable: bool,
    /// 1-based
    pub position: i32,
}

/// Ordered column definitions of one source table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Split `schema.table` on the first dot
pub fn split_table_identifier(identifier: &str) -> (Option<&str>, &str) {
    match identifier.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, identifier),
    }
}

/// Type name for an ODBC concise SQL type code
pub fn type_name_for_code(code: i16) -> String {
    let name = match code {
        1 => "CHAR",
        12 => "VARCHAR",
        -1 => "LONGVARCHAR",
        -8 => "WCHAR",
        -9 => "WVARCHAR",
        -10 => "WLONGVARCHAR",
        3 => "DECIMAL",
        2 => "NUMERIC",
        5 => "SMALLINT",
        4 => "INTEGER",
        7 => "REAL",
        6 => "FLOAT",
        8 => "DOUBLE",
        -7 => "BIT",
        -6 => "TINYINT",
        -5 => "BIGINT",
        -2 => "BINARY",
        -3 => "VARBINARY",
        -4 => "LONGVARBINARY",
        91 => "DATE",
        92 => "TIME",
        93 => "TIMESTAMP",
        other => return format!("UNKNOWN({})", other),
    };
    name.to_string()
}

/// Outcome of one schema lookup stage
enum Lookup {
    Found(Vec<ColumnDef>),
    Unavailable(String),
}

/// Two-stage schema reader: driver metadata first, then a zero-row probe query
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaInspector;

impl SchemaInspector {
    pub fn new() -> Self {
        Self
    }

    pub fn describe(
        &self,
        conn: &dyn SourceConnection,
        identifier: &str,
    ) -> Result<TableSchema, MirrorError> {
        let (schema, table) = split_table_identifier(identifier);

        let reason = match Self::from_metadata(conn, schema, table) {
            Lookup::Found(columns) => {
                debug!("Read {} columns for '{}' from driver metadata", columns.len(), identifier);
                return Ok(TableSchema {
                    table: identifier.to_string(),
                    columns,
                });
            }
            Lookup::Unavailable(reason) => reason,
        };

        warn!(
            "Column metadata unavailable for '{}' ({}), falling back to probe query",
            identifier, reason
        );

        match Self::from_probe(conn, table) {
            Lookup::Found(columns) => Ok(TableSchema {
                table: identifier.to_string(),
                columns,
            }),
            Lookup::Unavailable(message) => Err(MirrorError::SchemaUnavailable {
                table: identifier.to_string(),
                message,
            }),
        }
    }

    fn from_metadata(conn: &dyn SourceConnection, schema: Option<&str>, table: &str) -> Lookup {
        match conn.column_metadata(schema, table) {
            Ok(entries) if entries.is_empty() => {
                Lookup::Unavailable("driver metadata returned no columns".to_string())
            }
            Ok(entries) => Lookup::Found(entries.into_iter().map(column_from_metadata).collect()),
            Err(e) => Lookup::Unavailable(e.to_string()),
        }
    }

    fn from_probe(conn: &dyn SourceConnection, table: &str) -> Lookup {
        let sql = format!("SELECT * FROM {} WHERE 1=0", table);
        debug!("Schema probe: {}", sql);

        match conn.describe_query(&sql) {
            Ok(described) if described.is_empty() => {
                Lookup::Unavailable("probe query returned no columns".to_string())
            }
            Ok(described) => Lookup::Found(
                described
                    .into_iter()
                    .enumerate()
                    .map(|(i, col)| column_from_descriptor(i, col))
                    .collect(),
            ),
            Err(e) => Lookup::Unavailable(e.to_string()),
        }
    }
}

fn column_from_metadata(entry: ColumnMetadata) -> ColumnDef {
    ColumnDef {
        name: entry.column_name,
        type_name: entry.type_name,
        size: entry.column_size,
        nullable: entry.nullable == 1,
        position: entry.ordinal_position,
    }
}

fn column_from_descriptor(index: usize, col: DescribedColumn) -> ColumnDef {
    let type_name = match col.declared_type {
        DeclaredType::Code(code) => type_name_for_code(code),
        DeclaredType::Name(name) => name,
    };
    ColumnDef {
        name: col.name,
        type_name,
        size: col.display_size,
        nullable: col.nullable,
        position: index as i32 + 1,
    }
}
