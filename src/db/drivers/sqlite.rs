// SQLite Source Driver
// Reads source tables from a SQLite database file opened read-only

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection as RusqliteConnection, OpenFlags};
use std::path::Path;
use tracing::debug;

use crate::db::quirks::TextEncoding;
use crate::db::traits::{
    ColumnMetadata, ConnectParams, ConnectTarget, DeclaredType, DescribedColumn, RowCursor,
    SourceConnection, SourceDriver, SourceError, SourceKind, SourceValue,
};
use crate::storage::quote_identifier;

impl From<rusqlite::Error> for SourceError {
    fn from(err: rusqlite::Error) -> Self {
        SourceError::Query(err.to_string())
    }
}

/// SQLite source connection wrapper
pub struct SqliteSourceConnection {
    name: String,
    conn: RusqliteConnection,
    encoding: TextEncoding,
}

impl SourceConnection for SqliteSourceConnection {
    fn probe(&self) -> Result<(), SourceError> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn column_metadata(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>, SourceError> {
        let pragma = match schema {
            Some(schema) => format!(
                "PRAGMA {}.table_info({})",
                quote_identifier(schema),
                quote_identifier(table)
            ),
            None => format!("PRAGMA table_info({})", quote_identifier(table)),
        };

        let mut stmt = self
            .conn
            .prepare(&pragma)
            .map_err(|e| SourceError::Metadata(e.to_string()))?;

        let columns = stmt
            .query_map([], |row| {
                let cid: i32 = row.get(0)?;
                let name: String = row.get(1)?;
                let declared: String = row.get(2)?;
                let notnull: i32 = row.get(3)?;
                Ok((cid, name, declared, notnull))
            })
            .map_err(|e| SourceError::Metadata(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SourceError::Metadata(e.to_string()))?;

        Ok(columns
            .into_iter()
            .map(|(cid, name, declared, notnull)| {
                let (type_name, column_size) = split_declared_type(&declared);
                ColumnMetadata {
                    column_name: name,
                    type_name,
                    column_size,
                    nullable: if notnull == 0 { 1 } else { 0 },
                    ordinal_position: cid + 1,
                }
            })
            .collect())
    }

    fn describe_query(&self, sql: &str) -> Result<Vec<DescribedColumn>, SourceError> {
        let stmt = self.conn.prepare(sql)?;

        // Expression columns have no declared type
        Ok(stmt
            .columns()
            .iter()
            .map(|col| {
                let (type_name, display_size) = split_declared_type(col.decl_type().unwrap_or(""));
                DescribedColumn {
                    name: col.name().to_string(),
                    declared_type: DeclaredType::Name(type_name),
                    display_size,
                    nullable: true,
                }
            })
            .collect())
    }

    /// Pages with LIMIT/OFFSET, which assumes the query yields rows in the
    /// same order on every execution
    fn query<'a>(&'a self, sql: &str) -> Result<Box<dyn RowCursor + 'a>, SourceError> {
        let paged = format!("SELECT * FROM ({}) LIMIT ?2 OFFSET ?1", sql);
        self.open_cursor(paged, Paging::Offset(0))
    }

    fn scan_table<'a>(&'a self, table: &str) -> Result<Box<dyn RowCursor + 'a>, SourceError> {
        // Views and WITHOUT ROWID tables have no rowid to page on
        if self
            .conn
            .prepare(&format!("SELECT _rowid_ FROM {} LIMIT 0", table))
            .is_err()
        {
            debug!("'{}' has no rowid; paging by offset", table);
            return self.query(&format!("SELECT * FROM {}", table));
        }

        let paged = format!(
            "SELECT _rowid_, * FROM {} WHERE _rowid_ > ?1 ORDER BY _rowid_ LIMIT ?2",
            table
        );
        self.open_cursor(paged, Paging::Rowid(i64::MIN))
    }

    fn close(self: Box<Self>) -> Result<(), SourceError> {
        self.conn
            .close()
            .map_err(|(_, e)| SourceError::Connect(format!("Failed to close SQLite database: {}", e)))
    }
}

impl SqliteSourceConnection {
    fn open_cursor<'a>(
        &'a self,
        paged: String,
        paging: Paging,
    ) -> Result<Box<dyn RowCursor + 'a>, SourceError> {
        // Surface bad SQL now rather than on the first fetch
        self.conn.prepare_cached(&paged)?;
        debug!("Opened cursor on '{}': {}", self.name, paged);

        Ok(Box::new(SqliteCursor {
            conn: &self.conn,
            paged,
            paging,
            encoding: self.encoding,
            exhausted: false,
        }))
    }
}

/// Where the next page starts
#[derive(Debug, Clone, Copy)]
enum Paging {
    /// Last rowid returned; the rowid is the first result column
    Rowid(i64),
    /// Rows returned so far
    Offset(usize),
}

/// Re-executes a paged statement per batch
struct SqliteCursor<'a> {
    conn: &'a RusqliteConnection,
    paged: String,
    paging: Paging,
    encoding: TextEncoding,
    exhausted: bool,
}

impl RowCursor for SqliteCursor<'_> {
    fn fetch_batch(&mut self, max_rows: usize) -> Result<Vec<Vec<SourceValue>>, SourceError> {
        if self.exhausted || max_rows == 0 {
            return Ok(Vec::new());
        }

        let (start, first_column) = match self.paging {
            Paging::Rowid(after) => (after, 1),
            Paging::Offset(offset) => (offset as i64, 0),
        };

        let mut stmt = self.conn.prepare_cached(&self.paged)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(params![start, max_rows as i64])?;

        let mut batch = Vec::with_capacity(max_rows);
        let mut last_rowid = None;
        while let Some(row) = rows.next().map_err(|e| SourceError::Fetch(e.to_string()))? {
            if first_column == 1 {
                last_rowid = Some(
                    row.get::<_, i64>(0)
                        .map_err(|e| SourceError::Fetch(e.to_string()))?,
                );
            }
            let mut values = Vec::with_capacity(column_count - first_column);
            for idx in first_column..column_count {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| SourceError::Fetch(e.to_string()))?;
                values.push(source_value(value, self.encoding)?);
            }
            batch.push(values);
        }

        self.paging = match (self.paging, last_rowid) {
            (Paging::Rowid(_), Some(rowid)) => Paging::Rowid(rowid),
            (Paging::Offset(offset), _) => Paging::Offset(offset + batch.len()),
            (paging, None) => paging,
        };
        if batch.len() < max_rows {
            self.exhausted = true;
        }
        Ok(batch)
    }
}

/// Convert a borrowed SQLite value to a source cell
fn source_value(value: ValueRef<'_>, encoding: TextEncoding) -> Result<SourceValue, SourceError> {
    Ok(match value {
        ValueRef::Null => SourceValue::Null,
        ValueRef::Integer(i) => SourceValue::Int(i),
        ValueRef::Real(f) => SourceValue::Float(f),
        ValueRef::Text(bytes) => match encoding {
            TextEncoding::Utf8 => SourceValue::String(
                std::str::from_utf8(bytes)
                    .map_err(|e| SourceError::Fetch(format!("Invalid UTF-8 in text value: {}", e)))?
                    .to_string(),
            ),
            TextEncoding::DriverDefault => {
                SourceValue::String(String::from_utf8_lossy(bytes).into_owned())
            }
        },
        ValueRef::Blob(bytes) => SourceValue::Binary(bytes.to_vec()),
    })
}

/// Split a declared type such as `VARCHAR(50)` or `DECIMAL(10,2)` into
/// its base name and leading size
pub fn split_declared_type(declared: &str) -> (String, i64) {
    let declared = declared.trim();
    match declared.split_once('(') {
        Some((base, rest)) => {
            let size = rest
                .trim_end_matches(')')
                .split(',')
                .next()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0);
            (base.trim().to_uppercase(), size)
        }
        None => (declared.to_uppercase(), 0),
    }
}

/// SQLite source driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver
    pub fn new() -> Self {
        Self
    }

    /// Extract the database path from the addressing parameter
    fn get_database_path(params: &ConnectParams) -> Result<String, SourceError> {
        let database = params.get("DSN").unwrap_or("").trim();
        if database.is_empty() {
            return Err(SourceError::InvalidConfig(
                "SQLite source requires a dsn holding the database path".to_string(),
            ));
        }

        // Expand ~ to home directory if present
        let path = match database.strip_prefix("~/") {
            Some(rest) => match std::env::var_os("HOME") {
                Some(home) => Path::new(&home).join(rest).to_string_lossy().to_string(),
                None => database.to_string(),
            },
            None => database.to_string(),
        };

        Ok(path)
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceDriver for SqliteDriver {
    fn kind(&self) -> SourceKind {
        SourceKind::Sqlite
    }

    fn connect(&self, target: &ConnectTarget<'_>) -> Result<Box<dyn SourceConnection>, SourceError> {
        let path = Self::get_database_path(target.params)?;
        let conn = RusqliteConnection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| SourceError::Connect(format!("Failed to open SQLite database: {}", e)))?;

        debug!("Opened SQLite source '{}' at {}", target.name, path);

        Ok(Box::new(SqliteSourceConnection {
            name: target.name.to_string(),
            conn,
            encoding: target.session.text_encoding,
        }))
    }
}
