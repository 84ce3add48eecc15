// Destination Store
// Owns the local SQLite connection the mirror engine writes into

use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::db::schema::ColumnDef;
use crate::storage::normalize::DestinationValue;
use crate::storage::typemap::map_type;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Destination directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("Row has {actual} values but the table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Double-quote an identifier for SQLite
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column definition for a CREATE TABLE statement
pub fn column_ddl(column: &ColumnDef) -> String {
    format!(
        "{} {} {}",
        quote_identifier(&column.name),
        map_type(&column.type_name),
        if column.nullable { "NULL" } else { "NOT NULL" }
    )
}

/// Local SQLite store mirrored tables are written into
pub struct DestinationStore {
    connection: Connection,
    db_path: PathBuf,
}

impl DestinationStore {
    /// Open the store, creating the file if absent. The parent directory must exist.
    pub fn open(db_path: &Path) -> StorageResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(StorageError::MissingDirectory(parent.to_path_buf()));
            }
        }

        let connection = Connection::open(db_path)?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        debug!("Opened destination store at {}", db_path.display());

        Ok(Self {
            connection,
            db_path: db_path.to_path_buf(),
        })
    }

    /// SQLite identifiers are case-insensitive, so the lookup is too
    pub fn table_exists(&self, table: &str) -> StorageResult<bool> {
        let exists: bool = self.connection.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [table],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn create_table(&self, table: &str, columns: &[ColumnDef]) -> StorageResult<()> {
        let definitions = columns.iter().map(column_ddl).collect::<Vec<_>>().join(", ");
        let sql = format!("CREATE TABLE {} ({})", quote_identifier(table), definitions);
        debug!("{}", sql);
        self.connection.execute(&sql, [])?;
        Ok(())
    }

    /// Delete every row, keeping the table definition
    pub fn clear_table(&self, table: &str) -> StorageResult<usize> {
        let deleted = self
            .connection
            .execute(&format!("DELETE FROM {}", quote_identifier(table)), [])?;
        debug!("Cleared {} rows from {}", deleted, table);
        Ok(deleted)
    }

    pub fn begin(&self) -> StorageResult<()> {
        self.connection.execute_batch("BEGIN")?;
        Ok(())
    }

    pub fn commit(&self) -> StorageResult<()> {
        self.connection.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> StorageResult<()> {
        self.connection.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// True when no explicit transaction is open
    pub fn is_autocommit(&self) -> bool {
        self.connection.is_autocommit()
    }

    /// Insert rows with an explicit column list in the given order
    pub fn insert_batch(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<DestinationValue>],
    ) -> StorageResult<usize> {
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            column_list,
            placeholders
        );

        let mut stmt = self.connection.prepare_cached(&sql)?;
        for row in rows {
            if row.len() != columns.len() {
                return Err(StorageError::RowWidth {
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(rows.len())
    }

    pub fn row_count(&self, table: &str) -> StorageResult<i64> {
        let count = self.connection.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Close the connection, surfacing close errors
    pub fn close(self) -> StorageResult<()> {
        self.connection.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        debug!("Closed destination store at {}", self.db_path.display());
        Ok(())
    }
}
