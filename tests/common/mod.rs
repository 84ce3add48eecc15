//! Shared fixtures for the engine integration tests: SQLite source files and
//! a scripted in-memory driver with fault injection.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use table_mirror::config::{ConnectionSpec, ConnectionsConfig, MirrorSettings};
use table_mirror::db::traits::{
    ColumnMetadata, ConnectTarget, DeclaredType, DescribedColumn, RowCursor, SourceConnection,
    SourceDriver, SourceError, SourceKind, SourceValue,
};
use table_mirror::db::{ConnectionRegistry, DriverRegistry};
use table_mirror::mirror::MirrorEngine;

/// Create a SQLite source database from a SQL script
pub fn create_sqlite_source(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("source.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(script).unwrap();
    path
}

/// Connection definition pointing at a SQLite source file
pub fn sqlite_connection(name: &str, path: &Path) -> ConnectionSpec {
    ConnectionSpec::new(name)
        .with_param("engine", "sqlite")
        .with_param("dsn", path.to_string_lossy().to_string())
}

/// Engine over the built-in drivers
pub fn sqlite_engine(
    specs: Vec<ConnectionSpec>,
    default: Option<&str>,
    store: &Path,
    settings: MirrorSettings,
) -> MirrorEngine {
    let config = ConnectionsConfig::new(specs, default.map(str::to_string));
    MirrorEngine::new(ConnectionRegistry::new(config), store, settings)
}

/// Row count of a destination table
pub fn destination_count(store: &Path, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(store).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| row.get(0))
        .unwrap()
}

pub fn destination_has_table(store: &Path, table: &str) -> bool {
    if !store.exists() {
        return false;
    }
    let conn = rusqlite::Connection::open(store).unwrap();
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )
    .unwrap()
}

/// (name, declared type, notnull) of each destination column
pub fn destination_columns(store: &Path, table: &str) -> Vec<(String, String, bool)> {
    let conn = rusqlite::Connection::open(store).unwrap();
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{}\")", table))
        .unwrap();
    stmt.query_map([], |row| {
        Ok((row.get(1)?, row.get(2)?, row.get::<_, i32>(3)? == 1))
    })
    .unwrap()
    .collect::<Result<Vec<_>, _>>()
    .unwrap()
}

/// In-memory source table served by [`ScriptedDriver`]
#[derive(Clone)]
pub struct ScriptedTable {
    pub columns: Vec<(String, i16, bool)>,
    pub rows: Vec<Vec<SourceValue>>,
}

impl ScriptedTable {
    /// Two-column (ID INTEGER NOT NULL, NAME VARCHAR NULL) table with `n` rows
    pub fn numbered(n: usize) -> Self {
        Self {
            columns: vec![("ID".to_string(), 4, false), ("NAME".to_string(), 12, true)],
            rows: (1..=n)
                .map(|i| {
                    vec![
                        SourceValue::Int(i as i64),
                        SourceValue::String(format!("row {}", i)),
                    ]
                })
                .collect(),
        }
    }
}

/// Behaviour switches shared by the driver and its connections
#[derive(Default)]
pub struct Script {
    pub tables: HashMap<String, ScriptedTable>,
    /// Fail the fetch that would deliver this 0-based row
    pub fail_at_row: Cell<Option<usize>>,
    /// Cap on rows per fetch, below the requested batch size
    pub short_batches: Cell<Option<usize>>,
    pub metadata_available: Cell<bool>,
    pub connects: Cell<usize>,
}

impl Script {
    pub fn with_table(name: &str, table: ScriptedTable) -> Rc<Self> {
        let mut tables = HashMap::new();
        tables.insert(name.to_string(), table);
        let script = Self {
            tables,
            ..Default::default()
        };
        script.metadata_available.set(true);
        Rc::new(script)
    }
}

pub struct ScriptedDriver {
    script: Rc<Script>,
}

impl ScriptedDriver {
    pub fn new(script: Rc<Script>) -> Self {
        Self { script }
    }
}

impl SourceDriver for ScriptedDriver {
    fn kind(&self) -> SourceKind {
        SourceKind::Odbc
    }

    fn connect(&self, _target: &ConnectTarget<'_>) -> Result<Box<dyn SourceConnection>, SourceError> {
        self.script.connects.set(self.script.connects.get() + 1);
        Ok(Box::new(ScriptedConnection {
            script: Rc::clone(&self.script),
        }))
    }
}

struct ScriptedConnection {
    script: Rc<Script>,
}

impl ScriptedConnection {
    fn table(&self, sql: &str) -> Result<&ScriptedTable, SourceError> {
        let name = sql
            .strip_prefix("SELECT * FROM ")
            .map(|rest| rest.trim_end_matches(" WHERE 1=0"))
            .ok_or_else(|| SourceError::Query(format!("unsupported query: {}", sql)))?;
        self.script
            .tables
            .get(name)
            .ok_or_else(|| SourceError::Query(format!("no such table: {}", name)))
    }
}

impl SourceConnection for ScriptedConnection {
    fn probe(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn column_metadata(
        &self,
        _schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>, SourceError> {
        if !self.script.metadata_available.get() {
            return Err(SourceError::Metadata("optional feature not implemented".to_string()));
        }
        Ok(self
            .script
            .tables
            .get(table)
            .map(|t| {
                t.columns
                    .iter()
                    .enumerate()
                    .map(|(i, (name, code, nullable))| ColumnMetadata {
                        column_name: name.clone(),
                        type_name: table_mirror::db::schema::type_name_for_code(*code),
                        column_size: 10,
                        nullable: i32::from(*nullable),
                        ordinal_position: i as i32 + 1,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn describe_query(&self, sql: &str) -> Result<Vec<DescribedColumn>, SourceError> {
        let table = self.table(sql)?;
        Ok(table
            .columns
            .iter()
            .map(|(name, code, nullable)| DescribedColumn {
                name: name.clone(),
                declared_type: DeclaredType::Code(*code),
                display_size: 10,
                nullable: *nullable,
            })
            .collect())
    }

    fn query<'a>(&'a self, sql: &str) -> Result<Box<dyn RowCursor + 'a>, SourceError> {
        let table = self.table(sql)?;
        Ok(Box::new(ScriptedCursor {
            rows: &table.rows,
            position: 0,
            fail_at_row: self.script.fail_at_row.get(),
            short_batches: self.script.short_batches.get(),
        }))
    }
}

struct ScriptedCursor<'a> {
    rows: &'a [Vec<SourceValue>],
    position: usize,
    fail_at_row: Option<usize>,
    short_batches: Option<usize>,
}

impl RowCursor for ScriptedCursor<'_> {
    fn fetch_batch(&mut self, max_rows: usize) -> Result<Vec<Vec<SourceValue>>, SourceError> {
        let width = self.short_batches.map_or(max_rows, |limit| limit.min(max_rows));
        let end = (self.position + width).min(self.rows.len());
        if let Some(fail) = self.fail_at_row {
            if fail >= self.position && fail < end {
                return Err(SourceError::Fetch(format!("simulated failure at row {}", fail)));
            }
        }
        let batch = self.rows[self.position..end].to_vec();
        self.position = end;
        Ok(batch)
    }
}

/// Engine whose only driver is the scripted one, with a single connection "erp"
pub fn scripted_engine(script: Rc<Script>, store: &Path, settings: MirrorSettings) -> MirrorEngine {
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(ScriptedDriver::new(script)));
    let config = ConnectionsConfig::new(
        vec![ConnectionSpec::new("erp").with_param("dsn", "ERP")],
        None,
    );
    MirrorEngine::new(ConnectionRegistry::with_drivers(config, drivers), store, settings)
}
