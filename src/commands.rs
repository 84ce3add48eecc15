// Command Handlers
// Front-end operations over a shared engine; errors are flattened to strings for display

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

use crate::db::registry::ConnectionListing;
use crate::db::schema::ColumnDef;
use crate::error::MirrorError;
use crate::mirror::{MirrorEngine, MirrorRequest, MirrorResult};
use crate::storage::{map_type, StorageClass};

/// Application state shared by the command handlers
pub struct AppState {
    pub engine: Mutex<MirrorEngine>,
}

impl AppState {
    pub fn new(engine: MirrorEngine) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    fn engine(&self) -> Result<MutexGuard<'_, MirrorEngine>, String> {
        self.engine.lock().map_err(|e| format!("Engine lock poisoned: {}", e))
    }
}

/// Convert MirrorError to a string for display
impl From<MirrorError> for String {
    fn from(err: MirrorError) -> Self {
        err.to_string()
    }
}

/// A source column with the storage class it would get in the destination
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescription {
    #[serde(flatten)]
    pub column: ColumnDef,
    pub storage_class: StorageClass,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<ColumnDescription>,
}

/// Mirror a table; failures are part of the returned result
pub fn mirror_table(state: &AppState, request: MirrorRequest) -> Result<MirrorResult, String> {
    if request.source_table.trim().is_empty() {
        return Err("Source table is required".to_string());
    }
    let mut engine = state.engine()?;
    Ok(engine.mirror(&request))
}

/// List configured connections
pub fn list_connections(state: &AppState) -> Result<ConnectionListing, String> {
    let engine = state.engine()?;
    Ok(engine.list_connections())
}

/// Describe a source table and its destination mapping
pub fn describe_table(
    state: &AppState,
    table: &str,
    connection_name: Option<&str>,
) -> Result<TableDescription, String> {
    let mut engine = state.engine()?;
    let schema = engine.describe_table(table, connection_name)?;

    Ok(TableDescription {
        table: schema.table,
        columns: schema
            .columns
            .into_iter()
            .map(|column| ColumnDescription {
                storage_class: map_type(&column.type_name),
                column,
            })
            .collect(),
    })
}
