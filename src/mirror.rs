// Table Mirroring Engine
// Copies one source table into the destination store in checkpointed batches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::MirrorSettings;
use crate::db::registry::{ConnectionListing, ConnectionRegistry};
use crate::db::schema::{SchemaInspector, TableSchema};
use crate::db::traits::SourceConnection;
use crate::error::MirrorError;
use crate::storage::{DestinationStore, DestinationValue, StorageError, ValueNormalizer};

/// Rows requested from the source per fetch
pub const FETCH_BATCH_SIZE: usize = 100;

/// Rows between intermediate commits
pub const CHECKPOINT_INTERVAL: usize = 1000;

/// A request to mirror one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRequest {
    /// May be schema-qualified (`schema.table`)
    pub source_table: String,
    pub dest_table: Option<String>,
    pub connection_name: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
}

impl MirrorRequest {
    pub fn new(source_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            ..Default::default()
        }
    }

    pub fn with_dest_table(mut self, dest_table: impl Into<String>) -> Self {
        self.dest_table = Some(dest_table.into());
        self
    }

    pub fn with_connection(mut self, connection_name: impl Into<String>) -> Self {
        self.connection_name = Some(connection_name.into());
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Destination table name, defaulting to the source name
    pub fn destination(&self) -> &str {
        self.dest_table.as_deref().unwrap_or(&self.source_table)
    }
}

/// Where a failed mirror stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Schema,
    Connection,
    Copy,
}

impl FailureStage {
    fn message_prefix(&self) -> &'static str {
        match self {
            FailureStage::Schema => "Failed to get schema",
            FailureStage::Connection => "Connection error",
            FailureStage::Copy => "Mirror operation failed",
        }
    }
}

/// Outcome details of a completed mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorSummary {
    pub run_id: String,
    pub connection: String,
    pub source_table: String,
    pub destination_table: String,
    pub rows_copied: usize,
    pub table_created: bool,
    pub max_rows_reached: bool,
    /// Destination existed and overwrite was off, so nothing was copied
    pub skipped_existing: bool,
    pub batches: usize,
    pub checkpoints: usize,
    pub max_rows: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of one mirror operation. A run either completes (possibly capped)
/// or fails; there is no partial-success outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MirrorResult {
    Completed(MirrorSummary),
    Failed {
        run_id: String,
        source_table: String,
        stage: FailureStage,
        error: String,
    },
}

impl MirrorResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MirrorResult::Completed(_))
    }

    pub fn summary(&self) -> Option<&MirrorSummary> {
        match self {
            MirrorResult::Completed(summary) => Some(summary),
            MirrorResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            MirrorResult::Completed(_) => None,
            MirrorResult::Failed { error, .. } => Some(error),
        }
    }
}

/// Counters from the copy loop
#[derive(Debug, Default)]
struct CopyStats {
    rows_copied: usize,
    table_created: bool,
    skipped_existing: bool,
    batches: usize,
    checkpoints: usize,
}

/// Orchestrates schema discovery, destination setup and the batched copy
pub struct MirrorEngine {
    registry: ConnectionRegistry,
    inspector: SchemaInspector,
    store_path: PathBuf,
    settings: MirrorSettings,
    normalizer: ValueNormalizer,
}

impl MirrorEngine {
    pub fn new(
        registry: ConnectionRegistry,
        store_path: impl Into<PathBuf>,
        settings: MirrorSettings,
    ) -> Self {
        Self {
            registry,
            inspector: SchemaInspector::new(),
            store_path: store_path.into(),
            settings,
            normalizer: ValueNormalizer::new(settings.binary_mode),
        }
    }

    /// Configured connections and the default
    pub fn list_connections(&self) -> ConnectionListing {
        self.registry.list()
    }

    /// Standalone schema inspection; errors propagate to the caller
    pub fn describe_table(
        &mut self,
        table: &str,
        connection_name: Option<&str>,
    ) -> Result<TableSchema, MirrorError> {
        let (_, conn) = self.registry.resolve(connection_name)?;
        self.inspector.describe(conn, table)
    }

    /// Mirror one table. Never returns an error: every failure is reported
    /// as a failed result.
    #[instrument(
        name = "mirror",
        skip_all,
        fields(source_table = %request.source_table, run_id = tracing::field::Empty)
    )]
    pub fn mirror(&mut self, request: &MirrorRequest) -> MirrorResult {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let started_at = Utc::now();
        let destination = request.destination().to_string();
        info!(
            "Mirroring '{}' into '{}' (overwrite: {})",
            request.source_table, destination, request.overwrite
        );

        let schema = match self.describe_table(&request.source_table, request.connection_name.as_deref()) {
            Ok(schema) => schema,
            Err(e) => return Self::failed(run_id, request, FailureStage::Schema, e),
        };
        debug!("Source schema has {} columns", schema.len());

        let (connection, conn) = match self.registry.resolve(request.connection_name.as_deref()) {
            Ok(resolved) => resolved,
            Err(e) => return Self::failed(run_id, request, FailureStage::Connection, e),
        };

        let store = match DestinationStore::open(&self.store_path) {
            Ok(store) => store,
            Err(e) => {
                let e = MirrorError::DestinationUnavailable(e.to_string());
                return Self::failed(run_id, request, FailureStage::Connection, e);
            }
        };

        let outcome = copy_table(
            conn,
            &store,
            &schema,
            &request.source_table,
            &destination,
            request.overwrite,
            self.settings.max_rows,
            &self.normalizer,
        );

        if outcome.is_err() && !store.is_autocommit() {
            if let Err(e) = store.rollback() {
                warn!("Rollback failed: {}", e);
            }
        }
        if let Err(e) = store.close() {
            warn!("Failed to close destination store: {}", e);
        }

        let stats = match outcome {
            Ok(stats) => stats,
            Err(e) => return Self::failed(run_id, request, FailureStage::Copy, e),
        };

        let max_rows_reached = stats.rows_copied >= self.settings.max_rows;
        if max_rows_reached {
            warn!(
                "Maximum row limit of {} reached for '{}'",
                self.settings.max_rows, request.source_table
            );
        }
        info!(
            "Mirrored {} rows from '{}' into '{}'",
            stats.rows_copied, request.source_table, destination
        );

        MirrorResult::Completed(MirrorSummary {
            run_id,
            connection,
            source_table: request.source_table.clone(),
            destination_table: destination,
            rows_copied: stats.rows_copied,
            table_created: stats.table_created,
            max_rows_reached,
            skipped_existing: stats.skipped_existing,
            batches: stats.batches,
            checkpoints: stats.checkpoints,
            max_rows: self.settings.max_rows,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn failed(
        run_id: String,
        request: &MirrorRequest,
        stage: FailureStage,
        err: MirrorError,
    ) -> MirrorResult {
        let message = format!("{}: {}", stage.message_prefix(), err);
        error!("{}", message);
        MirrorResult::Failed {
            run_id,
            source_table: request.source_table.clone(),
            stage,
            error: message,
        }
    }
}

fn storage_failure(err: StorageError) -> MirrorError {
    MirrorError::copy_failure(err)
}

/// Ensure the destination table, then stream and insert rows. Leaves a
/// transaction open only when it returns an error.
#[allow(clippy::too_many_arguments)]
fn copy_table(
    conn: &dyn SourceConnection,
    store: &DestinationStore,
    schema: &TableSchema,
    source_table: &str,
    destination: &str,
    overwrite: bool,
    max_rows: usize,
    normalizer: &ValueNormalizer,
) -> Result<CopyStats, MirrorError> {
    let mut stats = CopyStats::default();

    store.begin().map_err(storage_failure)?;

    if !store.table_exists(destination).map_err(storage_failure)? {
        store
            .create_table(destination, &schema.columns)
            .map_err(storage_failure)?;
        info!("Created destination table '{}'", destination);
        stats.table_created = true;
    } else if overwrite {
        let cleared = store.clear_table(destination).map_err(storage_failure)?;
        info!("Cleared {} existing rows from '{}'", cleared, destination);
    } else {
        info!(
            "Destination table '{}' already exists and overwrite is off; leaving it untouched",
            destination
        );
        store.commit().map_err(storage_failure)?;
        stats.skipped_existing = true;
        return Ok(stats);
    }

    debug!("Scanning source table '{}'", source_table);
    let mut cursor = conn.scan_table(source_table).map_err(MirrorError::copy_failure)?;
    let columns = schema.column_names();

    while stats.rows_copied < max_rows {
        let batch = cursor
            .fetch_batch(FETCH_BATCH_SIZE)
            .map_err(MirrorError::copy_failure)?;
        if batch.is_empty() {
            break;
        }

        let rows = batch
            .into_iter()
            .map(|row| {
                if row.len() != columns.len() {
                    return Err(MirrorError::copy_failure(format!(
                        "source row has {} values but the schema has {} columns",
                        row.len(),
                        columns.len()
                    )));
                }
                Ok(normalizer.normalize_row(row))
            })
            .collect::<Result<Vec<Vec<DestinationValue>>, MirrorError>>()?;

        store
            .insert_batch(destination, &columns, &rows)
            .map_err(storage_failure)?;

        let previous = stats.rows_copied;
        stats.rows_copied += rows.len();
        stats.batches += 1;

        if stats.rows_copied / CHECKPOINT_INTERVAL > previous / CHECKPOINT_INTERVAL {
            store.commit().map_err(storage_failure)?;
            store.begin().map_err(storage_failure)?;
            stats.checkpoints += 1;
            info!("Checkpoint: committed {} rows", stats.rows_copied);
        }
    }

    store.commit().map_err(storage_failure)?;
    Ok(stats)
}
