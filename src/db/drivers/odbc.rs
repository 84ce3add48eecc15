// ODBC Source Driver
// Connects through the system ODBC driver manager using odbc-api

use odbc_api::buffers::TextRowSet;
use odbc_api::{
    BlockCursor, Connection, ConnectionOptions, Cursor, CursorImpl, Environment, Nullability,
    ResultSetMetadata, StatementImpl,
};
use once_cell::sync::OnceCell;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::db::quirks::TextEncoding;
use crate::db::traits::{
    ColumnMetadata, ConnectTarget, DeclaredType, DescribedColumn, RowCursor, SourceConnection,
    SourceDriver, SourceError, SourceKind, SourceValue, ValueFamily,
};

/// Rows per ODBC block fetch
const ODBC_BATCH_SIZE: usize = 100;

/// Upper bound for a single text cell
const MAX_TEXT_LENGTH: usize = 65536;

// Positions in the SQLColumns result set (0-based)
const COLUMN_NAME: usize = 3;
const TYPE_NAME: usize = 5;
const COLUMN_SIZE: usize = 6;
const NULLABLE: usize = 10;
const ORDINAL_POSITION: usize = 16;

static ENVIRONMENT: OnceCell<Environment> = OnceCell::new();

fn environment() -> Result<&'static Environment, SourceError> {
    ENVIRONMENT.get_or_try_init(Environment::new).map_err(|e| {
        SourceError::Connect(format!(
            "Failed to create ODBC environment: {}. Make sure an ODBC driver manager is installed.",
            e
        ))
    })
}

fn decode_text(bytes: &[u8], encoding: TextEncoding) -> Result<String, SourceError> {
    match encoding {
        TextEncoding::Utf8 => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| SourceError::Fetch(format!("Invalid UTF-8 in text value: {}", e))),
        TextEncoding::DriverDefault => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Catalog and schema arguments for SQLColumns. An empty string matches only
/// objects without a schema, so an absent schema becomes the `%` pattern.
fn columns_scope<'a>(current_catalog: &'a str, schema: Option<&'a str>) -> (&'a str, &'a str) {
    (current_catalog, schema.unwrap_or("%"))
}

/// ODBC connection wrapper
pub struct OdbcConnection {
    name: String,
    conn: Connection<'static>,
    encoding: TextEncoding,
}

impl SourceConnection for OdbcConnection {
    fn probe(&self) -> Result<(), SourceError> {
        self.conn
            .execute("SELECT 1", ())
            .map(|_| ())
            .map_err(|e| SourceError::Query(e.to_string()))
    }

    fn column_metadata(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>, SourceError> {
        let metadata_error = |e: odbc_api::Error| SourceError::Metadata(e.to_string());

        // Drivers without catalog support report an empty current catalog
        let current_catalog = self.conn.current_catalog().unwrap_or_else(|e| {
            debug!("Current catalog unavailable on '{}': {}", self.name, e);
            String::new()
        });
        let (catalog, schema) = columns_scope(&current_catalog, schema);
        debug!(
            "Column metadata for '{}' (catalog: '{}', schema: '{}')",
            table, catalog, schema
        );

        let mut cursor = self
            .conn
            .columns(catalog, schema, table, "%")
            .map_err(metadata_error)?;
        let mut buffers =
            TextRowSet::for_cursor(ODBC_BATCH_SIZE, &mut cursor, Some(4096)).map_err(metadata_error)?;
        let mut row_cursor = cursor.bind_buffer(&mut buffers).map_err(metadata_error)?;

        let mut columns = Vec::new();
        while let Some(batch) = row_cursor.fetch().map_err(metadata_error)? {
            for row in 0..batch.num_rows() {
                let text = |col: usize| -> Result<Option<String>, SourceError> {
                    batch
                        .at(col, row)
                        .map(|bytes| decode_text(bytes, self.encoding))
                        .transpose()
                };
                let int = |col: usize| -> Result<i64, SourceError> {
                    Ok(text(col)?
                        .and_then(|s| s.trim().parse::<i64>().ok())
                        .unwrap_or(0))
                };

                let Some(column_name) = text(COLUMN_NAME)? else {
                    continue;
                };
                columns.push(ColumnMetadata {
                    column_name,
                    type_name: text(TYPE_NAME)?.unwrap_or_default(),
                    column_size: int(COLUMN_SIZE)?,
                    nullable: int(NULLABLE)? as i32,
                    ordinal_position: int(ORDINAL_POSITION)? as i32,
                });
            }
        }

        Ok(columns)
    }

    fn describe_query(&self, sql: &str) -> Result<Vec<DescribedColumn>, SourceError> {
        let query_error = |e: odbc_api::Error| SourceError::Query(e.to_string());

        let Some(mut cursor) = self.conn.execute(sql, ()).map_err(query_error)? else {
            return Ok(Vec::new());
        };

        let count = cursor.num_result_cols().map_err(query_error)?;
        let mut described = Vec::with_capacity(count.max(0) as usize);
        for i in 1..=count as u16 {
            let name = cursor.col_name(i).map_err(query_error)?;
            let code = cursor.col_concise_type(i).map_err(query_error)?.0;
            let display_size = cursor
                .col_data_type(i)
                .map_err(query_error)?
                .column_size()
                .map(|size| size.get() as i64)
                .unwrap_or(0);
            let nullable = !matches!(
                cursor.col_nullability(i).map_err(query_error)?,
                Nullability::NoNulls
            );
            described.push(DescribedColumn {
                name,
                declared_type: DeclaredType::Code(code),
                display_size,
                nullable,
            });
        }

        Ok(described)
    }

    fn query<'a>(&'a self, sql: &str) -> Result<Box<dyn RowCursor + 'a>, SourceError> {
        let query_error = |e: odbc_api::Error| SourceError::Query(e.to_string());

        let Some(mut cursor) = self.conn.execute(sql, ()).map_err(query_error)? else {
            debug!("Query on '{}' produced no result set", self.name);
            return Ok(Box::new(OdbcCursor {
                block: None,
                families: Vec::new(),
                encoding: self.encoding,
                pending: VecDeque::new(),
            }));
        };

        let count = cursor.num_result_cols().map_err(query_error)?;
        let mut families = Vec::with_capacity(count.max(0) as usize);
        for i in 1..=count as u16 {
            let code = cursor.col_concise_type(i).map_err(query_error)?.0;
            families.push(ValueFamily::from_sql_code(code));
        }

        let buffers = TextRowSet::for_cursor(ODBC_BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LENGTH))
            .map_err(query_error)?;
        let block = cursor.bind_buffer(buffers).map_err(query_error)?;

        Ok(Box::new(OdbcCursor {
            block: Some(block),
            families,
            encoding: self.encoding,
            pending: VecDeque::new(),
        }))
    }
}

/// Block cursor over a text-bound result set
struct OdbcCursor<'a> {
    /// `None` once the result set is exhausted
    block: Option<BlockCursor<CursorImpl<StatementImpl<'a>>, TextRowSet>>,
    families: Vec<ValueFamily>,
    encoding: TextEncoding,
    pending: VecDeque<Vec<SourceValue>>,
}

impl OdbcCursor<'_> {
    /// Pull one block into `pending`; false when the result set is exhausted
    fn fill(&mut self) -> Result<bool, SourceError> {
        let Some(block) = self.block.as_mut() else {
            return Ok(false);
        };

        let Some(batch) = block
            .fetch()
            .map_err(|e| SourceError::Fetch(e.to_string()))?
        else {
            self.block = None;
            return Ok(false);
        };

        for row in 0..batch.num_rows() {
            let mut values = Vec::with_capacity(self.families.len());
            for (col, family) in self.families.iter().enumerate() {
                let text = batch
                    .at(col, row)
                    .map(|bytes| decode_text(bytes, self.encoding))
                    .transpose()?;
                values.push(SourceValue::from_text(text, *family));
            }
            self.pending.push_back(values);
        }
        Ok(true)
    }
}

impl RowCursor for OdbcCursor<'_> {
    fn fetch_batch(&mut self, max_rows: usize) -> Result<Vec<Vec<SourceValue>>, SourceError> {
        while self.pending.len() < max_rows && self.fill()? {}

        let take = max_rows.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }
}

/// ODBC source driver
pub struct OdbcDriver;

impl OdbcDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OdbcDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceDriver for OdbcDriver {
    fn kind(&self) -> SourceKind {
        SourceKind::Odbc
    }

    fn connect(&self, target: &ConnectTarget<'_>) -> Result<Box<dyn SourceConnection>, SourceError> {
        let env = environment()?;
        let conn = env
            .connect_with_connection_string(
                &target.params.connection_string(),
                ConnectionOptions::default(),
            )
            .map_err(|e| SourceError::Connect(e.to_string()))?;

        if target.session.autocommit_on_connect {
            conn.set_autocommit(true)
                .map_err(|e| SourceError::Connect(format!("Failed to enable autocommit: {}", e)))?;
        }

        info!("Connected to ODBC source '{}'", target.name);

        Ok(Box::new(OdbcConnection {
            name: target.name.to_string(),
            conn,
            encoding: target.session.text_encoding,
        }))
    }
}
