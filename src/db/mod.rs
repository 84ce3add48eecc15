// Source Module
// Driver seam, connection registry, quirk policy and schema inspection

pub mod drivers;
pub mod quirks;
pub mod registry;
pub mod schema;
pub mod traits;

pub use quirks::{LegacyDriverPolicy, SessionOptions, SessionPolicy, StandardPolicy, TextEncoding};
pub use registry::{ConnectionListing, ConnectionRegistry, DriverRegistry};
pub use schema::{ColumnDef, SchemaInspector, TableSchema};
pub use traits::{
    ColumnMetadata, ConnectParams, ConnectTarget, DeclaredType, DescribedColumn, RowCursor,
    SourceConnection, SourceDriver, SourceError, SourceKind, SourceValue,
};
