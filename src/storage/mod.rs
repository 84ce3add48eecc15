// Destination Storage Module
// Local SQLite store, type mapping and value normalization for mirrored tables

pub mod database;
pub mod normalize;
pub mod typemap;

pub use database::{column_ddl, quote_identifier, DestinationStore, StorageError, StorageResult};
pub use normalize::{DestinationValue, ValueNormalizer};
pub use typemap::{map_type, StorageClass};
