// Table mirroring from driver-accessed relational sources into a local SQLite store

// Module declarations
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod mirror;
pub mod report;
pub mod storage;

pub use config::{BinaryMode, ConnectionSpec, ConnectionsConfig, MirrorSettings};
pub use db::{ConnectionListing, ConnectionRegistry, DriverRegistry};
pub use error::MirrorError;
pub use mirror::{FailureStage, MirrorEngine, MirrorRequest, MirrorResult, MirrorSummary};
