// Mirror Error Types
// Every failure kind a mirror operation or its standalone helpers can report

use thiserror::Error;

use crate::db::traits::SourceKind;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("No default connection specified and {candidates} connections are configured")]
    AmbiguousConnection { candidates: usize },

    #[error("Connection '{0}' not found in configuration")]
    UnknownConnection(String),

    #[error("Failed to connect to '{name}': {message}")]
    ConnectionFailure { name: String, message: String },

    #[error("No driver registered for {kind} connection '{name}'")]
    DriverNotFound { name: String, kind: SourceKind },

    #[error("Failed to get schema for table '{table}': {message}")]
    SchemaUnavailable { table: String, message: String },

    #[error("Failed to open destination store: {0}")]
    DestinationUnavailable(String),

    #[error("{0}")]
    CopyFailure(String),
}

impl MirrorError {
    pub fn connection_failure(name: impl Into<String>, message: impl ToString) -> Self {
        MirrorError::ConnectionFailure {
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn copy_failure(message: impl ToString) -> Self {
        MirrorError::CopyFailure(message.to_string())
    }
}
