// Source Drivers
// One implementation per supported source engine

#[cfg(feature = "odbc")]
pub mod odbc;
pub mod sqlite;

// Re-export drivers
#[cfg(feature = "odbc")]
pub use odbc::OdbcDriver;
pub use sqlite::SqliteDriver;
