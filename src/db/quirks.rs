// Driver Quirk Policy
// Resolves per-connection session options before a driver opens a connection

use serde::Serialize;

/// How textual data is decoded on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// Explicit UTF-8 decode/encode configured on the connection
    Utf8,
    /// Leave the driver's own character handling alone
    DriverDefault,
}

/// Session options applied at connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionOptions {
    pub autocommit_on_connect: bool,
    pub text_encoding: TextEncoding,
}

impl SessionOptions {
    /// Options for well-behaved drivers
    pub fn standard() -> Self {
        Self {
            autocommit_on_connect: false,
            text_encoding: TextEncoding::Utf8,
        }
    }

    /// Options for legacy drivers that reject transactions and encoding setup
    pub fn legacy() -> Self {
        Self {
            autocommit_on_connect: true,
            text_encoding: TextEncoding::DriverDefault,
        }
    }

    pub fn is_legacy(&self) -> bool {
        *self == Self::legacy()
    }
}

/// Strategy deciding session options from a connection definition
pub trait SessionPolicy {
    fn resolve(&self, connection_name: &str, connection_string: &str) -> SessionOptions;
}

/// Detects legacy systems by connection-string marker or connection name
#[derive(Debug, Clone)]
pub struct LegacyDriverPolicy {
    /// Case-insensitive substrings of the connection string
    markers: Vec<String>,
    /// Case-insensitive connection names
    names: Vec<String>,
}

impl LegacyDriverPolicy {
    pub fn new(markers: Vec<String>, names: Vec<String>) -> Self {
        Self {
            markers: markers.into_iter().map(|m| m.to_uppercase()).collect(),
            names: names.into_iter().map(|n| n.to_uppercase()).collect(),
        }
    }
}

impl Default for LegacyDriverPolicy {
    /// ProvideX (Sage 100) drivers
    fn default() -> Self {
        Self::new(vec!["PROVIDEX".to_string()], vec!["SAGE100".to_string()])
    }
}

impl SessionPolicy for LegacyDriverPolicy {
    fn resolve(&self, connection_name: &str, connection_string: &str) -> SessionOptions {
        let upper = connection_string.to_uppercase();
        let marker_hit = self.markers.iter().any(|m| upper.contains(m.as_str()));
        let name_hit = self
            .names
            .iter()
            .any(|n| connection_name.to_uppercase() == *n);

        if marker_hit || name_hit {
            SessionOptions::legacy()
        } else {
            SessionOptions::standard()
        }
    }
}

/// Policy that never applies quirks
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPolicy;

impl SessionPolicy for StandardPolicy {
    fn resolve(&self, _connection_name: &str, _connection_string: &str) -> SessionOptions {
        SessionOptions::standard()
    }
}
