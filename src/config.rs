// Connection Definitions and Run Settings
// Parses the connections file and holds the settings a mirror run needs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Reserved section holding server-wide keys such as `default_connection`
pub const SERVER_SECTION: &str = "SERVER";

/// Default maximum rows copied per mirror operation
pub const DEFAULT_MAX_ROWS: usize = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Destination directory not found: {0}")]
    StoreDirectoryMissing(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for '{key}' in section [{section}]: {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Failed to get app data directory")]
    AppDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One named source connection definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSpec {
    pub name: String,
    /// Lower-cased parameter names to values
    pub params: BTreeMap<String, String>,
}

impl ConnectionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter insertion
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into().to_lowercase(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(&key.to_lowercase()).map(String::as_str)
    }
}

/// Parsed connection definitions plus the optional default name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionsConfig {
    connections: BTreeMap<String, ConnectionSpec>,
    default_connection: Option<String>,
}

impl ConnectionsConfig {
    pub fn new(specs: Vec<ConnectionSpec>, default_connection: Option<String>) -> Self {
        let connections = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect();
        Self {
            connections,
            default_connection,
        }
    }

    /// Parse a TOML connections file body
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let document: toml::Table = toml::from_str(content)?;

        let mut specs = Vec::new();
        let mut default_connection = None;

        for (section, value) in document {
            let toml::Value::Table(table) = value else {
                return Err(ConfigError::InvalidValue {
                    section: section.clone(),
                    key: section,
                    message: "top-level keys must be sections".to_string(),
                });
            };

            if section.eq_ignore_ascii_case(SERVER_SECTION) {
                if let Some(value) = table.get("default_connection") {
                    let name = scalar_to_string(&section, "default_connection", value)?;
                    if !name.is_empty() {
                        default_connection = Some(name);
                    }
                }
                continue;
            }

            let mut spec = ConnectionSpec::new(section.clone());
            for (key, value) in &table {
                let value = scalar_to_string(&section, key, value)?;
                spec.params.insert(key.to_lowercase(), value);
            }
            debug!("Found connection: {}", section);
            specs.push(spec);
        }

        if specs.is_empty() {
            warn!("No connections found in configuration");
        }

        Ok(Self::new(specs, default_connection))
    }

    /// Load and parse a TOML connections file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        debug!("Loading connections from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionSpec> {
        self.connections.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    /// Connection names in ascending order
    pub fn names(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn default_connection(&self) -> Option<&str> {
        self.default_connection.as_deref()
    }
}

fn scalar_to_string(section: &str, key: &str, value: &toml::Value) -> Result<String, ConfigError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Datetime(d) => Ok(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => Err(ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            message: "connection parameters must be scalar values".to_string(),
        }),
    }
}

/// How binary cells are written to the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryMode {
    /// Byte-string literal text such as `b"A\xff"`, not the bytes themselves
    #[default]
    DebugText,
    /// Raw bytes stored as BLOB
    Blob,
}

/// Per-engine run settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MirrorSettings {
    /// Ceiling on rows copied per operation, checked between batches
    pub max_rows: usize,
    pub binary_mode: BinaryMode,
}

impl MirrorSettings {
    pub fn new(max_rows: usize, binary_mode: BinaryMode) -> Result<Self, ConfigError> {
        if max_rows == 0 {
            return Err(ConfigError::InvalidSetting(
                "max_rows must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_rows,
            binary_mode,
        })
    }
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            binary_mode: BinaryMode::default(),
        }
    }
}

/// Validate an explicit destination store path: the parent directory must exist
pub fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };
    if !parent.is_dir() {
        return Err(ConfigError::StoreDirectoryMissing(parent.to_path_buf()));
    }
    Ok(())
}

/// Get the default destination store path in the app data directory
pub fn get_default_store_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs = directories::ProjectDirs::from("com", "table-mirror", "table-mirror")
        .ok_or(ConfigError::AppDataDir)?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("mirror.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[SERVER]
default_connection = "sage100"

[sage100]
dsn = "SOTAMAS90"
username = "admin"
password = "secret"
CompanyCode = "ABC"

[warehouse]
dsn = "Postgres"
port = 5432
readonly = true
"#;

    #[test]
    fn test_parse_connections_file() {
        let config = ConnectionsConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.len(), 2);
        assert_eq!(config.names(), vec!["sage100", "warehouse"]);
        assert_eq!(config.default_connection(), Some("sage100"));

        let sage = config.get("sage100").unwrap();
        assert_eq!(sage.param("dsn"), Some("SOTAMAS90"));
        // Keys are lower-cased
        assert_eq!(sage.param("companycode"), Some("ABC"));
        assert_eq!(sage.param("CompanyCode"), Some("ABC"));

        let warehouse = config.get("warehouse").unwrap();
        assert_eq!(warehouse.param("port"), Some("5432"));
        assert_eq!(warehouse.param("readonly"), Some("true"));
    }

    #[test]
    fn test_server_section_is_not_a_connection() {
        let config = ConnectionsConfig::from_toml_str(
            "[server]\ndefault_connection = \"a\"\n\n[a]\ndsn = \"A\"\n",
        )
        .unwrap();
        assert_eq!(config.names(), vec!["a"]);
        assert_eq!(config.default_connection(), Some("a"));
    }

    #[test]
    fn test_no_default_and_empty_file() {
        let config = ConnectionsConfig::from_toml_str("[only]\ndsn = \"X\"\n").unwrap();
        assert_eq!(config.default_connection(), None);

        let empty = ConnectionsConfig::from_toml_str("").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_nested_values_are_rejected() {
        let result = ConnectionsConfig::from_toml_str("[a]\ndsn = \"A\"\nopts = [1, 2]\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = ConnectionsConfig::from_toml_str("stray = 1\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConnectionsConfig::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_settings_validation() {
        assert!(MirrorSettings::new(0, BinaryMode::DebugText).is_err());
        let settings = MirrorSettings::new(50, BinaryMode::Blob).unwrap();
        assert_eq!(settings.max_rows, 50);
        assert_eq!(MirrorSettings::default().max_rows, DEFAULT_MAX_ROWS);
        assert_eq!(MirrorSettings::default().binary_mode, BinaryMode::DebugText);
    }

    #[test]
    fn test_validate_store_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_store_path(&dir.path().join("mirror.db")).is_ok());
        assert!(validate_store_path(Path::new("mirror.db")).is_ok());

        let missing = dir.path().join("nope").join("mirror.db");
        assert!(matches!(
            validate_store_path(&missing),
            Err(ConfigError::StoreDirectoryMissing(_))
        ));
    }
}
