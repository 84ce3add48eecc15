// Driver and Connection Registries
// Maps engine kinds to drivers and caches one live source handle per connection name

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{ConnectionSpec, ConnectionsConfig};
use crate::db::quirks::{LegacyDriverPolicy, SessionPolicy};
use crate::db::traits::{ConnectParams, ConnectTarget, SourceConnection, SourceDriver, SourceKind};
use crate::error::MirrorError;

/// Parameters consumed by the registry itself and never forwarded as-is
const RESERVED_PARAMS: &[&str] = &["dsn", "username", "password", "readonly", "engine"];

/// Registry for managing source drivers
pub struct DriverRegistry {
    drivers: HashMap<SourceKind, Arc<dyn SourceDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry with every driver compiled into this build
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::db::drivers::SqliteDriver::new()));
        #[cfg(feature = "odbc")]
        registry.register(Arc::new(crate::db::drivers::OdbcDriver::new()));
        registry
    }

    /// Register a source driver, replacing any previous driver of the same kind
    pub fn register(&mut self, driver: Arc<dyn SourceDriver>) {
        let kind = driver.kind();
        self.drivers.insert(kind, driver);
        debug!("Registered driver for: {:?}", kind);
    }

    /// Get a driver by engine kind
    pub fn get_driver(&self, kind: SourceKind) -> Option<Arc<dyn SourceDriver>> {
        self.drivers.get(&kind).cloned()
    }

}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Configured connection names plus the default, for listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionListing {
    pub connections: Vec<String>,
    pub default_connection: Option<String>,
}

/// Assemble ordered driver parameters: addressing first, then credentials,
/// then the remaining parameters in ascending key order
pub fn assemble_params(spec: &ConnectionSpec) -> ConnectParams {
    let mut params = ConnectParams::new();

    if let Some(dsn) = spec.param("dsn") {
        params.push("DSN", dsn);
    }
    if let Some(username) = spec.param("username") {
        params.push("UID", username);
    }
    if let Some(password) = spec.param("password") {
        params.push("PWD", password);
    }
    for (key, value) in &spec.params {
        if !RESERVED_PARAMS.contains(&key.as_str()) {
            params.push(key.clone(), value.clone());
        }
    }

    params
}

/// Holds connection definitions and caches live handles by name.
/// Not synchronized: one request at a time per registry.
pub struct ConnectionRegistry {
    config: ConnectionsConfig,
    drivers: DriverRegistry,
    policy: Box<dyn SessionPolicy>,
    cache: HashMap<String, Box<dyn SourceConnection>>,
}

impl ConnectionRegistry {
    /// Registry with the built-in drivers and the default quirk policy
    pub fn new(config: ConnectionsConfig) -> Self {
        Self::with_drivers(config, DriverRegistry::with_builtin_drivers())
    }

    pub fn with_drivers(config: ConnectionsConfig, drivers: DriverRegistry) -> Self {
        Self {
            config,
            drivers,
            policy: Box::new(LegacyDriverPolicy::default()),
            cache: HashMap::new(),
        }
    }

    /// Replace the driver-quirk policy
    pub fn with_policy(mut self, policy: Box<dyn SessionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// List configured connections
    pub fn list(&self) -> ConnectionListing {
        ConnectionListing {
            connections: self.config.names(),
            default_connection: self.config.default_connection().map(str::to_string),
        }
    }

    /// Resolve an optional connection name to a configured one
    pub fn resolve_name(&self, name: Option<&str>) -> Result<String, MirrorError> {
        let resolved = match name {
            Some(name) => name.to_string(),
            None => match self.config.default_connection() {
                Some(default) => default.to_string(),
                None if self.config.len() == 1 => self.config.names().remove(0),
                None => {
                    return Err(MirrorError::AmbiguousConnection {
                        candidates: self.config.len(),
                    })
                }
            },
        };

        if !self.config.contains(&resolved) {
            return Err(MirrorError::UnknownConnection(resolved));
        }
        Ok(resolved)
    }

    /// Whether a live handle is cached for a name
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    /// Resolve a connection and return a live handle, reusing the cached one
    /// when it passes the staleness probe
    pub fn resolve(
        &mut self,
        name: Option<&str>,
    ) -> Result<(String, &dyn SourceConnection), MirrorError> {
        let resolved = self.resolve_name(name)?;

        let stale = match self.cache.get(&resolved) {
            Some(conn) => match conn.probe() {
                Ok(()) => false,
                Err(e) => {
                    warn!("Error testing existing connection '{}': {}", resolved, e);
                    true
                }
            },
            None => false,
        };

        if stale {
            if let Some(conn) = self.cache.remove(&resolved) {
                if let Err(e) = conn.close() {
                    debug!("Ignoring close failure on stale connection '{}': {}", resolved, e);
                }
            }
        }

        if !self.cache.contains_key(&resolved) {
            let conn = self.open(&resolved)?;
            self.cache.insert(resolved.clone(), conn);
        }

        let conn = self
            .cache
            .get(&resolved)
            .map(|c| &**c)
            .ok_or_else(|| MirrorError::connection_failure(&resolved, "connection cache lost the handle"))?;
        Ok((resolved, conn))
    }

    /// Open a new handle for a configured connection
    fn open(&self, name: &str) -> Result<Box<dyn SourceConnection>, MirrorError> {
        let spec = self
            .config
            .get(name)
            .ok_or_else(|| MirrorError::UnknownConnection(name.to_string()))?;

        let kind = match spec.param("engine") {
            Some(engine) => SourceKind::from_param(engine).ok_or_else(|| {
                MirrorError::connection_failure(name, format!("unknown engine '{}'", engine))
            })?,
            None => SourceKind::Odbc,
        };

        let driver = self
            .drivers
            .get_driver(kind)
            .ok_or_else(|| MirrorError::DriverNotFound {
                name: name.to_string(),
                kind,
            })?;

        let params = assemble_params(spec);
        let session = self.policy.resolve(name, &params.connection_string());

        info!(
            "Connecting to '{}' via {} with connection string: {}",
            name,
            driver.driver_name(),
            params.redacted()
        );
        if session.is_legacy() {
            info!("Using legacy connection mode for '{}' (autocommit on connect)", name);
        }

        let target = ConnectTarget {
            name,
            params: &params,
            session,
        };
        driver
            .connect(&target)
            .map_err(|e| MirrorError::connection_failure(name, e))
    }

    /// Close and drop every cached handle
    pub fn close_all(&mut self) {
        for (name, conn) in self.cache.drain() {
            match conn.close() {
                Ok(()) => debug!("Closed connection '{}'", name),
                Err(e) => debug!("Ignoring close failure on '{}': {}", name, e),
            }
        }
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
