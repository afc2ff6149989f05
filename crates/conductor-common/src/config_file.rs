//! Configuration file structures for conductor.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ServerConfigFile`]: HTTP server settings
//! - [`RouteEntry`]: A route binding an HTTP path to an instrument
//! - [`MountEntry`]: Filesystem mount granted to an instrument

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CacheConfig, RuntimeConfig};

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [server]
/// port = "8080"
/// request_timeout_secs = 30
///
/// [cache]
/// ttl = 300
/// size = 1024
///
/// [runtime.execution]
/// timeout_ms = 10_000
///
/// [routes."/fibonacci"]
/// wasm_file = "./instruments/fibonacci.wasm"
/// cache = true
/// ttl = 600
///
/// [routes."/process_file"]
/// wasm_file = "./instruments/file_processor.wasm"
///
/// [routes."/process_file".mount]
/// guest_path = "/data"
/// host_path = "./data"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine + execution settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfigFile,

    /// Cache configuration shared by module and response caches.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Routes keyed by URL path.
    #[serde(default)]
    pub routes: BTreeMap<String, RouteEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigFileError> {
        if self.cache.size == 0 {
            return Err(ConfigFileError::Invalid {
                reason: "cache.size must be positive".into(),
            });
        }
        for (path, route) in &self.routes {
            if !path.starts_with('/') {
                return Err(ConfigFileError::Invalid {
                    reason: format!("route path '{path}' must start with '/'"),
                });
            }
            if route.wasm_file.is_empty() {
                return Err(ConfigFileError::Invalid {
                    reason: format!("route '{path}' has an empty wasm_file"),
                });
            }
        }
        Ok(())
    }
}

/// HTTP server configuration from config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfigFile {
    /// Listen port (e.g., "8080").
    #[serde(default = "defaults::port")]
    pub port: String,

    /// Request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Enable graceful shutdown.
    #[serde(default = "defaults::graceful_shutdown")]
    pub graceful_shutdown: bool,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            request_timeout_secs: defaults::request_timeout_secs(),
            graceful_shutdown: defaults::graceful_shutdown(),
        }
    }
}

/// A route binding an HTTP path to an instrument.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteEntry {
    /// Path to the compiled WebAssembly module (WASI target).
    pub wasm_file: String,

    /// Enable in-memory response caching for this route.
    #[serde(default)]
    pub cache: bool,

    /// TTL for the response cache in seconds.
    ///
    /// Zero means the global default TTL applies.
    #[serde(default)]
    pub ttl: u64,

    /// Filesystem mount exposed to the instrument.
    ///
    /// When absent the instrument has no filesystem surface at all.
    #[serde(default)]
    pub mount: Option<MountEntry>,
}

/// Filesystem mount configuration for a route.
///
/// The host directory is exposed read/write to the instrument at the
/// guest path, and nothing else is visible.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MountEntry {
    /// Guest mount point, e.g. "/data".
    pub guest_path: String,

    /// Host directory, e.g. "./data".
    pub host_path: String,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },

    /// Configuration failed validation.
    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn port() -> String {
        "8080".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn graceful_shutdown() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert_eq!(config.server.port, "8080");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.server.graceful_shutdown);
        assert_eq!(config.cache.ttl, 300);
        assert_eq!(config.cache.size, 1024);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            port = "3000"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.server.port, "3000");
        // Defaults applied
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.cache.ttl, 300);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            port = "9000"
            request_timeout_secs = 60
            graceful_shutdown = false

            [cache]
            ttl = 120
            size = 64

            [runtime.engine]
            pooling_allocator = false

            [runtime.execution]
            timeout_ms = 5000

            [routes."/fibonacci"]
            wasm_file = "./instruments/fibonacci.wasm"
            cache = true
            ttl = 600

            [routes."/process_file"]
            wasm_file = "./instruments/file_processor.wasm"

            [routes."/process_file".mount]
            guest_path = "/data"
            host_path = "./data"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.server.port, "9000");
        assert_eq!(config.server.request_timeout_secs, 60);
        assert!(!config.server.graceful_shutdown);
        assert_eq!(config.cache.ttl, 120);
        assert_eq!(config.cache.size, 64);
        assert!(!config.runtime.engine.pooling_allocator);
        assert_eq!(config.runtime.execution.timeout_ms, 5000);
        assert_eq!(config.routes.len(), 2);

        let fib = &config.routes["/fibonacci"];
        assert_eq!(fib.wasm_file, "./instruments/fibonacci.wasm");
        assert!(fib.cache);
        assert_eq!(fib.ttl, 600);
        assert!(fib.mount.is_none());

        let files = &config.routes["/process_file"];
        assert!(!files.cache);
        assert_eq!(files.ttl, 0);
        let mount = files.mount.as_ref().unwrap();
        assert_eq!(mount.guest_path, "/data");
        assert_eq!(mount.host_path, "./data");
    }

    #[test]
    fn test_parse_rejects_zero_cache_size() {
        let toml = r#"
            [cache]
            size = 0
        "#;

        let result = ConfigFile::from_toml(toml);
        assert!(matches!(result, Err(ConfigFileError::Invalid { .. })));
    }

    #[test]
    fn test_parse_rejects_relative_route_path() {
        let toml = r#"
            [routes."fibonacci"]
            wasm_file = "./instruments/fibonacci.wasm"
        "#;

        let result = ConfigFile::from_toml(toml);
        assert!(matches!(result, Err(ConfigFileError::Invalid { .. })));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = ConfigFile::from_toml(invalid);
        assert!(matches!(result, Err(ConfigFileError::Parse { .. })));
    }
}
