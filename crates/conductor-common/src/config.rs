//! Configuration structures for conductor.
//!
//! This module defines configuration options for the runtime components:
//! - [`RuntimeConfig`]: Top-level runtime settings
//! - [`EngineConfig`]: Wasmtime engine settings (pooling, epoch interruption)
//! - [`ExecutionConfig`]: Per-request invocation limits (timeout, output size)
//! - [`CacheConfig`]: Shared capacity and TTL for the module and response caches

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-request execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Wasmtime engine configuration.
///
/// These settings affect the global Wasmtime engine behavior,
/// including memory allocation strategy and interruption support.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable pooling allocator for high-performance instance creation.
    ///
    /// When enabled, memory is pre-allocated for a pool of instances,
    /// reducing per-request instantiation time.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum concurrent instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Enable epoch-based interruption.
    ///
    /// Required for deadline enforcement on running instruments. When
    /// disabled an instrument that never yields cannot be interrupted.
    #[serde(default = "defaults::epoch_interruption")]
    pub epoch_interruption: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            epoch_interruption: defaults::epoch_interruption(),
        }
    }
}

/// Per-request execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Invocation deadline in milliseconds.
    ///
    /// An instrument still running past the deadline is interrupted and
    /// the request fails as cancelled.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes an instrument may write to stdout.
    ///
    /// Writes past this limit fail inside the guest.
    #[serde(default = "defaults::max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::timeout_ms(),
            max_response_bytes: defaults::max_response_bytes(),
        }
    }
}

impl ExecutionConfig {
    /// Get the invocation deadline as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Cache configuration shared by the module and response caches.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Global default response TTL in seconds.
    ///
    /// Applies to cacheable routes that do not set their own TTL.
    /// A value of zero disables response caching for those routes.
    #[serde(default = "defaults::cache_ttl")]
    pub ttl: u64,

    /// Maximum entries for each cache. Must be positive.
    #[serde(default = "defaults::cache_size")]
    pub size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: defaults::cache_ttl(),
            size: defaults::cache_size(),
        }
    }
}

impl CacheConfig {
    /// Get the global default TTL as a `Duration`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.size == 0 {
            return Err(DispatchError::invalid_config(
                "cache size must be positive",
            ));
        }
        Ok(())
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        true
    }

    pub const fn max_instances() -> u32 {
        1000
    }

    pub const fn instance_memory_mb() -> u32 {
        64
    }

    pub const fn epoch_interruption() -> bool {
        true
    }

    pub const fn timeout_ms() -> u64 {
        30_000
    }

    pub const fn max_response_bytes() -> usize {
        16 * 1024 * 1024
    }

    pub const fn cache_ttl() -> u64 {
        300
    }

    pub const fn cache_size() -> usize {
        1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert!(config.engine.pooling_allocator);
        assert_eq!(config.engine.max_instances, 1000);
        assert_eq!(config.engine.instance_memory_mb, 64);
        assert!(config.engine.epoch_interruption);

        assert_eq!(config.execution.timeout_ms, 30_000);
        assert_eq!(config.execution.max_response_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_default_cache_config() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, 300);
        assert_eq!(config.size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_rejects_zero_size() {
        let config = CacheConfig { ttl: 300, size: 0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_execution_timeout() {
        let config = ExecutionConfig {
            timeout_ms: 500,
            ..Default::default()
        };

        assert_eq!(config.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_config_serialization() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RuntimeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            config.engine.max_instances,
            deserialized.engine.max_instances
        );
        assert_eq!(
            config.execution.timeout_ms,
            deserialized.execution.timeout_ms
        );
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"engine": {"max_instances": 500}}"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.engine.max_instances, 500);
        // Default values for unspecified fields
        assert!(config.engine.pooling_allocator);
        assert_eq!(config.execution.timeout_ms, 30_000);
    }
}
