//! Common types, errors, and configuration for conductor.
//!
//! This crate provides shared functionality used across the conductor workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for runtime, cache, and route settings
//! - TOML configuration file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{CacheConfig, EngineConfig, ExecutionConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError, MountEntry, RouteEntry, ServerConfigFile};
pub use error::DispatchError;
