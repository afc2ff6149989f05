//! Request-dispatch runtime for conductor.
//!
//! This crate couples the four pieces that make parallel HTTP traffic
//! over sandboxed WASI instruments correct:
//!
//! - [`WasmEngine`] + [`InstanceRunner`]: the engine adapter: compile,
//!   instantiate with controlled stdio/filesystem, invoke `_start`
//! - [`ModuleCache`]: compiled-module cache with single-flight compiles
//! - [`ResponseCache`]: TTL-bound response cache
//! - [`Dispatcher`]: the per-request pipeline tying them together
//!
//! # Architecture
//!
//! ```text
//! (route, params) ──► Dispatcher ──► [ResponseCache lookup]
//!                         │                  miss
//!                         ▼
//!                  ModuleCache.get ──► compile-on-miss (single-flight)
//!                         │
//!                         ▼
//!                  InstanceRunner.run ──► fresh Store + WASI + _start
//!                         │
//!                         ▼
//!                  stdout bytes ──► [ResponseCache insert] ──► response
//! ```

pub mod dispatcher;
pub mod engine;
pub mod invoke;
pub mod metrics;
pub mod module;
pub mod module_cache;
pub mod payload;
pub mod response_cache;
pub mod route;

pub use dispatcher::{fingerprint, Dispatcher};
pub use engine::WasmEngine;
pub use invoke::{ExitStatus, InstanceRunner, InvocationConfig, InvokeOutcome};
pub use metrics::{Metrics, MetricsSnapshot, ModuleCacheStats, ResponseCacheStats};
pub use module::CompiledModule;
pub use module_cache::ModuleCache;
pub use payload::RequestPayload;
pub use response_cache::ResponseCache;
pub use route::{Mount, Route, RouteTable};
