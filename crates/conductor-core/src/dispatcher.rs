//! The per-request dispatch pipeline.
//!
//! Given a resolved route and its parsed query, the dispatcher:
//!
//! 1. Computes the response-cache fingerprint from the raw query
//! 2. Short-circuits on a cache hit for cacheable routes
//! 3. Marshals the JSON payload (params + fresh seed)
//! 4. Acquires the compiled module from the module cache
//! 5. Runs a fresh instance with controlled stdio and the route's mount
//! 6. Caches successful output when the route opts in, and returns it
//!
//! The whole module phase runs under the invocation deadline; timing out
//! tears the instance down and reports `Cancelled` without touching the
//! response cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, instrument};
use uuid::Uuid;

use conductor_common::{CacheConfig, DispatchError, ExecutionConfig};

use crate::invoke::{ExitStatus, InstanceRunner, InvocationConfig};
use crate::metrics::{ModuleCacheStats, ResponseCacheStats};
use crate::module_cache::ModuleCache;
use crate::payload::RequestPayload;
use crate::response_cache::ResponseCache;
use crate::route::Route;
use crate::WasmEngine;

/// Compute the response-cache key for a request.
///
/// The raw query is used verbatim: no re-encoding, no sorting. Requests
/// that differ only in parameter order cache independently.
pub fn fingerprint(route_path: &str, raw_query: &str) -> String {
    format!("{route_path}?{raw_query}")
}

/// Orchestrates one instrument invocation per request.
pub struct Dispatcher {
    modules: Arc<ModuleCache>,
    responses: Arc<ResponseCache>,
    runner: InstanceRunner,
    default_ttl: Duration,
    timeout: Duration,
}

impl Dispatcher {
    /// Build a dispatcher with both caches sized from `cache`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache configuration is invalid or WASI
    /// registration fails.
    pub fn new(
        engine: WasmEngine,
        execution: ExecutionConfig,
        cache: &CacheConfig,
    ) -> Result<Self, DispatchError> {
        cache.validate()?;

        let timeout = execution.timeout();
        let runner = InstanceRunner::new(engine.clone(), execution)?;

        Ok(Self {
            modules: Arc::new(ModuleCache::new(engine, cache.size)),
            responses: Arc::new(ResponseCache::new(cache.size)),
            runner,
            default_ttl: cache.default_ttl(),
            timeout,
        })
    }

    /// Dispatch one request to its instrument.
    ///
    /// `params` is the parsed query (first value wins on repeats) and
    /// `raw_query` the untouched query string used for fingerprinting.
    ///
    /// # Errors
    ///
    /// Every failure on the path is surfaced: module load/compile,
    /// instantiation, non-zero exit (with its captured stdout), trap
    /// (stdout discarded), or cancellation.
    #[instrument(skip(self, params), fields(route = %route.path))]
    pub async fn dispatch(
        &self,
        route: &Route,
        params: HashMap<String, String>,
        raw_query: &str,
    ) -> Result<Bytes, DispatchError> {
        let key = fingerprint(&route.path, raw_query);

        if route.cacheable {
            if let Some(cached) = self.responses.get(&key) {
                debug!("Response served from cache");
                return Ok(cached);
            }
        }

        let payload = RequestPayload::new(params)?;
        let stdin = Bytes::from(payload.encode()?);
        let module_key = route.module_path.to_string_lossy();

        let invocation = InvocationConfig {
            stdin,
            mount: route.mount.clone(),
            request_id: Uuid::new_v4().to_string(),
        };

        let outcome = tokio::time::timeout(self.timeout, async {
            let module = self.modules.get(&module_key).await?;
            self.runner.run(&module, invocation).await
        })
        .await
        .map_err(|_| DispatchError::Cancelled)??;

        match outcome.status {
            ExitStatus::Success => {
                if route.cacheable {
                    let ttl = route.effective_ttl(self.default_ttl);
                    self.responses.set(&key, outcome.stdout.clone(), ttl);
                }
                Ok(outcome.stdout)
            }
            // Stdout written before a bad exit travels with the error for
            // diagnostics; it is never cached or served.
            ExitStatus::Exit(code) => Err(DispatchError::ModuleExit {
                code,
                stdout: outcome.stdout.to_vec(),
            }),
            ExitStatus::Trap { message } => Err(DispatchError::ModuleTrap { message }),
        }
    }

    /// Engine the dispatcher executes on.
    pub fn engine(&self) -> &WasmEngine {
        self.runner.engine()
    }

    /// Module cache counters.
    pub fn module_cache_stats(&self) -> ModuleCacheStats {
        self.modules.stats()
    }

    /// Response cache counters.
    pub fn response_cache_stats(&self) -> ResponseCacheStats {
        self.responses.stats()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("default_ttl", &self.default_ttl)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_joins_with_question_mark() {
        assert_eq!(fingerprint("/calc", "op=add&a=5&b=3"), "/calc?op=add&a=5&b=3");
    }

    #[test]
    fn test_fingerprint_empty_query() {
        assert_eq!(fingerprint("/path", ""), "/path?");
    }

    #[test]
    fn test_fingerprint_preserves_raw_bytes() {
        // Percent-encoding, order, and duplicates pass through untouched
        assert_eq!(
            fingerprint("/x", "a=%20b&a=c&z=1"),
            "/x?a=%20b&a=c&z=1"
        );
        assert_ne!(
            fingerprint("/x", "a=1&b=2"),
            fingerprint("/x", "b=2&a=1")
        );
    }
}
