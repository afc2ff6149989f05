//! Compiled-module cache with single-flight compilation.
//!
//! The cache maps a module's host path to its shared [`CompiledModule`].
//! Concurrent requests for the same path coalesce into one compile; the
//! rest wait on its result. Distinct paths never serialize against each
//! other. Capacity is bounded with first-inserted eviction, and an
//! evicted handle stays alive until the last in-flight invocation drops
//! its `Arc`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use conductor_common::DispatchError;

use crate::metrics::ModuleCacheStats;
use crate::module::CompiledModule;
use crate::WasmEngine;

type ModuleCell = Arc<OnceCell<Arc<CompiledModule>>>;

/// Path-keyed cache of compiled modules.
///
/// # Concurrency
///
/// Lookups go through a sharded map and block only on the per-key
/// in-flight cell. A failed compile clears the cell so the next caller
/// retries; no negative entry is ever retained.
pub struct ModuleCache {
    engine: WasmEngine,
    entries: DashMap<String, ModuleCell>,
    /// Completed keys in insertion order; its length never exceeds capacity.
    order: Mutex<VecDeque<String>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    compiles: AtomicU64,
}

impl ModuleCache {
    /// Create a cache holding at most `capacity` compiled modules.
    pub fn new(engine: WasmEngine, capacity: usize) -> Self {
        Self {
            engine,
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            compiles: AtomicU64::new(0),
        }
    }

    /// Get the compiled module for `path`, compiling on miss.
    ///
    /// Concurrent callers for the same path run at most one compile;
    /// the others wait for its result.
    ///
    /// # Errors
    ///
    /// Returns `ModuleLoad` if the file cannot be read and `ModuleCompile`
    /// if the engine rejects the bytes. Neither outcome is cached.
    #[instrument(skip(self))]
    pub async fn get(&self, path: &str) -> Result<Arc<CompiledModule>, DispatchError> {
        if let Some(cell) = self.entries.get(path).map(|entry| entry.value().clone()) {
            if let Some(module) = cell.get() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(module.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        let cell: ModuleCell = self
            .entries
            .entry(path.to_string())
            .or_insert_with(Default::default)
            .clone();

        match cell.get_or_try_init(|| self.load_and_compile(path)).await {
            Ok(module) => Ok(module.clone()),
            Err(err) => {
                // Clear the in-flight marker so the next caller retries.
                self.entries.remove_if(path, |_, cell| cell.get().is_none());
                Err(err)
            }
        }
    }

    async fn load_and_compile(&self, path: &str) -> Result<Arc<CompiledModule>, DispatchError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DispatchError::ModuleLoad {
                path: path.to_string(),
                source,
            })?;

        self.compiles.fetch_add(1, Ordering::Relaxed);

        // Compilation is CPU-bound; keep it off the request executor.
        let engine = self.engine.clone();
        let module = tokio::task::spawn_blocking(move || {
            CompiledModule::from_bytes(engine.inner(), &bytes)
        })
        .await
        .map_err(|e| DispatchError::internal(format!("compile task failed: {e}")))??;

        let module = Arc::new(module);
        self.insert_completed(path);
        Ok(module)
    }

    /// Record a completed compile, evicting the oldest entry at capacity.
    fn insert_completed(&self, path: &str) {
        let mut order = self.order.lock();
        while order.len() >= self.capacity {
            if let Some(victim) = order.pop_front() {
                // Removes only the cache's own reference; in-flight
                // invocations keep the module alive through their Arc.
                self.entries.remove(&victim);
                debug!(module = %victim, "Evicted compiled module");
            } else {
                break;
            }
        }
        order.push_back(path.to_string());
    }

    /// Number of completed entries currently cached.
    pub fn len(&self) -> usize {
        self.order.lock().len()
    }

    /// Returns `true` if no completed entries are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ModuleCacheStats {
        ModuleCacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compiles: self.compiles.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}
