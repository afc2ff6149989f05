//! Shared application state.
//!
//! [`AppState`] holds the resources shared across all HTTP request
//! handlers: the dispatcher, the route table, and the request metrics.

use std::sync::Arc;

use conductor_common::{ConfigFile, DispatchError};
use conductor_core::{Dispatcher, Metrics, Route, RouteTable, WasmEngine};

/// Shared state across all request handlers.
///
/// Cloned per request; all fields are `Arc`-shared.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    routes: Arc<RouteTable>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Build state from a loaded configuration.
    ///
    /// Modules are not compiled eagerly; each compiles on its first
    /// request and stays cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine or dispatcher cannot be created.
    pub fn from_config(config: &ConfigFile) -> Result<Self, DispatchError> {
        let engine = WasmEngine::new(&config.runtime.engine)?;
        let dispatcher = Dispatcher::new(
            engine,
            config.runtime.execution.clone(),
            &config.cache,
        )?;

        let routes = config
            .routes
            .iter()
            .map(|(path, entry)| Route::from_entry(path.clone(), entry));

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            routes: Arc::new(RouteTable::new(routes)),
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Get the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Get the route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Get the request metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get the Wasm engine.
    pub fn engine(&self) -> &WasmEngine {
        self.dispatcher.engine()
    }

    /// Swap in a freshly loaded route table.
    ///
    /// In-flight requests keep the routes they already resolved.
    pub fn reload_routes(&self, config: &ConfigFile) {
        self.routes.replace(
            config
                .routes
                .iter()
                .map(|(path, entry)| Route::from_entry(path.clone(), entry)),
        );
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}
