//! Routes and the route table.
//!
//! A [`Route`] binds an HTTP path to an instrument and its sandbox
//! settings. Routes are immutable for the lifetime of a configuration
//! generation; a reload builds a whole new table and swaps it in with
//! [`RouteTable::replace`], so in-flight requests keep the routes they
//! resolved.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use conductor_common::config_file::{MountEntry, RouteEntry};

/// A single filesystem mount granted to an instrument.
///
/// The host directory is the instrument's entire filesystem surface,
/// exposed read/write at the guest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Guest mount point, e.g. "/data".
    pub guest_path: String,

    /// Host directory backing the mount.
    pub host_path: PathBuf,
}

impl From<&MountEntry> for Mount {
    fn from(entry: &MountEntry) -> Self {
        Self {
            guest_path: entry.guest_path.clone(),
            host_path: PathBuf::from(&entry.host_path),
        }
    }
}

/// A route binding an HTTP path to an instrument.
#[derive(Debug, Clone)]
pub struct Route {
    /// The HTTP path this route answers, e.g. "/fibonacci".
    pub path: String,

    /// Host path of the compiled module; also the module cache key.
    pub module_path: PathBuf,

    /// Whether responses may be stored in the response cache.
    pub cacheable: bool,

    /// Response TTL. Zero means the global default applies.
    pub ttl: Duration,

    /// Optional filesystem mount. Absent means no filesystem surface.
    pub mount: Option<Mount>,
}

impl Route {
    /// Build a route from its configuration entry.
    pub fn from_entry(path: impl Into<String>, entry: &RouteEntry) -> Self {
        Self {
            path: path.into(),
            module_path: PathBuf::from(&entry.wasm_file),
            cacheable: entry.cache,
            ttl: Duration::from_secs(entry.ttl),
            mount: entry.mount.as_ref().map(Mount::from),
        }
    }

    /// Effective TTL for this route given the global default.
    ///
    /// A route TTL of zero falls back to the default; both zero means
    /// responses are never cached.
    pub fn effective_ttl(&self, default_ttl: Duration) -> Duration {
        if self.ttl > Duration::ZERO {
            self.ttl
        } else {
            default_ttl
        }
    }
}

/// Read-mostly table mapping HTTP paths to routes.
///
/// Lookups clone an `Arc` under a read lock; [`replace`](Self::replace)
/// swaps the whole map in one pointer store and never mutates in place,
/// so a request that resolved a route before a reload keeps using it.
pub struct RouteTable {
    inner: RwLock<Arc<HashMap<String, Arc<Route>>>>,
}

impl RouteTable {
    /// Build a table from an iterator of routes.
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        Self {
            inner: RwLock::new(Arc::new(Self::index(routes))),
        }
    }

    /// Resolve a path to its route, if configured.
    pub fn resolve(&self, path: &str) -> Option<Arc<Route>> {
        self.inner.read().get(path).cloned()
    }

    /// Atomically replace the whole table.
    pub fn replace(&self, routes: impl IntoIterator<Item = Route>) {
        *self.inner.write() = Arc::new(Self::index(routes));
    }

    /// Number of configured routes.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if no routes are configured.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Snapshot of all configured paths.
    pub fn paths(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    fn index(routes: impl IntoIterator<Item = Route>) -> HashMap<String, Arc<Route>> {
        routes
            .into_iter()
            .map(|route| (route.path.clone(), Arc::new(route)))
            .collect()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_route(path: &str) -> Route {
        Route {
            path: path.into(),
            module_path: PathBuf::from("./instruments/sample.wasm"),
            cacheable: true,
            ttl: Duration::from_secs(600),
            mount: None,
        }
    }

    #[test]
    fn test_route_from_entry() {
        let entry = RouteEntry {
            wasm_file: "./instruments/fibonacci.wasm".into(),
            cache: true,
            ttl: 600,
            mount: Some(MountEntry {
                guest_path: "/data".into(),
                host_path: "./data".into(),
            }),
        };

        let route = Route::from_entry("/fibonacci", &entry);

        assert_eq!(route.path, "/fibonacci");
        assert_eq!(route.module_path, PathBuf::from("./instruments/fibonacci.wasm"));
        assert!(route.cacheable);
        assert_eq!(route.ttl, Duration::from_secs(600));
        assert_eq!(route.mount.as_ref().unwrap().guest_path, "/data");
    }

    #[test]
    fn test_effective_ttl_prefers_route() {
        let route = sample_route("/a");
        assert_eq!(
            route.effective_ttl(Duration::from_secs(300)),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_effective_ttl_falls_back_to_default() {
        let mut route = sample_route("/a");
        route.ttl = Duration::ZERO;
        assert_eq!(
            route.effective_ttl(Duration::from_secs(300)),
            Duration::from_secs(300)
        );
        assert_eq!(route.effective_ttl(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_route_table_resolve() {
        let table = RouteTable::new([sample_route("/a"), sample_route("/b")]);

        assert_eq!(table.len(), 2);
        assert!(table.resolve("/a").is_some());
        assert!(table.resolve("/missing").is_none());
    }

    #[test]
    fn test_route_table_replace_is_atomic_for_holders() {
        let table = RouteTable::new([sample_route("/a")]);
        let held = table.resolve("/a").unwrap();

        table.replace([sample_route("/b")]);

        // Old route stays valid for the request that resolved it
        assert_eq!(held.path, "/a");
        assert!(table.resolve("/a").is_none());
        assert!(table.resolve("/b").is_some());
    }
}
