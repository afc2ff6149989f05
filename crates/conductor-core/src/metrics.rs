//! Shared dispatch metrics.
//!
//! Counters live on atomics and a sharded map so the request path never
//! takes a global lock. [`Metrics::snapshot`] produces a serializable
//! view for the stats endpoint; cache hit/miss counters are owned by the
//! caches themselves and reported through [`ModuleCacheStats`] and
//! [`ResponseCacheStats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// Request counters for the whole server.
pub struct Metrics {
    started_at: Instant,
    total_requests: AtomicU64,
    success_requests: AtomicU64,
    error_requests: AtomicU64,
    total_response_micros: AtomicU64,
    route_requests: DashMap<String, u64>,
}

impl Metrics {
    /// Create a fresh metrics registry.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            success_requests: AtomicU64::new(0),
            error_requests: AtomicU64::new(0),
            total_response_micros: AtomicU64::new(0),
            route_requests: DashMap::new(),
        }
    }

    /// Record one finished request.
    pub fn record_request(&self, route: &str, success: bool, elapsed: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_response_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        *self.route_requests.entry(route.to_string()).or_insert(0) += 1;
    }

    /// Serializable snapshot of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let total_micros = self.total_response_micros.load(Ordering::Relaxed);
        let average_response_ms = if total > 0 {
            (total_micros as f64 / total as f64) / 1000.0
        } else {
            0.0
        };

        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            total_requests: total,
            success_requests: self.success_requests.load(Ordering::Relaxed),
            error_requests: self.error_requests.load(Ordering::Relaxed),
            average_response_ms,
            route_requests: self
                .route_requests
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field(
                "total_requests",
                &self.total_requests.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of [`Metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Total requests handled.
    pub total_requests: u64,
    /// Requests that produced a response body.
    pub success_requests: u64,
    /// Requests that failed (including unknown routes).
    pub error_requests: u64,
    /// Mean response time in milliseconds.
    pub average_response_ms: f64,
    /// Requests per route path.
    pub route_requests: std::collections::BTreeMap<String, u64>,
}

/// Counters reported by the module cache.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModuleCacheStats {
    /// Completed entries currently cached.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to wait for a compile.
    pub misses: u64,
    /// Compiles actually run (single-flight collapses concurrent misses).
    pub compiles: u64,
}

/// Counters reported by the response cache.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResponseCacheStats {
    /// Live entries currently cached.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed or found an expired entry.
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let metrics = Metrics::new();

        metrics.record_request("/a", true, Duration::from_millis(10));
        metrics.record_request("/a", true, Duration::from_millis(30));
        metrics.record_request("/b", false, Duration::from_millis(20));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.success_requests, 2);
        assert_eq!(snap.error_requests, 1);
        assert_eq!(snap.route_requests["/a"], 2);
        assert_eq!(snap.route_requests["/b"], 1);
        assert!((snap.average_response_ms - 20.0).abs() < 1.0);
    }

    #[test]
    fn test_empty_snapshot() {
        let metrics = Metrics::new();
        let snap = metrics.snapshot();

        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.average_response_ms, 0.0);
        assert!(snap.route_requests.is_empty());
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = Metrics::new();
        metrics.record_request("/a", true, Duration::from_millis(5));

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["route_requests"]["/a"], 1);
    }
}
