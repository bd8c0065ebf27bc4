//! Connection layer: backend handle, key building, operation counters.

use super::{Category, CoordinationBackend, Keyspace, MetricsSnapshot, OpMetrics};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Owns the backend handle and key space for one coordination deployment.
///
/// Every raw read/write from the services flows through here so operation
/// counters stay accurate; messaging primitives reach the backend through
/// [`Connection::backend`] directly.
pub struct Connection {
    backend: Arc<dyn CoordinationBackend>,
    keyspace: Keyspace,
    metrics: OpMetrics,
}

impl Connection {
    /// Creates a connection over a backend with keys rooted at `namespace`.
    #[must_use]
    pub fn new(backend: Arc<dyn CoordinationBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            keyspace: Keyspace::new(namespace),
            metrics: OpMetrics::new(),
        }
    }

    /// Returns the key space.
    #[must_use]
    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// Returns the raw backend handle.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn CoordinationBackend> {
        &self.backend
    }

    /// Builds a fully qualified key.
    #[must_use]
    pub fn key(&self, category: Category, logical: &str) -> String {
        self.keyspace.key(category, logical)
    }

    /// Reads a raw value, tracking hit/miss/error counters.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match self.backend.get(key) {
            Ok(value) => {
                self.metrics.record_get(value.is_some());
                metrics::counter!("concord_backend_get_total").increment(1);
                Ok(value)
            },
            Err(e) => {
                self.metrics.record_error();
                metrics::counter!("concord_backend_error_total").increment(1);
                Err(e)
            },
        }
    }

    /// Writes a raw value with an optional TTL.
    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let result = self.backend.set(key, value, ttl);
        self.record_write(result.is_err());
        result
    }

    /// Writes a raw value only if absent.
    pub fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let result = self.backend.set_if_absent(key, value, ttl);
        self.record_write(result.is_err());
        result
    }

    /// Deletes a key.
    pub fn delete(&self, key: &str) -> Result<bool> {
        match self.backend.delete(key) {
            Ok(existed) => {
                self.metrics.record_delete();
                Ok(existed)
            },
            Err(e) => {
                self.metrics.record_error();
                Err(e)
            },
        }
    }

    /// Conditionally replaces or removes a value.
    pub fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        replacement: Option<&str>,
    ) -> Result<bool> {
        let result = self.backend.compare_and_swap(key, expected, replacement);
        self.record_write(result.is_err());
        result
    }

    /// Fetches one page of keys matching a pattern.
    pub fn scan(&self, pattern: &str, cursor: &str, count: usize) -> Result<(String, Vec<String>)> {
        match self.backend.scan(pattern, cursor, count) {
            Ok(page) => {
                self.metrics.record_scan();
                Ok(page)
            },
            Err(e) => {
                self.metrics.record_error();
                Err(e)
            },
        }
    }

    /// Reports backend reachability.
    pub fn ping(&self) -> Result<bool> {
        self.backend.ping()
    }

    /// Releases backend resources.
    pub fn close(&self) -> Result<()> {
        self.backend.close()
    }

    /// Returns a snapshot of the operation counters.
    #[must_use]
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resets the operation counters.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn record_write(&self, errored: bool) {
        if errored {
            self.metrics.record_error();
            metrics::counter!("concord_backend_error_total").increment(1);
        } else {
            self.metrics.record_set();
            metrics::counter!("concord_backend_set_total").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    fn connection() -> Connection {
        Connection::new(Arc::new(InMemoryBackend::new()), "test")
    }

    #[test]
    fn test_metrics_track_operations() {
        let conn = connection();
        let key = conn.key(Category::WorkingMemory, "a:k");
        conn.set(&key, "v", None).unwrap();
        assert_eq!(conn.get(&key).unwrap(), Some("v".to_string()));
        assert_eq!(conn.get("test:wm:missing").unwrap(), None);
        conn.delete(&key).unwrap();

        let snap = conn.get_metrics();
        assert_eq!(snap.sets, 1);
        assert_eq!(snap.gets, 2);
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.deletes, 1);

        conn.reset_metrics();
        assert_eq!(conn.get_metrics().gets, 0);
    }

    #[test]
    fn test_ping_and_close() {
        let conn = connection();
        assert!(conn.ping().unwrap());
        conn.close().unwrap();
        assert!(!conn.ping().unwrap());
    }
}
