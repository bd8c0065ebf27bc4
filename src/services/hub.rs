//! Central entry point wiring every service to one backend connection.

use crate::backend::{Connection, CoordinationBackend, InMemoryBackend, MetricsSnapshot};
use crate::cache::{CacheStats, LocalCache};
use crate::config::ConcordConfig;
use crate::security::{PayloadSanitizer, RegexSanitizer};
use crate::services::{
    BatchService, ConflictService, PubSubService, QueueService, SessionService, StagingService,
    StreamService, TimelineService, TransactionService, WorkingMemoryService,
};
use serde::Serialize;
use std::sync::Arc;

/// Aggregated health and usage figures for one hub.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    /// Whether the backend answered the last ping.
    pub backend_reachable: bool,
    /// Backend operation counters since the last reset.
    pub metrics: MetricsSnapshot,
    /// Local read-cache statistics.
    pub cache: CacheStats,
}

/// Facade over the coordination services.
///
/// One hub owns one backend connection and one local cache; every service
/// it exposes shares both. Construct with [`CoordinationHub::in_memory`]
/// for tests and single-process use, or [`CoordinationHub::connect`] to
/// select the backend from configuration.
pub struct CoordinationHub {
    conn: Arc<Connection>,
    cache: Arc<LocalCache>,
    working: Arc<WorkingMemoryService>,
    staging: Arc<StagingService>,
    transactions: Arc<TransactionService>,
    conflicts: Arc<ConflictService>,
    sessions: Arc<SessionService>,
    pubsub: Arc<PubSubService>,
    streams: Arc<StreamService>,
    timelines: Arc<TimelineService>,
    queues: Arc<QueueService>,
    batch: Arc<BatchService>,
}

impl CoordinationHub {
    /// Builds a hub over an explicit backend and sanitizer.
    #[must_use]
    pub fn new(
        config: &ConcordConfig,
        backend: Arc<dyn CoordinationBackend>,
        sanitizer: Arc<dyn PayloadSanitizer>,
    ) -> Self {
        let conn = Arc::new(Connection::new(backend, config.namespace.clone()));
        let cache = Arc::new(LocalCache::new(config.cache_capacity));

        let working = Arc::new(WorkingMemoryService::new(
            Arc::clone(&conn),
            sanitizer,
            config.ttl.clone(),
        ));
        let staging = Arc::new(StagingService::new(Arc::clone(&conn), Arc::clone(&cache)));
        let transactions = Arc::new(TransactionService::new(
            Arc::clone(&conn),
            Arc::clone(&cache),
            config.cas_retries,
        ));
        let conflicts = Arc::new(ConflictService::new(Arc::clone(&conn), Arc::clone(&cache)));
        let sessions = Arc::new(SessionService::new(Arc::clone(&conn), Arc::clone(&cache)));
        let pubsub = Arc::new(PubSubService::new(Arc::clone(&conn), config.poll_interval));
        let streams = Arc::new(StreamService::new(Arc::clone(&conn), config.stream_max_len));
        let timelines = Arc::new(TimelineService::new(Arc::clone(&conn)));
        let queues = Arc::new(QueueService::new(Arc::clone(&conn)));
        let batch = Arc::new(BatchService::new(Arc::clone(&working), Arc::clone(&conn)));

        Self {
            conn,
            cache,
            working,
            staging,
            transactions,
            conflicts,
            sessions,
            pubsub,
            streams,
            timelines,
            queues,
            batch,
        }
    }

    /// Builds a hub over the in-process backend with the standard
    /// credential-scrubbing sanitizer.
    #[must_use]
    pub fn in_memory(config: &ConcordConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryBackend::new()),
            Arc::new(RegexSanitizer::new()),
        )
    }

    /// Builds a hub from configuration: a `backend_url` selects the Redis
    /// backend, its absence the in-process one.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend URL is set but the connection
    /// cannot be established, or the `redis` feature is disabled.
    pub fn connect(config: &ConcordConfig) -> crate::Result<Self> {
        match &config.backend_url {
            Some(url) => {
                let backend = crate::backend::RedisBackend::new(url)?;
                Ok(Self::new(
                    config,
                    Arc::new(backend),
                    Arc::new(RegexSanitizer::new()),
                ))
            },
            None => Ok(Self::in_memory(config)),
        }
    }

    /// Working-memory stash/retrieve operations.
    #[must_use]
    pub fn working(&self) -> &Arc<WorkingMemoryService> {
        &self.working
    }

    /// Staged-pattern lifecycle operations.
    #[must_use]
    pub fn staging(&self) -> &Arc<StagingService> {
        &self.staging
    }

    /// Atomic promotion with confidence gating.
    #[must_use]
    pub fn transactions(&self) -> &Arc<TransactionService> {
        &self.transactions
    }

    /// Conflict negotiation operations.
    #[must_use]
    pub fn conflicts(&self) -> &Arc<ConflictService> {
        &self.conflicts
    }

    /// Collaboration session operations.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionService> {
        &self.sessions
    }

    /// Channel publish/subscribe operations.
    #[must_use]
    pub fn pubsub(&self) -> &Arc<PubSubService> {
        &self.pubsub
    }

    /// Append-only stream operations.
    #[must_use]
    pub fn streams(&self) -> &Arc<StreamService> {
        &self.streams
    }

    /// Timeline operations.
    #[must_use]
    pub fn timelines(&self) -> &Arc<TimelineService> {
        &self.timelines
    }

    /// Task queue operations.
    #[must_use]
    pub fn queues(&self) -> &Arc<QueueService> {
        &self.queues
    }

    /// Batch stash/retrieve/scan operations.
    #[must_use]
    pub fn batch(&self) -> &Arc<BatchService> {
        &self.batch
    }

    /// Reports backend reachability.
    pub fn ping(&self) -> bool {
        self.conn.ping().unwrap_or(false)
    }

    /// Snapshot of health, backend counters, and cache statistics.
    #[must_use]
    pub fn get_stats(&self) -> HubStats {
        HubStats {
            backend_reachable: self.ping(),
            metrics: self.conn.get_metrics(),
            cache: self.cache.stats(),
        }
    }

    /// Returns the backend operation counters.
    #[must_use]
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.conn.get_metrics()
    }

    /// Resets the backend operation counters.
    pub fn reset_metrics(&self) {
        self.conn.reset_metrics();
    }

    /// Shuts down the pub/sub dispatcher and releases the backend.
    pub fn close(&self) {
        self.pubsub.close();
        if let Err(e) = self.conn.close() {
            tracing::warn!(error = %e, "backend close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_reflect_usage() {
        let hub = CoordinationHub::in_memory(&ConcordConfig::default());
        let creds = crate::models::AgentCredentials::contributor("agent-1");
        hub.working().stash(
            "k",
            &serde_json::json!({"v": 1}),
            &creds,
            crate::models::TtlTier::Durable,
            true,
        );

        let stats = hub.get_stats();
        assert!(stats.backend_reachable);
        assert_eq!(stats.metrics.sets, 1);

        hub.reset_metrics();
        assert_eq!(hub.get_metrics().sets, 0);
    }

    #[test]
    fn test_close_is_terminal() {
        let hub = CoordinationHub::in_memory(&ConcordConfig::default());
        assert!(hub.ping());
        hub.close();
        assert!(!hub.ping());
    }
}
