//! # Concord
//!
//! A shared, TTL-governed coordination layer for fleets of cooperating AI agents.
//!
//! Concord lets independent agents exchange working results, stage candidate
//! patterns for promotion, negotiate over conflicts, run collaboration
//! sessions, and pass messages through pub/sub channels, append-only streams,
//! timelines, and task queues — all over a pluggable key-value backend.
//!
//! ## Features
//!
//! - Namespaced key space with one prefix per entity category
//! - TTL tiers resolved by configuration, not raw durations at call sites
//! - Atomic validate-and-promote via compare-and-swap with bounded retry
//! - LRU read cache invalidated by the transaction layer
//! - In-process backend for tests; Redis backend behind the `redis` feature
//!
//! ## Example
//!
//! ```rust,ignore
//! use concord::{AgentCredentials, ConcordConfig, CoordinationHub, TtlTier};
//!
//! let hub = CoordinationHub::in_memory(&ConcordConfig::default());
//! let creds = AgentCredentials::contributor("agent-7");
//! hub.working().stash("partial-plan", &data, &creds, TtlTier::WorkingResults, false);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod backend;
pub mod cache;
pub mod config;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;

// Re-exports for convenience
pub use backend::{Connection, CoordinationBackend, InMemoryBackend, Keyspace, RedisBackend};
pub use cache::LocalCache;
pub use config::{ConcordConfig, TtlSettings};
pub use models::{
    AccessKind, AccessTier, AgentCredentials, CollaborationSession, ConflictContext,
    ConflictStatus, PatternStatus, PromotionOutcome, QueueTask, StagedPattern, StreamEntry,
    StreamId, TimelineEvent, TtlTier, WorkingMemoryEntry,
};
pub use security::{NoopSanitizer, PayloadSanitizer, RegexSanitizer, SanitizeReport};
pub use services::{
    BatchService, ConflictService, CoordinationHub, HubStats, PubSubService, QueueService,
    SessionService, StagingService, StreamService, TimelineService, TransactionService,
    WorkingMemoryService,
};

/// Error type for concord operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// Most public surfaces absorb these into boolean or optional returns; the
/// error type flows between internal layers and out of the backend trait.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A required identifier is empty (pattern id, session id, queue name)
    /// - A conflict context is created with no participants
    /// - A scan cursor cannot be parsed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Backend commands fail (connection loss, timeouts)
    /// - Persisted values fail to serialize or deserialize
    /// - The pub/sub dispatcher cannot be started or stopped
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The caller's credentials do not permit the operation.
    ///
    /// Raised when:
    /// - The agent id is empty
    /// - An observer-tier agent attempts a write
    /// - A non-coordinator attempts promotion, rejection, or conflict
    ///   resolution
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Feature not enabled (requires feature flag).
    ///
    /// Raised when the Redis backend is constructed without the `redis`
    /// Cargo feature compiled in.
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

/// Result type alias for concord operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Centralized so stream ids, timeline scores, and entry metadata all share
/// one clock source. Falls back to 0 if the system clock is before the epoch.
#[must_use]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::Unauthorized("observer tier cannot write".to_string());
        assert_eq!(err.to_string(), "unauthorized: observer tier cannot write");
    }

    #[test]
    fn test_current_timestamp_ms() {
        let ts = current_timestamp_ms();
        // 2020-01-01 in milliseconds
        assert!(ts > 1_577_836_800_000);
    }
}
