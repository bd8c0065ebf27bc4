//! Atomic validate-and-promote.
//!
//! The one operation in the system that must be indivisible: read the
//! pattern, gate on confidence, and remove it from staging as a unit. Built
//! on the backend's compare-and-swap so a concurrent promoter can never act
//! on an intermediate state; a naive read-then-write here would be a
//! correctness bug.

use crate::backend::{Category, Connection};
use crate::cache::LocalCache;
use crate::models::{AccessKind, AgentCredentials, PatternStatus, PromotionOutcome, StagedPattern};
use std::sync::Arc;
use tracing::instrument;

/// Service for atomic pattern promotion.
pub struct TransactionService {
    conn: Arc<Connection>,
    cache: Arc<LocalCache>,
    retries: u32,
}

impl TransactionService {
    /// Creates the service with a bounded CAS retry budget.
    #[must_use]
    pub fn new(conn: Arc<Connection>, cache: Arc<LocalCache>, retries: u32) -> Self {
        Self {
            conn,
            cache,
            retries,
        }
    }

    /// Atomically promotes `pattern_id` when its confidence meets
    /// `min_confidence`.
    ///
    /// On a confidence failure the pattern remains staged and comes back in
    /// the outcome with a message explaining why. On contention the
    /// read-check-swap cycle retries up to the configured budget before
    /// reporting a transient failure.
    ///
    /// The read step goes straight to the backend, never the local cache:
    /// acting on a stale cached pattern here would defeat the point. On
    /// success the cache entry for the pattern is invalidated before
    /// returning.
    #[instrument(skip(self, credentials), fields(agent = %credentials.agent_id))]
    pub fn atomic_promote_pattern(
        &self,
        pattern_id: &str,
        credentials: &AgentCredentials,
        min_confidence: f64,
    ) -> PromotionOutcome {
        if let Err(e) = credentials.authorize(AccessKind::Administer) {
            return PromotionOutcome::failure(None, e.to_string());
        }

        let key = self.conn.key(Category::StagedPattern, pattern_id);
        for attempt in 0..=self.retries {
            let raw = match self.conn.get(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    return PromotionOutcome::failure(
                        None,
                        format!("pattern '{pattern_id}' is not staged"),
                    );
                },
                Err(e) => {
                    return PromotionOutcome::failure(None, format!("backend read failed: {e}"));
                },
            };

            let mut pattern: StagedPattern = match serde_json::from_str(&raw) {
                Ok(pattern) => pattern,
                Err(e) => {
                    tracing::warn!(pattern_id, error = %e, "staged pattern is malformed");
                    return PromotionOutcome::failure(
                        None,
                        format!("pattern '{pattern_id}' is unreadable"),
                    );
                },
            };

            if pattern.confidence < min_confidence {
                return PromotionOutcome::failure(
                    Some(pattern.clone()),
                    format!(
                        "confidence {:.2} below required {:.2}; pattern remains staged",
                        pattern.confidence, min_confidence
                    ),
                );
            }

            match self.conn.compare_and_swap(&key, &raw, None) {
                Ok(true) => {
                    self.cache.invalidate(&key);
                    pattern.status = PatternStatus::Promoted;
                    return PromotionOutcome::promoted(
                        pattern,
                        format!("pattern '{pattern_id}' promoted"),
                    );
                },
                Ok(false) => {
                    // Another promoter raced us; re-read and try again.
                    tracing::debug!(pattern_id, attempt, "promotion contended, retrying");
                },
                Err(e) => {
                    return PromotionOutcome::failure(None, format!("backend swap failed: {e}"));
                },
            }
        }

        PromotionOutcome::failure(
            None,
            format!(
                "promotion of '{pattern_id}' contended past {} attempts; try again",
                self.retries + 1
            ),
        )
    }
}
