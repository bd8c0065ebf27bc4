//! Batch operations over working memory.
//!
//! Batches are best-effort: each item is applied independently, a failed
//! item is logged and skipped, and the remainder proceeds. Callers learn
//! how many items succeeded, not which ones.

use crate::backend::{Category, Connection};
use crate::models::{AccessKind, AgentCredentials, TtlTier};
use crate::services::working_memory::WorkingMemoryService;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Service for bulk stash/retrieve and key discovery.
pub struct BatchService {
    working: Arc<WorkingMemoryService>,
    conn: Arc<Connection>,
}

impl BatchService {
    /// Creates the service over the working-memory write path.
    #[must_use]
    pub fn new(working: Arc<WorkingMemoryService>, conn: Arc<Connection>) -> Self {
        Self { working, conn }
    }

    /// Stashes every entry under one TTL tier, returning how many stuck.
    pub fn stash_batch(
        &self,
        entries: &[(String, Value)],
        credentials: &AgentCredentials,
        ttl: TtlTier,
    ) -> usize {
        entries
            .iter()
            .filter(|(key, value)| self.working.stash(key, value, credentials, ttl, false))
            .count()
    }

    /// Retrieves the caller's entries for `keys`, omitting absent ones.
    pub fn retrieve_batch(
        &self,
        keys: &[String],
        credentials: &AgentCredentials,
    ) -> HashMap<String, Value> {
        keys.iter()
            .filter_map(|key| {
                self.working
                    .retrieve(key, credentials, None)
                    .map(|value| (key.clone(), value))
            })
            .collect()
    }

    /// Pages through the caller's working-memory keys matching a glob
    /// pattern. Returns logical keys and the cursor for the next page; a
    /// returned cursor of `"0"` means the scan is complete.
    pub fn scan_keys(
        &self,
        pattern: &str,
        cursor: &str,
        count: usize,
        credentials: &AgentCredentials,
    ) -> (Vec<String>, String) {
        if let Err(e) = credentials.authorize(AccessKind::Read) {
            tracing::warn!(error = %e, "scan refused");
            return (Vec::new(), "0".to_string());
        }

        let full_pattern = self.conn.keyspace().pattern(
            Category::WorkingMemory,
            &format!("{}:{pattern}", credentials.agent_id),
        );
        let (next, keys) = match self.conn.scan(&full_pattern, cursor, count) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(error = %e, "scan failed");
                return (Vec::new(), "0".to_string());
            },
        };

        let prefix = format!("{}:", credentials.agent_id);
        let logical = keys
            .iter()
            .filter_map(|full| {
                self.conn
                    .keyspace()
                    .logical_key(Category::WorkingMemory, full)
            })
            .filter_map(|entry| entry.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        (logical, next)
    }
}
