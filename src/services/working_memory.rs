//! Working memory: per-agent stash/retrieve with TTL tiers.

use crate::backend::{Category, Connection};
use crate::config::TtlSettings;
use crate::models::{AccessKind, AgentCredentials, TtlTier, WorkingMemoryEntry};
use crate::security::PayloadSanitizer;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Service for exchanging working results between agents.
///
/// Payloads pass through the sanitizer on the way in unless the caller
/// explicitly skips it. Backend failures surface as `false`/`None`, never as
/// errors that abort the caller's larger operation.
pub struct WorkingMemoryService {
    conn: Arc<Connection>,
    sanitizer: Arc<dyn PayloadSanitizer>,
    ttl: TtlSettings,
}

impl WorkingMemoryService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        conn: Arc<Connection>,
        sanitizer: Arc<dyn PayloadSanitizer>,
        ttl: TtlSettings,
    ) -> Self {
        Self {
            conn,
            sanitizer,
            ttl,
        }
    }

    fn entry_key(&self, agent_id: &str, key: &str) -> String {
        self.conn
            .key(Category::WorkingMemory, &format!("{agent_id}:{key}"))
    }

    /// Stashes a payload under the calling agent's namespace.
    ///
    /// Returns `true` on success. Sanitization runs first unless
    /// `skip_sanitization` is set.
    #[instrument(skip(self, data, credentials), fields(agent = %credentials.agent_id))]
    pub fn stash(
        &self,
        key: &str,
        data: &Value,
        credentials: &AgentCredentials,
        ttl: TtlTier,
        skip_sanitization: bool,
    ) -> bool {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(key, error = %e, "stash refused");
            return false;
        }

        let (payload, sanitized) = if skip_sanitization {
            (data.clone(), false)
        } else {
            let (clean, report) = self.sanitizer.sanitize(data);
            if report.modified {
                tracing::info!(key, redactions = ?report.redactions, "payload sanitized");
            }
            (clean, report.modified)
        };

        let entry = WorkingMemoryEntry {
            key: key.to_string(),
            payload,
            agent_id: credentials.agent_id.clone(),
            ttl_tier: ttl,
            stored_at: crate::current_timestamp_ms(),
            sanitized,
        };

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "stash serialization failed");
                return false;
            },
        };

        let full_key = self.entry_key(&credentials.agent_id, key);
        match self.conn.set(&full_key, &raw, self.ttl.resolve(ttl)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "stash write failed");
                false
            },
        }
    }

    /// Retrieves a stashed payload.
    ///
    /// Reads the caller's own namespace unless `agent_id` names another
    /// agent. Returns `None` when the key is absent, expired, or unreadable.
    ///
    /// The read goes straight to the backend: working-memory entries expire
    /// under their TTL tier and a cached copy could outlive that.
    #[instrument(skip(self, credentials), fields(agent = %credentials.agent_id))]
    pub fn retrieve(
        &self,
        key: &str,
        credentials: &AgentCredentials,
        agent_id: Option<&str>,
    ) -> Option<Value> {
        if let Err(e) = credentials.authorize(AccessKind::Read) {
            tracing::warn!(key, error = %e, "retrieve refused");
            return None;
        }

        let owner = agent_id.unwrap_or(&credentials.agent_id);
        let full_key = self.entry_key(owner, key);
        let raw = match self.conn.get(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "retrieve read failed");
                return None;
            },
        };

        match serde_json::from_str::<WorkingMemoryEntry>(&raw) {
            Ok(entry) => Some(entry.payload),
            Err(e) => {
                tracing::warn!(key, error = %e, "skipping malformed working-memory entry");
                None
            },
        }
    }

    /// Deletes every entry under the calling agent's namespace.
    ///
    /// Returns the number of entries removed.
    pub fn clear_working_memory(&self, credentials: &AgentCredentials) -> usize {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(error = %e, "clear refused");
            return 0;
        }

        let pattern = self
            .conn
            .keyspace()
            .pattern(Category::WorkingMemory, &format!("{}:*", credentials.agent_id));

        // Deleting while iterating would shift the scan cursor past
        // surviving keys, so collect the full match set first.
        let mut matched = Vec::new();
        let mut cursor = "0".to_string();
        loop {
            let (next, keys) = match self.conn.scan(&pattern, &cursor, 100) {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(error = %e, "clear scan failed");
                    break;
                },
            };
            matched.extend(keys);
            if next == "0" {
                break;
            }
            cursor = next;
        }

        let mut removed = 0;
        for key in matched {
            match self.conn.delete(&key) {
                Ok(true) => removed += 1,
                Ok(false) => {},
                Err(e) => tracing::warn!(key, error = %e, "clear delete failed"),
            }
        }
        removed
    }
}
