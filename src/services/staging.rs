//! Pattern staging and promotion.
//!
//! State machine: `staged -> {promoted, rejected}`, both terminal. A pattern
//! never re-enters the staging set; rejected patterns keep an audit record
//! under a separate key prefix so staged listings never see them.

use crate::backend::{Category, Connection};
use crate::cache::LocalCache;
use crate::models::{AccessKind, AgentCredentials, PatternStatus, StagedPattern};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Service for the staged-pattern lifecycle.
pub struct StagingService {
    conn: Arc<Connection>,
    cache: Arc<LocalCache>,
}

impl StagingService {
    /// Creates the service.
    #[must_use]
    pub fn new(conn: Arc<Connection>, cache: Arc<LocalCache>) -> Self {
        Self { conn, cache }
    }

    fn pattern_key(&self, pattern_id: &str) -> String {
        self.conn.key(Category::StagedPattern, pattern_id)
    }

    /// Stages a candidate pattern.
    ///
    /// Returns `false` when a pattern with the same id is already staged,
    /// the id is empty, or the write fails.
    #[instrument(skip(self, content, credentials), fields(agent = %credentials.agent_id))]
    pub fn stage_pattern(
        &self,
        pattern_id: &str,
        content: Value,
        confidence: f64,
        credentials: &AgentCredentials,
    ) -> bool {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(pattern_id, error = %e, "stage refused");
            return false;
        }
        if pattern_id.trim().is_empty() {
            tracing::warn!("stage refused: empty pattern id");
            return false;
        }
        if !(0.0..=1.0).contains(&confidence) {
            tracing::warn!(pattern_id, confidence, "stage refused: confidence out of range");
            return false;
        }

        let pattern = StagedPattern::new(pattern_id, content, confidence, &credentials.agent_id);
        let raw = match serde_json::to_string(&pattern) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(pattern_id, error = %e, "stage serialization failed");
                return false;
            },
        };

        match self.conn.set_if_absent(&self.pattern_key(pattern_id), &raw, None) {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(pattern_id, "stage refused: id already staged");
                false
            },
            Err(e) => {
                tracing::warn!(pattern_id, error = %e, "stage write failed");
                false
            },
        }
    }

    /// Reads a staged pattern, through the local cache.
    pub fn get_staged_pattern(
        &self,
        pattern_id: &str,
        credentials: &AgentCredentials,
    ) -> Option<StagedPattern> {
        if let Err(e) = credentials.authorize(AccessKind::Read) {
            tracing::warn!(pattern_id, error = %e, "read refused");
            return None;
        }

        let key = self.pattern_key(pattern_id);
        if let Some(cached) = self.cache.get(&key) {
            return match serde_json::from_value(cached) {
                Ok(pattern) => Some(pattern),
                Err(_) => {
                    // Cached garbage; fall through to the backend.
                    self.cache.invalidate(&key);
                    self.read_and_cache(&key)
                },
            };
        }
        self.read_and_cache(&key)
    }

    fn read_and_cache(&self, key: &str) -> Option<StagedPattern> {
        let raw = match self.conn.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "pattern read failed");
                return None;
            },
        };
        match serde_json::from_str::<StagedPattern>(&raw) {
            Ok(pattern) => {
                if let Ok(value) = serde_json::to_value(&pattern) {
                    self.cache.insert(key, value);
                }
                Some(pattern)
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "skipping malformed staged pattern");
                None
            },
        }
    }

    /// Lists every staged pattern. Malformed entries are skipped and logged.
    pub fn list_staged_patterns(&self, credentials: &AgentCredentials) -> Vec<StagedPattern> {
        let mut patterns = Vec::new();
        let mut cursor = "0".to_string();
        loop {
            let (page, next) = self.list_staged_patterns_paginated(&cursor, 100, credentials);
            patterns.extend(page);
            if next == "0" {
                break;
            }
            cursor = next;
        }
        patterns
    }

    /// Lists one page of staged patterns.
    ///
    /// Returns the page and a continuation cursor; `"0"` means exhausted and
    /// callers must follow cursors until they observe it.
    pub fn list_staged_patterns_paginated(
        &self,
        cursor: &str,
        count: usize,
        credentials: &AgentCredentials,
    ) -> (Vec<StagedPattern>, String) {
        if let Err(e) = credentials.authorize(AccessKind::Read) {
            tracing::warn!(error = %e, "list refused");
            return (Vec::new(), "0".to_string());
        }

        let pattern = self.conn.keyspace().pattern(Category::StagedPattern, "*");
        let (next, keys) = match self.conn.scan(&pattern, cursor, count) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(error = %e, "list scan failed");
                return (Vec::new(), "0".to_string());
            },
        };

        let mut patterns = Vec::new();
        for key in keys {
            match self.conn.get(&key) {
                Ok(Some(raw)) => match serde_json::from_str(&raw) {
                    Ok(parsed) => patterns.push(parsed),
                    Err(e) => {
                        tracing::warn!(key, error = %e, "skipping malformed staged pattern");
                    },
                },
                Ok(None) => {},
                Err(e) => tracing::warn!(key, error = %e, "list read failed"),
            }
        }
        (patterns, next)
    }

    /// Removes a pattern from the staging set and returns it.
    ///
    /// The caller owns adding it to a permanent library. Requires
    /// coordinator tier.
    #[instrument(skip(self, credentials), fields(agent = %credentials.agent_id))]
    pub fn promote_pattern(
        &self,
        pattern_id: &str,
        credentials: &AgentCredentials,
    ) -> Option<StagedPattern> {
        if let Err(e) = credentials.authorize(AccessKind::Administer) {
            tracing::warn!(pattern_id, error = %e, "promote refused");
            return None;
        }

        let key = self.pattern_key(pattern_id);
        let mut pattern = self.read_and_cache(&key)?;
        if let Err(e) = self.conn.delete(&key) {
            tracing::warn!(pattern_id, error = %e, "promote delete failed");
            return None;
        }
        self.cache.invalidate(&key);
        pattern.status = PatternStatus::Promoted;
        Some(pattern)
    }

    /// Rejects a staged pattern, recording the reason.
    ///
    /// Returns `false` for an unknown id. Requires coordinator tier.
    #[instrument(skip(self, credentials), fields(agent = %credentials.agent_id))]
    pub fn reject_pattern(
        &self,
        pattern_id: &str,
        credentials: &AgentCredentials,
        reason: &str,
    ) -> bool {
        if let Err(e) = credentials.authorize(AccessKind::Administer) {
            tracing::warn!(pattern_id, error = %e, "reject refused");
            return false;
        }

        let key = self.pattern_key(pattern_id);
        let Some(mut pattern) = self.read_and_cache(&key) else {
            return false;
        };

        pattern.status = PatternStatus::Rejected;
        pattern.reason = Some(reason.to_string());

        if let Ok(raw) = serde_json::to_string(&pattern) {
            let audit_key = self.conn.key(Category::RejectedPattern, pattern_id);
            if let Err(e) = self.conn.set(&audit_key, &raw, None) {
                tracing::warn!(pattern_id, error = %e, "reject audit write failed");
            }
        }

        match self.conn.delete(&key) {
            Ok(_) => {
                self.cache.invalidate(&key);
                true
            },
            Err(e) => {
                tracing::warn!(pattern_id, error = %e, "reject delete failed");
                false
            },
        }
    }
}
