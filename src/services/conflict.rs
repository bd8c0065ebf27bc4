//! Conflict negotiation contexts.

use crate::backend::{Category, Connection};
use crate::cache::LocalCache;
use crate::models::{AccessKind, AgentCredentials, ConflictContext, ConflictStatus};
use std::sync::Arc;
use tracing::instrument;

/// Resolve contention budget; a conflict resolved under our feet reads as
/// already-resolved rather than retrying forever.
const RESOLVE_RETRIES: u32 = 3;

/// Service for multi-agent disagreement contexts.
pub struct ConflictService {
    conn: Arc<Connection>,
    cache: Arc<LocalCache>,
}

impl ConflictService {
    /// Creates the service.
    #[must_use]
    pub fn new(conn: Arc<Connection>, cache: Arc<LocalCache>) -> Self {
        Self { conn, cache }
    }

    fn conflict_key(&self, conflict_id: &str) -> String {
        self.conn.key(Category::Conflict, conflict_id)
    }

    /// Creates a conflict context between the named agents.
    ///
    /// Returns `false` when `agents` is empty or the id already exists.
    #[instrument(skip(self, credentials), fields(agent = %credentials.agent_id))]
    pub fn create_conflict_context(
        &self,
        conflict_id: &str,
        agents: &[String],
        credentials: &AgentCredentials,
        topic: &str,
    ) -> bool {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(conflict_id, error = %e, "create refused");
            return false;
        }
        if agents.is_empty() {
            tracing::warn!(conflict_id, "create refused: no participants");
            return false;
        }

        let context = ConflictContext {
            conflict_id: conflict_id.to_string(),
            participants: agents.iter().cloned().collect(),
            topic: topic.to_string(),
            status: ConflictStatus::Active,
            resolution: None,
            created_at: crate::current_timestamp_ms(),
            resolved_at: None,
        };
        let raw = match serde_json::to_string(&context) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(conflict_id, error = %e, "create serialization failed");
                return false;
            },
        };

        match self
            .conn
            .set_if_absent(&self.conflict_key(conflict_id), &raw, None)
        {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(conflict_id, error = %e, "create write failed");
                false
            },
        }
    }

    /// Reads a conflict context by id, resolved or not.
    pub fn get_conflict_context(
        &self,
        conflict_id: &str,
        credentials: &AgentCredentials,
    ) -> Option<ConflictContext> {
        if credentials.authorize(AccessKind::Read).is_err() {
            return None;
        }
        let key = self.conflict_key(conflict_id);
        if let Some(cached) = self.cache.get(&key) {
            if let Ok(context) = serde_json::from_value(cached) {
                return Some(context);
            }
            self.cache.invalidate(&key);
        }
        self.read_and_cache(&key)
    }

    fn read_and_cache(&self, key: &str) -> Option<ConflictContext> {
        let raw = match self.conn.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "conflict read failed");
                return None;
            },
        };
        match serde_json::from_str::<ConflictContext>(&raw) {
            Ok(context) => {
                if let Ok(value) = serde_json::to_value(&context) {
                    self.cache.insert(key, value);
                }
                Some(context)
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "skipping malformed conflict context");
                None
            },
        }
    }

    /// Transitions a conflict to resolved, exactly once.
    ///
    /// Returns `false` for an unknown id or one that is already resolved.
    /// The transition is a compare-and-swap so two agents racing to resolve
    /// the same conflict cannot both win. Requires coordinator tier.
    #[instrument(skip(self, credentials), fields(agent = %credentials.agent_id))]
    pub fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: &str,
        credentials: &AgentCredentials,
    ) -> bool {
        if let Err(e) = credentials.authorize(AccessKind::Administer) {
            tracing::warn!(conflict_id, error = %e, "resolve refused");
            return false;
        }

        let key = self.conflict_key(conflict_id);
        for _attempt in 0..=RESOLVE_RETRIES {
            let raw = match self.conn.get(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => return false,
                Err(e) => {
                    tracing::warn!(conflict_id, error = %e, "resolve read failed");
                    return false;
                },
            };
            let mut context: ConflictContext = match serde_json::from_str(&raw) {
                Ok(context) => context,
                Err(e) => {
                    tracing::warn!(conflict_id, error = %e, "resolve found malformed context");
                    return false;
                },
            };
            if context.status == ConflictStatus::Resolved {
                return false;
            }

            context.status = ConflictStatus::Resolved;
            context.resolution = Some(resolution.to_string());
            context.resolved_at = Some(crate::current_timestamp_ms());
            let Ok(updated) = serde_json::to_string(&context) else {
                return false;
            };

            match self.conn.compare_and_swap(&key, &raw, Some(&updated)) {
                Ok(true) => {
                    self.cache.invalidate(&key);
                    return true;
                },
                Ok(false) => {
                    // Lost the race; the loop re-reads and, if the winner
                    // resolved it, reports false.
                },
                Err(e) => {
                    tracing::warn!(conflict_id, error = %e, "resolve swap failed");
                    return false;
                },
            }
        }
        false
    }

    /// Lists conflicts that are still active.
    pub fn list_active_conflicts(&self, credentials: &AgentCredentials) -> Vec<ConflictContext> {
        if credentials.authorize(AccessKind::Read).is_err() {
            return Vec::new();
        }

        let pattern = self.conn.keyspace().pattern(Category::Conflict, "*");
        let mut active = Vec::new();
        let mut cursor = "0".to_string();
        loop {
            let (next, keys) = match self.conn.scan(&pattern, &cursor, 100) {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(error = %e, "conflict scan failed");
                    break;
                },
            };
            for key in keys {
                match self.conn.get(&key) {
                    Ok(Some(raw)) => match serde_json::from_str::<ConflictContext>(&raw) {
                        Ok(context) if context.status == ConflictStatus::Active => {
                            active.push(context);
                        },
                        Ok(_) => {},
                        Err(e) => {
                            tracing::warn!(key, error = %e, "skipping malformed conflict context");
                        },
                    },
                    Ok(None) => {},
                    Err(e) => tracing::warn!(key, error = %e, "conflict read failed"),
                }
            }
            if next == "0" {
                break;
            }
            cursor = next;
        }
        active
    }
}
