//! Collaboration sessions and cross-session sharing.

use crate::backend::{Category, Connection};
use crate::cache::LocalCache;
use crate::models::{AccessKind, AgentCredentials, CollaborationSession};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Service for real-time collaboration sessions.
///
/// Joins and leaves are idempotent: a second join or a leave by a non-member
/// is a no-op success. Zero-member sessions are retained, and malformed
/// persisted sessions are skipped during enumeration rather than failing the
/// whole listing.
pub struct SessionService {
    conn: Arc<Connection>,
    cache: Arc<LocalCache>,
}

impl SessionService {
    /// Creates the service.
    #[must_use]
    pub fn new(conn: Arc<Connection>, cache: Arc<LocalCache>) -> Self {
        Self { conn, cache }
    }

    fn session_key(&self, session_id: &str) -> String {
        self.conn.key(Category::Session, session_id)
    }

    /// Creates a session with the caller as sole initial member.
    ///
    /// Returns `false` when the id already exists.
    #[instrument(skip(self, credentials, metadata), fields(agent = %credentials.agent_id))]
    pub fn create_session(
        &self,
        session_id: &str,
        credentials: &AgentCredentials,
        metadata: Value,
    ) -> bool {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(session_id, error = %e, "create refused");
            return false;
        }

        let session = CollaborationSession::new(session_id, &credentials.agent_id, metadata);
        let raw = match serde_json::to_string(&session) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "create serialization failed");
                return false;
            },
        };

        match self
            .conn
            .set_if_absent(&self.session_key(session_id), &raw, None)
        {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "create write failed");
                false
            },
        }
    }

    /// Adds the caller to a session. Joining twice is a no-op success.
    pub fn join_session(&self, session_id: &str, credentials: &AgentCredentials) -> bool {
        self.mutate_session(session_id, credentials, "join", |session, agent| {
            session.members.insert(agent.to_string());
        })
    }

    /// Removes the caller from a session. Leaving when not a member is a
    /// no-op success.
    pub fn leave_session(&self, session_id: &str, credentials: &AgentCredentials) -> bool {
        self.mutate_session(session_id, credentials, "leave", |session, agent| {
            session.members.remove(agent);
        })
    }

    /// Flags a session as readable across session boundaries.
    ///
    /// This is a capability flag, not a data copy; callers use it as a
    /// permission check before cross-session reads.
    pub fn enable_cross_session(&self, session_id: &str, credentials: &AgentCredentials) -> bool {
        self.mutate_session(session_id, credentials, "enable_cross_session", |session, _| {
            session.cross_session_enabled = true;
        })
    }

    /// Reads the cross-session capability flag.
    #[must_use]
    pub fn cross_session_available(
        &self,
        session_id: &str,
        credentials: &AgentCredentials,
    ) -> bool {
        self.get_session(session_id, credentials)
            .is_some_and(|session| session.cross_session_enabled)
    }

    fn mutate_session(
        &self,
        session_id: &str,
        credentials: &AgentCredentials,
        operation: &str,
        apply: impl FnOnce(&mut CollaborationSession, &str),
    ) -> bool {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(session_id, operation, error = %e, "refused");
            return false;
        }

        let key = self.session_key(session_id);
        let raw = match self.conn.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(session_id, operation, error = %e, "read failed");
                return false;
            },
        };
        let mut session: CollaborationSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(session_id, operation, error = %e, "malformed session");
                return false;
            },
        };

        apply(&mut session, &credentials.agent_id);

        let updated = match serde_json::to_string(&session) {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(session_id, operation, error = %e, "serialization failed");
                return false;
            },
        };
        match self.conn.set(&key, &updated, None) {
            Ok(()) => {
                // Keep read-after-write coherent within this process.
                self.cache.invalidate(&key);
                true
            },
            Err(e) => {
                tracing::warn!(session_id, operation, error = %e, "write failed");
                false
            },
        }
    }

    /// Reads a session by id, through the local cache.
    pub fn get_session(
        &self,
        session_id: &str,
        credentials: &AgentCredentials,
    ) -> Option<CollaborationSession> {
        if credentials.authorize(AccessKind::Read).is_err() {
            return None;
        }
        let key = self.session_key(session_id);
        if let Some(cached) = self.cache.get(&key) {
            if let Ok(session) = serde_json::from_value(cached) {
                return Some(session);
            }
            self.cache.invalidate(&key);
        }

        let raw = match self.conn.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "session read failed");
                return None;
            },
        };
        match serde_json::from_str::<CollaborationSession>(&raw) {
            Ok(session) => {
                if let Ok(value) = serde_json::to_value(&session) {
                    self.cache.insert(key, value);
                }
                Some(session)
            },
            Err(e) => {
                tracing::warn!(session_id, error = %e, "skipping malformed session");
                None
            },
        }
    }

    /// Lists all sessions, regardless of membership size.
    pub fn list_sessions(&self, credentials: &AgentCredentials) -> Vec<CollaborationSession> {
        if credentials.authorize(AccessKind::Read).is_err() {
            return Vec::new();
        }

        let pattern = self.conn.keyspace().pattern(Category::Session, "*");
        let mut sessions = Vec::new();
        let mut cursor = "0".to_string();
        loop {
            let (next, keys) = match self.conn.scan(&pattern, &cursor, 100) {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(error = %e, "session scan failed");
                    break;
                },
            };
            for key in keys {
                match self.conn.get(&key) {
                    Ok(Some(raw)) => match serde_json::from_str(&raw) {
                        Ok(session) => sessions.push(session),
                        Err(e) => {
                            tracing::warn!(key, error = %e, "skipping malformed session");
                        },
                    },
                    Ok(None) => {},
                    Err(e) => tracing::warn!(key, error = %e, "session read failed"),
                }
            }
            if next == "0" {
                break;
            }
            cursor = next;
        }
        sessions
    }
}
