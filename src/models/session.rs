//! Collaboration session types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// A real-time collaboration session.
///
/// Membership grows through joins and shrinks through leaves; a session with
/// zero members is retained rather than garbage-collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationSession {
    /// Unique session identifier.
    pub session_id: String,
    /// Current members. The creator is an implicit initial member.
    pub members: BTreeSet<String>,
    /// Agent that created the session.
    pub created_by: String,
    /// Caller-supplied metadata.
    #[serde(default)]
    pub metadata: Value,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: u64,
    /// Whether this session's data may be read across session boundaries.
    #[serde(default)]
    pub cross_session_enabled: bool,
}

impl CollaborationSession {
    /// Creates a new session with the creator as sole member.
    #[must_use]
    pub fn new(session_id: impl Into<String>, created_by: impl Into<String>, metadata: Value) -> Self {
        let created_by = created_by.into();
        let mut members = BTreeSet::new();
        members.insert(created_by.clone());
        Self {
            session_id: session_id.into(),
            members,
            created_by,
            metadata,
            created_at: crate::current_timestamp_ms(),
            cross_session_enabled: false,
        }
    }
}
