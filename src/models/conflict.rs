//! Conflict negotiation types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Status of a conflict context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    /// Disagreement is open.
    Active,
    /// Resolved; terminal, reached at most once.
    Resolved,
}

impl ConflictStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked disagreement between named agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictContext {
    /// Unique conflict identifier.
    pub conflict_id: String,
    /// Participating agents; non-empty by construction.
    pub participants: BTreeSet<String>,
    /// What the disagreement is about.
    pub topic: String,
    /// Current status.
    pub status: ConflictStatus,
    /// Resolution text, set exactly once when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: u64,
    /// Resolution timestamp (Unix epoch milliseconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
}
