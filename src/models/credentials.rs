//! Agent credentials and access tiers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access tier granted to an agent.
///
/// Authorization is a pure function of (tier, kind of access); credentials
/// are issued externally and never persisted by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    /// Read-only access to every category.
    Observer,
    /// Read/write access, but no terminal state transitions.
    Contributor,
    /// Full access including promotion, rejection, and conflict resolution.
    Coordinator,
}

impl AccessTier {
    /// Returns the tier name as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Observer => "observer",
            Self::Contributor => "contributor",
            Self::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of access an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Reading persisted state.
    Read,
    /// Creating or updating state.
    Write,
    /// Terminal state transitions: promote/reject patterns, resolve conflicts.
    Administer,
}

/// Credentials presented with every public operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCredentials {
    /// Unique identifier of the calling agent.
    pub agent_id: String,
    /// Access tier granted to the agent.
    pub tier: AccessTier,
}

impl AgentCredentials {
    /// Creates credentials with an explicit tier.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, tier: AccessTier) -> Self {
        Self {
            agent_id: agent_id.into(),
            tier,
        }
    }

    /// Creates observer-tier credentials.
    #[must_use]
    pub fn observer(agent_id: impl Into<String>) -> Self {
        Self::new(agent_id, AccessTier::Observer)
    }

    /// Creates contributor-tier credentials.
    #[must_use]
    pub fn contributor(agent_id: impl Into<String>) -> Self {
        Self::new(agent_id, AccessTier::Contributor)
    }

    /// Creates coordinator-tier credentials.
    #[must_use]
    pub fn coordinator(agent_id: impl Into<String>) -> Self {
        Self::new(agent_id, AccessTier::Coordinator)
    }

    /// Checks that these credentials permit the requested kind of access.
    ///
    /// An empty agent id is the one condition that aborts an operation
    /// outright rather than being absorbed into a boolean return.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized` when the agent id is empty or the tier
    /// does not cover the requested access kind.
    pub fn authorize(&self, kind: AccessKind) -> Result<()> {
        if self.agent_id.trim().is_empty() {
            return Err(Error::Unauthorized("agent id is empty".to_string()));
        }
        let allowed = match kind {
            AccessKind::Read => true,
            AccessKind::Write => self.tier != AccessTier::Observer,
            AccessKind::Administer => self.tier == AccessTier::Coordinator,
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "tier '{}' does not permit {:?} access",
                self.tier, kind
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(AccessTier::Observer, AccessKind::Read, true; "observer reads")]
    #[test_case(AccessTier::Observer, AccessKind::Write, false; "observer cannot write")]
    #[test_case(AccessTier::Contributor, AccessKind::Write, true; "contributor writes")]
    #[test_case(AccessTier::Contributor, AccessKind::Administer, false; "contributor cannot administer")]
    #[test_case(AccessTier::Coordinator, AccessKind::Administer, true; "coordinator administers")]
    fn test_authorize_tiers(tier: AccessTier, kind: AccessKind, expected: bool) {
        let creds = AgentCredentials::new("agent-1", tier);
        assert_eq!(creds.authorize(kind).is_ok(), expected);
    }

    #[test]
    fn test_empty_agent_id_rejected() {
        let creds = AgentCredentials::coordinator("  ");
        assert!(creds.authorize(AccessKind::Read).is_err());
    }
}
