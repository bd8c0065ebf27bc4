//! TTL tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named expiry class for persisted values.
///
/// Tiers resolve to concrete durations through [`crate::config::TtlSettings`],
/// never as raw numbers at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlTier {
    /// Short-lived scratch data.
    Ephemeral,
    /// Intermediate working results shared between agents.
    #[default]
    WorkingResults,
    /// Session-scoped state.
    SessionState,
    /// No expiry; lives until explicitly deleted.
    Durable,
}

impl TtlTier {
    /// Returns the tier name as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ephemeral => "ephemeral",
            Self::WorkingResults => "working_results",
            Self::SessionState => "session_state",
            Self::Durable => "durable",
        }
    }
}

impl fmt::Display for TtlTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
