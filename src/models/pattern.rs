//! Staged pattern lifecycle types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle status of a staged pattern.
///
/// `staged` transitions to `promoted` or `rejected`; both are terminal and a
/// pattern never re-enters the staging set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    /// Awaiting promotion or rejection.
    Staged,
    /// Promoted out of the staging set.
    Promoted,
    /// Rejected with a recorded reason.
    Rejected,
}

impl PatternStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Promoted => "promoted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate piece of reusable knowledge awaiting promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedPattern {
    /// Unique pattern identifier.
    pub pattern_id: String,
    /// Pattern content.
    pub content: Value,
    /// Confidence score in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Agent that staged the pattern.
    pub submitted_by: String,
    /// Current lifecycle status.
    pub status: PatternStatus,
    /// Rejection reason, recorded on the rejected branch only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Staging timestamp (Unix epoch milliseconds).
    pub staged_at: u64,
}

impl StagedPattern {
    /// Creates a new pattern in the staged state.
    #[must_use]
    pub fn new(
        pattern_id: impl Into<String>,
        content: Value,
        confidence: f64,
        submitted_by: impl Into<String>,
    ) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            content,
            confidence,
            submitted_by: submitted_by.into(),
            status: PatternStatus::Staged,
            reason: None,
            staged_at: crate::current_timestamp_ms(),
        }
    }
}

/// Result of an atomic validate-and-promote call.
///
/// Carries the `(success, pattern, message)` triple the promotion contract
/// requires; on a confidence failure the pattern is returned untouched and
/// remains staged.
#[derive(Debug, Clone)]
pub struct PromotionOutcome {
    /// Whether the pattern was promoted.
    pub success: bool,
    /// The pattern that was read, when one existed.
    pub pattern: Option<StagedPattern>,
    /// Human-readable explanation of the outcome.
    pub message: String,
}

impl PromotionOutcome {
    pub(crate) fn failure(pattern: Option<StagedPattern>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            pattern,
            message: message.into(),
        }
    }

    pub(crate) fn promoted(pattern: StagedPattern, message: impl Into<String>) -> Self {
        Self {
            success: true,
            pattern: Some(pattern),
            message: message.into(),
        }
    }
}
