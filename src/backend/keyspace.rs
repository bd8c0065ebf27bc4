//! Namespaced key construction.
//!
//! Every persisted value lives under `<namespace>:<category-prefix><logical-key>`
//! so entity categories never collide in the shared key space.

use std::fmt;

/// Entity category, one key prefix each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Per-agent working memory.
    WorkingMemory,
    /// Patterns awaiting promotion.
    StagedPattern,
    /// Rejected patterns, kept for audit.
    RejectedPattern,
    /// Conflict contexts.
    Conflict,
    /// Collaboration sessions.
    Session,
    /// Pub/sub channel names.
    Channel,
    /// Append-only streams.
    Stream,
    /// Time-indexed event sets.
    Timeline,
    /// Task queues.
    Queue,
}

impl Category {
    /// Returns the key prefix for this category.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::WorkingMemory => "wm:",
            Self::StagedPattern => "staged:",
            Self::RejectedPattern => "rejected:",
            Self::Conflict => "conflict:",
            Self::Session => "session:",
            Self::Channel => "channel:",
            Self::Stream => "stream:",
            Self::Timeline => "timeline:",
            Self::Queue => "queue:",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Builds fully qualified keys under a configured root namespace.
#[derive(Debug, Clone)]
pub struct Keyspace {
    namespace: String,
}

impl Keyspace {
    /// Creates a keyspace rooted at `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Returns the root namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Builds a fully qualified key for a logical key in a category.
    #[must_use]
    pub fn key(&self, category: Category, logical: &str) -> String {
        format!("{}:{}{logical}", self.namespace, category.prefix())
    }

    /// Builds a scan pattern covering a glob within a category.
    #[must_use]
    pub fn pattern(&self, category: Category, glob: &str) -> String {
        format!("{}:{}{glob}", self.namespace, category.prefix())
    }

    /// Strips namespace and category prefix from a fully qualified key.
    ///
    /// Returns `None` when the key does not belong to the category.
    #[must_use]
    pub fn logical_key<'a>(&self, category: Category, full: &'a str) -> Option<&'a str> {
        full.strip_prefix(&self.namespace)
            .and_then(|rest| rest.strip_prefix(':'))
            .and_then(|rest| rest.strip_prefix(category.prefix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_construction() {
        let ks = Keyspace::new("concord");
        assert_eq!(
            ks.key(Category::WorkingMemory, "agent-1:plan"),
            "concord:wm:agent-1:plan"
        );
        assert_eq!(ks.pattern(Category::StagedPattern, "*"), "concord:staged:*");
    }

    #[test]
    fn test_categories_disjoint() {
        let ks = Keyspace::new("concord");
        let staged = ks.key(Category::StagedPattern, "p1");
        let rejected = ks.key(Category::RejectedPattern, "p1");
        assert_ne!(staged, rejected);
        // A staged:* scan must never pick up rejected patterns.
        assert!(!rejected.starts_with("concord:staged:"));
    }

    #[test]
    fn test_logical_key_round_trip() {
        let ks = Keyspace::new("concord");
        let full = ks.key(Category::Session, "s1");
        assert_eq!(ks.logical_key(Category::Session, &full), Some("s1"));
        assert_eq!(ks.logical_key(Category::Conflict, &full), None);
    }
}
