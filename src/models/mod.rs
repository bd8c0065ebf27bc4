//! Data models for concord.
//!
//! This module contains all the core data structures used throughout the system.

mod conflict;
mod credentials;
mod messaging;
mod pattern;
mod session;
mod ttl;
mod working;

pub use conflict::{ConflictContext, ConflictStatus};
pub use credentials::{AccessKind, AccessTier, AgentCredentials};
pub use messaging::{ChannelMessage, QueueTask, StreamEntry, StreamId, TimelineEvent};
pub use pattern::{PatternStatus, PromotionOutcome, StagedPattern};
pub use session::CollaborationSession;
pub use ttl::TtlTier;
pub use working::WorkingMemoryEntry;
