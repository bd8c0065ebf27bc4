//! Coordination services.
//!
//! One service per component, composed by [`CoordinationHub`] over a shared
//! [`crate::backend::Connection`] and [`crate::cache::LocalCache`].

mod batch;
mod conflict;
mod hub;
mod pubsub;
mod queues;
mod session;
mod staging;
mod streams;
mod timelines;
mod transaction;
mod working_memory;

pub use batch::BatchService;
pub use conflict::ConflictService;
pub use hub::{CoordinationHub, HubStats};
pub use pubsub::{MessageHandler, PubSubService};
pub use queues::QueueService;
pub use session::SessionService;
pub use staging::StagingService;
pub use streams::StreamService;
pub use timelines::TimelineService;
pub use transaction::TransactionService;
pub use working_memory::WorkingMemoryService;
