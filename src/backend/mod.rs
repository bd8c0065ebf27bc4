//! Backend abstraction and implementations.
//!
//! The [`CoordinationBackend`] trait is the single seam between the
//! coordination services and the key-value engine. Two implementations ship:
//! an in-process backend for tests and single-host use, and a Redis backend
//! behind the `redis` Cargo feature.

mod connection;
mod keyspace;
mod memory;
mod metrics;
pub mod redis;

pub use connection::Connection;
pub use keyspace::{Category, Keyspace};
pub use memory::InMemoryBackend;
pub use metrics::{MetricsSnapshot, OpMetrics};
pub use redis::RedisBackend;

use crate::Result;
use crate::models::{ChannelMessage, StreamId};
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Key-value engine contract the coordination layer is written against.
///
/// All operations are synchronous; the only ones permitted to block the
/// caller are [`CoordinationBackend::list_pop_front`] and
/// [`CoordinationBackend::stream_read_blocking`], both bounded by an explicit
/// timeout where zero means "return immediately".
pub trait CoordinationBackend: Send + Sync {
    /// Reads a value. Expired values read as absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value, with an optional expiry.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Writes a value only when the key does not already hold one.
    ///
    /// Returns `true` when the write happened.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Deletes a key, reporting whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Conditionally replaces (or removes, when `replacement` is `None`) the
    /// value at `key`, only if it still equals `expected`.
    ///
    /// Returns `false` when the value changed or vanished underneath the
    /// caller; the caller re-reads and retries.
    fn compare_and_swap(&self, key: &str, expected: &str, replacement: Option<&str>)
    -> Result<bool>;

    /// Cursor-based key iteration.
    ///
    /// Start with cursor `"0"`; a returned cursor of `"0"` means the
    /// iteration is exhausted. Callers must follow cursors to completion for
    /// full coverage.
    fn scan(&self, pattern: &str, cursor: &str, count: usize) -> Result<(String, Vec<String>)>;

    /// Publishes a payload to a channel, returning the subscriber count.
    fn publish(&self, channel: &str, payload: &str) -> Result<usize>;

    /// Routes messages arriving on `channel` into `sink`.
    fn subscribe(&self, channel: &str, sink: Sender<ChannelMessage>) -> Result<()>;

    /// Stops routing messages for `channel`.
    fn unsubscribe(&self, channel: &str) -> Result<()>;

    /// Adds a member to a sorted set under a score.
    fn sorted_add(&self, key: &str, score: f64, member: &str) -> Result<()>;

    /// Returns members with scores in `[min, max]`, ascending. `None` bounds
    /// are unbounded.
    fn sorted_range_by_score(
        &self,
        key: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Vec<String>>;

    /// Counts members with scores in `[min, max]`.
    fn sorted_count(&self, key: &str, min: Option<f64>, max: Option<f64>) -> Result<usize>;

    /// Appends to the back of a list, returning the new length.
    fn list_push_back(&self, key: &str, value: &str) -> Result<usize>;

    /// Pops from the front of the first non-empty list in `keys`.
    ///
    /// Blocks up to `timeout`; a zero timeout returns immediately. The result
    /// carries the key the value came from.
    fn list_pop_front(&self, keys: &[String], timeout: Duration)
    -> Result<Option<(String, String)>>;

    /// Returns list elements in `[start, stop]` (inclusive, negative indices
    /// count from the back).
    fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    /// Returns the list length using the engine's native length operation.
    fn list_len(&self, key: &str) -> Result<usize>;

    /// Appends an entry to a stream, assigning a monotonically increasing id,
    /// and trims the oldest entries once the stream exceeds `max_len`
    /// (`0` disables trimming).
    fn stream_append(&self, key: &str, payload: &str, max_len: usize) -> Result<StreamId>;

    /// Reads up to `count` entries with ids `>= from`, ascending.
    fn stream_read(&self, key: &str, from: StreamId, count: usize)
    -> Result<Vec<(StreamId, String)>>;

    /// Like [`CoordinationBackend::stream_read`], but waits up to `block` for
    /// at least one entry. A zero duration returns immediately.
    fn stream_read_blocking(
        &self,
        key: &str,
        from: StreamId,
        block: Duration,
    ) -> Result<Vec<(StreamId, String)>>;

    /// Reports backend reachability.
    fn ping(&self) -> Result<bool>;

    /// Releases resources, including any background listener threads.
    fn close(&self) -> Result<()>;
}
