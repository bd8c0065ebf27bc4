//! Messaging primitive types: streams, timelines, queues, pub/sub.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Monotonically increasing stream entry identifier.
///
/// Rendered as `<millis>-<seq>`, matching Redis stream id syntax so both
/// backends share one representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    /// Millisecond component.
    pub ms: u64,
    /// Sequence number within the same millisecond.
    pub seq: u64,
}

impl StreamId {
    /// Creates a stream id from its components.
    #[must_use]
    pub const fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Returns the id that sorts immediately after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            ms: self.ms,
            seq: self.seq + 1,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (ms, seq) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidInput(format!("malformed stream id '{s}'")))?;
        let ms = ms
            .parse()
            .map_err(|_| Error::InvalidInput(format!("malformed stream id '{s}'")))?;
        let seq = seq
            .parse()
            .map_err(|_| Error::InvalidInput(format!("malformed stream id '{s}'")))?;
        Ok(Self { ms, seq })
    }
}

impl Serialize for StreamId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One entry in an append-only stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Assigned entry id.
    pub id: StreamId,
    /// Entry payload.
    pub payload: Value,
}

/// One event on a timeline, immutable once added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Unique event identifier.
    pub event_id: String,
    /// Event payload.
    pub payload: Value,
    /// Sort key (Unix epoch milliseconds).
    pub timestamp: u64,
}

/// One task on a FIFO/priority queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    /// Unique task identifier.
    pub task_id: String,
    /// Task payload.
    pub payload: Value,
    /// Whether the task was pushed ahead of the FIFO lane.
    #[serde(default)]
    pub priority: bool,
    /// Enqueue timestamp (Unix epoch milliseconds).
    pub enqueued_at: u64,
}

/// A message received on a pub/sub channel.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Channel the message arrived on.
    pub channel: String,
    /// Raw serialized payload.
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_ordering() {
        let a = StreamId::new(10, 0);
        let b = StreamId::new(10, 1);
        let c = StreamId::new(11, 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.next(), b);
    }

    #[test]
    fn test_stream_id_round_trip() {
        let id = StreamId::new(1_700_000_000_123, 4);
        let parsed: StreamId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_stream_id_rejects_garbage() {
        assert!("nope".parse::<StreamId>().is_err());
        assert!("12x-3".parse::<StreamId>().is_err());
    }
}
