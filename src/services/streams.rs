//! Append-only event streams.
//!
//! Streams carry ordered, identified events that late subscribers can
//! replay. Every append is capped at a maximum length, trimming the oldest
//! entries so streams cannot grow without bound.

use crate::backend::{Category, Connection};
use crate::models::{AccessKind, AgentCredentials, StreamEntry, StreamId};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Service for durable, replayable event streams.
pub struct StreamService {
    conn: Arc<Connection>,
    default_max_len: usize,
}

impl StreamService {
    /// Creates the service with a default per-stream trim length.
    #[must_use]
    pub fn new(conn: Arc<Connection>, default_max_len: usize) -> Self {
        Self {
            conn,
            default_max_len,
        }
    }

    fn stream_key(&self, stream: &str) -> String {
        self.conn.key(Category::Stream, stream)
    }

    /// Appends an event, returning its assigned id.
    ///
    /// Ids are strictly increasing within a stream. `max_len` overrides the
    /// configured trim threshold for this append only.
    pub fn stream_append(
        &self,
        stream: &str,
        payload: &Value,
        credentials: &AgentCredentials,
        max_len: Option<usize>,
    ) -> Option<StreamId> {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(stream, error = %e, "stream append refused");
            return None;
        }
        let limit = max_len.unwrap_or(self.default_max_len);
        match self
            .conn
            .backend()
            .stream_append(&self.stream_key(stream), &payload.to_string(), limit)
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(stream, error = %e, "stream append failed");
                None
            },
        }
    }

    /// Reads up to `count` entries starting at `from` (inclusive). A `from`
    /// of `None` reads from the beginning of the stream.
    pub fn stream_read(
        &self,
        stream: &str,
        from: Option<StreamId>,
        count: usize,
        credentials: &AgentCredentials,
    ) -> Vec<StreamEntry> {
        if let Err(e) = credentials.authorize(AccessKind::Read) {
            tracing::warn!(stream, error = %e, "stream read refused");
            return Vec::new();
        }
        let start = from.unwrap_or_default();
        match self
            .conn
            .backend()
            .stream_read(&self.stream_key(stream), start, count)
        {
            Ok(raw) => decode_entries(stream, raw),
            Err(e) => {
                tracing::warn!(stream, error = %e, "stream read failed");
                Vec::new()
            },
        }
    }

    /// Blocks up to `block_ms` for entries after `last_seen`, returning as
    /// soon as any arrive. A `block_ms` of zero returns immediately with
    /// whatever is already pending.
    pub fn stream_read_new(
        &self,
        stream: &str,
        last_seen: Option<StreamId>,
        block_ms: u64,
        credentials: &AgentCredentials,
    ) -> Vec<StreamEntry> {
        if let Err(e) = credentials.authorize(AccessKind::Read) {
            tracing::warn!(stream, error = %e, "stream read refused");
            return Vec::new();
        }
        let from = last_seen.map_or_else(StreamId::default, StreamId::next);
        match self.conn.backend().stream_read_blocking(
            &self.stream_key(stream),
            from,
            Duration::from_millis(block_ms),
        ) {
            Ok(raw) => decode_entries(stream, raw),
            Err(e) => {
                tracing::warn!(stream, error = %e, "blocking stream read failed");
                Vec::new()
            },
        }
    }
}

fn decode_entries(stream: &str, raw: Vec<(StreamId, String)>) -> Vec<StreamEntry> {
    raw.into_iter()
        .filter_map(|(id, payload)| match serde_json::from_str(&payload) {
            Ok(payload) => Some(StreamEntry { id, payload }),
            Err(e) => {
                tracing::warn!(stream, %id, error = %e, "skipping undecodable stream entry");
                None
            },
        })
        .collect()
}
