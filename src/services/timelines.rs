//! Temporal event timelines.
//!
//! A timeline orders events by timestamp and supports range queries over a
//! time window. Events are immutable once recorded; they carry a generated
//! id so identical payloads at the same instant remain distinct.

use crate::backend::{Category, Connection};
use crate::models::{AccessKind, AgentCredentials, TimelineEvent};
use serde_json::Value;
use std::sync::Arc;

/// Service for timestamp-ordered event records.
pub struct TimelineService {
    conn: Arc<Connection>,
}

impl TimelineService {
    /// Creates the service.
    #[must_use]
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    fn timeline_key(&self, timeline: &str) -> String {
        self.conn.key(Category::Timeline, timeline)
    }

    /// Records an event, returning its generated id. `timestamp` defaults
    /// to the current time; an explicit value allows backfilling.
    pub fn timeline_add(
        &self,
        timeline: &str,
        payload: &Value,
        credentials: &AgentCredentials,
        timestamp: Option<u64>,
    ) -> Option<String> {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(timeline, error = %e, "timeline add refused");
            return None;
        }
        let event = TimelineEvent {
            event_id: uuid::Uuid::now_v7().to_string(),
            payload: payload.clone(),
            timestamp: timestamp.unwrap_or_else(crate::current_timestamp_ms),
        };
        let member = match serde_json::to_string(&event) {
            Ok(member) => member,
            Err(e) => {
                tracing::warn!(timeline, error = %e, "event serialization failed");
                return None;
            },
        };
        // f64 keeps millisecond precision for timestamps well past 2100.
        #[allow(clippy::cast_precision_loss)]
        let score = event.timestamp as f64;
        match self
            .conn
            .backend()
            .sorted_add(&self.timeline_key(timeline), score, &member)
        {
            Ok(()) => Some(event.event_id),
            Err(e) => {
                tracing::warn!(timeline, error = %e, "timeline add failed");
                None
            },
        }
    }

    /// Returns events within `[start, end]` in ascending timestamp order.
    /// Open bounds extend to the corresponding end of the timeline.
    pub fn timeline_query(
        &self,
        timeline: &str,
        start: Option<u64>,
        end: Option<u64>,
        credentials: &AgentCredentials,
    ) -> Vec<TimelineEvent> {
        if let Err(e) = credentials.authorize(AccessKind::Read) {
            tracing::warn!(timeline, error = %e, "timeline query refused");
            return Vec::new();
        }
        #[allow(clippy::cast_precision_loss)]
        let (min, max) = (start.map(|t| t as f64), end.map(|t| t as f64));
        let members = match self
            .conn
            .backend()
            .sorted_range_by_score(&self.timeline_key(timeline), min, max)
        {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(timeline, error = %e, "timeline query failed");
                return Vec::new();
            },
        };
        members
            .iter()
            .filter_map(|raw| match serde_json::from_str(raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(timeline, error = %e, "skipping undecodable event");
                    None
                },
            })
            .collect()
    }

    /// Counts events within `[start, end]` without fetching them.
    pub fn timeline_count(
        &self,
        timeline: &str,
        start: Option<u64>,
        end: Option<u64>,
        credentials: &AgentCredentials,
    ) -> usize {
        if credentials.authorize(AccessKind::Read).is_err() {
            return 0;
        }
        #[allow(clippy::cast_precision_loss)]
        let (min, max) = (start.map(|t| t as f64), end.map(|t| t as f64));
        match self
            .conn
            .backend()
            .sorted_count(&self.timeline_key(timeline), min, max)
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(timeline, error = %e, "timeline count failed");
                0
            },
        }
    }
}
