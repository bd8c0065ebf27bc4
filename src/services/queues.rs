//! Task queues with a priority lane.
//!
//! Each queue is backed by two lists: an urgent lane and a FIFO lane. Pops
//! always drain the urgent lane first, and insertion order is preserved
//! within each lane.

use crate::backend::{Category, Connection};
use crate::models::{AccessKind, AgentCredentials, QueueTask};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Service for work distribution between agents.
pub struct QueueService {
    conn: Arc<Connection>,
}

impl QueueService {
    /// Creates the service.
    #[must_use]
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    fn lanes(&self, queue: &str) -> (String, String) {
        (
            self.conn.key(Category::Queue, &format!("{queue}:urgent")),
            self.conn.key(Category::Queue, &format!("{queue}:fifo")),
        )
    }

    /// Enqueues a task. Priority tasks jump ahead of every pending FIFO
    /// task but behind earlier priority tasks.
    pub fn queue_push(
        &self,
        queue: &str,
        payload: &Value,
        credentials: &AgentCredentials,
        priority: bool,
    ) -> bool {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(queue, error = %e, "queue push refused");
            return false;
        }
        let task = QueueTask {
            task_id: uuid::Uuid::now_v7().to_string(),
            payload: payload.clone(),
            priority,
            enqueued_at: crate::current_timestamp_ms(),
        };
        let raw = match serde_json::to_string(&task) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(queue, error = %e, "task serialization failed");
                return false;
            },
        };
        let (urgent, fifo) = self.lanes(queue);
        let lane = if priority { urgent } else { fifo };
        match self.conn.backend().list_push_back(&lane, &raw) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(queue, error = %e, "queue push failed");
                false
            },
        }
    }

    /// Pops the next task, blocking up to `timeout` when both lanes are
    /// empty. A zero timeout returns immediately.
    pub fn queue_pop(
        &self,
        queue: &str,
        credentials: &AgentCredentials,
        timeout: Duration,
    ) -> Option<QueueTask> {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(queue, error = %e, "queue pop refused");
            return None;
        }
        let (urgent, fifo) = self.lanes(queue);
        let popped = match self
            .conn
            .backend()
            .list_pop_front(&[urgent, fifo], timeout)
        {
            Ok(popped) => popped,
            Err(e) => {
                tracing::warn!(queue, error = %e, "queue pop failed");
                return None;
            },
        };
        let (_, raw) = popped?;
        match serde_json::from_str(&raw) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!(queue, error = %e, "discarding undecodable task");
                None
            },
        }
    }

    /// Returns up to `count` pending tasks in pop order without removing
    /// them.
    pub fn queue_peek(
        &self,
        queue: &str,
        count: usize,
        credentials: &AgentCredentials,
    ) -> Vec<QueueTask> {
        if credentials.authorize(AccessKind::Read).is_err() {
            return Vec::new();
        }
        let (urgent, fifo) = self.lanes(queue);
        let mut tasks = Vec::new();
        for lane in [urgent, fifo] {
            if tasks.len() >= count {
                break;
            }
            let remaining = count - tasks.len();
            let raws = match self
                .conn
                .backend()
                .list_range(&lane, 0, remaining as isize - 1)
            {
                Ok(raws) => raws,
                Err(e) => {
                    tracing::warn!(queue, error = %e, "queue peek failed");
                    return tasks;
                },
            };
            for raw in raws {
                match serde_json::from_str(&raw) {
                    Ok(task) => tasks.push(task),
                    Err(e) => {
                        tracing::warn!(queue, error = %e, "skipping undecodable task");
                    },
                }
            }
        }
        tasks
    }

    /// Total number of pending tasks across both lanes.
    pub fn queue_length(&self, queue: &str, credentials: &AgentCredentials) -> usize {
        if credentials.authorize(AccessKind::Read).is_err() {
            return 0;
        }
        let (urgent, fifo) = self.lanes(queue);
        let mut total = 0;
        for lane in [urgent, fifo] {
            match self.conn.backend().list_len(&lane) {
                Ok(len) => total += len,
                Err(e) => {
                    tracing::warn!(queue, error = %e, "queue length failed");
                },
            }
        }
        total
    }
}
