//! Pub/sub messaging.
//!
//! Delivery happens off the caller's path: backend subscriptions feed an
//! mpsc channel owned by a dedicated dispatcher thread, which invokes
//! registered handler callbacks. `publish` never blocks on delivery, and
//! `close` terminates the dispatcher deterministically so the process can
//! shut down cleanly.

use crate::backend::{Category, Connection};
use crate::models::{AccessKind, AgentCredentials, ChannelMessage};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Callback invoked with each message arriving on a subscribed channel.
pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Service for channel-based messaging between agents.
pub struct PubSubService {
    conn: Arc<Connection>,
    handlers: Arc<Mutex<HashMap<String, Vec<MessageHandler>>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    sink: Mutex<Option<Sender<ChannelMessage>>>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl PubSubService {
    /// Creates the service. The dispatcher thread starts lazily on the
    /// first subscription.
    #[must_use]
    pub fn new(conn: Arc<Connection>, poll_interval: Duration) -> Self {
        Self {
            conn,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            dispatcher: Mutex::new(None),
            sink: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            poll_interval,
        }
    }

    fn channel_key(&self, channel: &str) -> String {
        self.conn.key(Category::Channel, channel)
    }

    /// Publishes a message, returning the number of subscribers notified.
    pub fn publish(&self, channel: &str, message: &Value, credentials: &AgentCredentials) -> usize {
        if let Err(e) = credentials.authorize(AccessKind::Write) {
            tracing::warn!(channel, error = %e, "publish refused");
            return 0;
        }
        let payload = message.to_string();
        match self
            .conn
            .backend()
            .publish(&self.channel_key(channel), &payload)
        {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::warn!(channel, error = %e, "publish failed");
                0
            },
        }
    }

    /// Registers a handler for a channel.
    ///
    /// The handler runs on the dispatcher thread for every message arriving
    /// on the channel until `unsubscribe` or `close`.
    pub fn subscribe(
        &self,
        channel: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
        credentials: &AgentCredentials,
    ) -> bool {
        if let Err(e) = credentials.authorize(AccessKind::Read) {
            tracing::warn!(channel, error = %e, "subscribe refused");
            return false;
        }

        let full_channel = self.channel_key(channel);
        {
            let Ok(mut handlers) = self.handlers.lock() else {
                return false;
            };
            handlers
                .entry(full_channel.clone())
                .or_default()
                .push(Arc::new(handler));
        }

        let sender = match self.ensure_dispatcher() {
            Ok(sender) => sender,
            Err(e) => {
                tracing::warn!(channel, error = %e, "dispatcher start failed");
                return false;
            },
        };
        match self.conn.backend().subscribe(&full_channel, sender) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(channel, error = %e, "backend subscribe failed");
                false
            },
        }
    }

    /// Stops delivery for a channel, dropping its handlers.
    pub fn unsubscribe(&self, channel: &str, credentials: &AgentCredentials) -> bool {
        if credentials.authorize(AccessKind::Read).is_err() {
            return false;
        }
        let full_channel = self.channel_key(channel);
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.remove(&full_channel);
        }
        match self.conn.backend().unsubscribe(&full_channel) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(channel, error = %e, "backend unsubscribe failed");
                false
            },
        }
    }

    fn ensure_dispatcher(&self) -> crate::Result<Sender<ChannelMessage>> {
        let mut sink = self.sink.lock().map_err(|e| crate::Error::OperationFailed {
            operation: "pubsub_sink_lock".to_string(),
            cause: e.to_string(),
        })?;
        if let Some(sender) = sink.as_ref() {
            return Ok(sender.clone());
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let handlers = Arc::clone(&self.handlers);
        let shutdown = Arc::clone(&self.shutdown);
        let poll = self.poll_interval;
        let handle = std::thread::Builder::new()
            .name("concord-pubsub-dispatch".to_string())
            .spawn(move || dispatch_loop(&rx, &handlers, &shutdown, poll))
            .map_err(|e| crate::Error::OperationFailed {
                operation: "pubsub_dispatcher_spawn".to_string(),
                cause: e.to_string(),
            })?;

        let mut dispatcher =
            self.dispatcher
                .lock()
                .map_err(|e| crate::Error::OperationFailed {
                    operation: "pubsub_dispatcher_lock".to_string(),
                    cause: e.to_string(),
                })?;
        *dispatcher = Some(handle);
        *sink = Some(tx.clone());
        Ok(tx)
    }

    /// Terminates the dispatcher thread and drops all subscriptions.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let channels: Vec<String> = self
            .handlers
            .lock()
            .map(|mut handlers| handlers.drain().map(|(channel, _)| channel).collect())
            .unwrap_or_default();
        for channel in channels {
            if let Err(e) = self.conn.backend().unsubscribe(&channel) {
                tracing::debug!(channel, error = %e, "unsubscribe during close failed");
            }
        }

        // Dropping the sender disconnects the dispatcher's receiver; the
        // shutdown flag covers the poll-timeout path.
        if let Ok(mut sink) = self.sink.lock() {
            *sink = None;
        }
        if let Ok(mut dispatcher) = self.dispatcher.lock() {
            if let Some(handle) = dispatcher.take() {
                if handle.join().is_err() {
                    tracing::warn!("pub/sub dispatcher panicked during shutdown");
                }
            }
        }
    }
}

fn dispatch_loop(
    rx: &Receiver<ChannelMessage>,
    handlers: &Arc<Mutex<HashMap<String, Vec<MessageHandler>>>>,
    shutdown: &Arc<AtomicBool>,
    poll: Duration,
) {
    loop {
        match rx.recv_timeout(poll) {
            Ok(message) => {
                let value: Value = match serde_json::from_str(&message.payload) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(channel = %message.channel, error = %e, "undecodable message");
                        continue;
                    },
                };
                // Clone the handler list out of the lock so a handler can
                // call back into subscribe/unsubscribe without deadlocking,
                // and slow handlers never block registration.
                let registered: Vec<MessageHandler> = handlers
                    .lock()
                    .ok()
                    .and_then(|map| map.get(&message.channel).cloned())
                    .unwrap_or_default();
                for handler in &registered {
                    handler(&value);
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
            },
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
