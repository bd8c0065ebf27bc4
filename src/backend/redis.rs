//! Redis-based coordination backend.
//!
//! Maps the [`super::CoordinationBackend`] contract onto native Redis
//! primitives: TTL set/get, SCAN cursors, WATCH/MULTI/EXEC for conditional
//! writes, PUBLISH/SUBSCRIBE, sorted sets, lists with BLPOP, and streams
//! with XADD/XRANGE/XREAD.
//!
//! # Connection Pooling
//!
//! Reuses a single command connection per instance behind a
//! `Mutex<Option<Connection>>`. For high-concurrency deployments consider a
//! pooled client; the single cached connection is adequate for per-agent
//! processes.
//!
//! # Command Timeout
//!
//! Command connections use a 5-second response timeout to prevent indefinite
//! blocking on slow or unresponsive servers. Blocking pops and stream reads
//! get their own timeout budget on top of the caller-supplied bound.

#[cfg(feature = "redis")]
mod implementation {
    use crate::backend::CoordinationBackend;
    use crate::models::{ChannelMessage, StreamId};
    use crate::{Error, Result};
    use redis::{Client, Commands, Connection};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::Sender;
    use std::sync::{Arc, Mutex};
    use std::thread::JoinHandle;
    use std::time::Duration;

    /// Default timeout for Redis command responses.
    const REDIS_TIMEOUT: Duration = Duration::from_secs(5);

    /// Read timeout on the subscriber connection; bounds shutdown latency.
    const LISTENER_POLL: Duration = Duration::from_millis(100);

    /// State shared between the backend and its listener thread.
    struct ListenerShared {
        /// Registered sinks per channel.
        sinks: Mutex<HashMap<String, Vec<Sender<ChannelMessage>>>>,
        /// Set when the channel set changes and the listener must resubscribe.
        dirty: AtomicBool,
        /// Set on close; the listener exits at the next poll.
        shutdown: AtomicBool,
    }

    /// Redis implementation of [`CoordinationBackend`].
    pub struct RedisBackend {
        /// Redis client.
        client: Client,
        /// Cached command connection for reuse.
        connection: Mutex<Option<Connection>>,
        /// Background subscriber thread, started on first subscribe.
        listener: Mutex<Option<JoinHandle<()>>>,
        /// State shared with the listener.
        shared: Arc<ListenerShared>,
    }

    fn op_err(operation: &str, cause: impl ToString) -> Error {
        Error::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }

    impl RedisBackend {
        /// Creates a new Redis backend.
        ///
        /// # Errors
        ///
        /// Returns an error if the connection URL is invalid.
        pub fn new(connection_url: &str) -> Result<Self> {
            let client = Client::open(connection_url).map_err(|e| op_err("redis_connect", e))?;
            Ok(Self {
                client,
                connection: Mutex::new(None),
                listener: Mutex::new(None),
                shared: Arc::new(ListenerShared {
                    sinks: Mutex::new(HashMap::new()),
                    dirty: AtomicBool::new(false),
                    shutdown: AtomicBool::new(false),
                }),
            })
        }

        /// Creates a backend with default settings.
        ///
        /// # Errors
        ///
        /// Returns an error if the connection URL is invalid.
        pub fn with_defaults() -> Result<Self> {
            Self::new("redis://localhost:6379")
        }

        /// Gets a connection, reusing the cached one if available.
        fn get_connection(&self) -> Result<Connection> {
            let mut guard = self
                .connection
                .lock()
                .map_err(|e| op_err("redis_lock_connection", e))?;

            if let Some(conn) = guard.take() {
                // If this connection turns out broken the caller gets the
                // error and the next call creates a fresh one.
                return Ok(conn);
            }

            let conn = self
                .client
                .get_connection()
                .map_err(|e| op_err("redis_get_connection", e))?;

            conn.set_read_timeout(Some(REDIS_TIMEOUT))
                .map_err(|e| op_err("redis_set_read_timeout", e))?;
            conn.set_write_timeout(Some(REDIS_TIMEOUT))
                .map_err(|e| op_err("redis_set_write_timeout", e))?;

            Ok(conn)
        }

        /// Returns a connection to the cache for reuse.
        fn return_connection(&self, conn: Connection) {
            if let Ok(mut guard) = self.connection.lock() {
                *guard = Some(conn);
            }
            // If the lock fails, dropping the connection is fine.
        }

        /// Runs `f` on a cached connection, returning it afterwards.
        fn with_connection<T>(
            &self,
            operation: &str,
            f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
        ) -> Result<T> {
            let mut conn = self.get_connection()?;
            let result = f(&mut conn);
            self.return_connection(conn);
            result.map_err(|e| op_err(operation, e))
        }

        /// Ensures the listener thread is running.
        fn ensure_listener(&self) -> Result<()> {
            let mut guard = self
                .listener
                .lock()
                .map_err(|e| op_err("redis_listener_lock", e))?;
            if guard.is_some() {
                return Ok(());
            }
            let client = self.client.clone();
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name("concord-redis-listener".to_string())
                .spawn(move || listener_loop(&client, &shared))
                .map_err(|e| op_err("redis_listener_spawn", e))?;
            *guard = Some(handle);
            Ok(())
        }
    }

    /// Subscriber loop: owns the pub/sub connection, resubscribes when the
    /// channel set changes, and forwards messages into registered sinks.
    fn listener_loop(client: &Client, shared: &Arc<ListenerShared>) {
        while !shared.shutdown.load(Ordering::SeqCst) {
            let channels: Vec<String> = match shared.sinks.lock() {
                Ok(sinks) => sinks.keys().cloned().collect(),
                Err(_) => return,
            };
            shared.dirty.store(false, Ordering::SeqCst);

            if channels.is_empty() {
                std::thread::sleep(LISTENER_POLL);
                continue;
            }

            let Ok(mut conn) = client.get_connection() else {
                tracing::warn!("pub/sub listener could not reach redis; retrying");
                std::thread::sleep(REDIS_TIMEOUT);
                continue;
            };
            let mut pubsub = conn.as_pubsub();
            if pubsub.set_read_timeout(Some(LISTENER_POLL)).is_err() {
                continue;
            }
            let mut subscribed = true;
            for channel in &channels {
                if let Err(e) = pubsub.subscribe(channel) {
                    tracing::warn!(channel, error = %e, "subscribe failed");
                    subscribed = false;
                    break;
                }
            }
            if !subscribed {
                std::thread::sleep(LISTENER_POLL);
                continue;
            }

            loop {
                if shared.shutdown.load(Ordering::SeqCst) || shared.dirty.load(Ordering::SeqCst) {
                    break;
                }
                match pubsub.get_message() {
                    Ok(message) => {
                        let channel = message.get_channel_name().to_string();
                        let payload: String = match message.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                tracing::warn!(channel, error = %e, "undecodable payload");
                                continue;
                            },
                        };
                        if let Ok(mut sinks) = shared.sinks.lock() {
                            if let Some(registered) = sinks.get_mut(&channel) {
                                registered.retain(|sink| {
                                    sink.send(ChannelMessage {
                                        channel: channel.clone(),
                                        payload: payload.clone(),
                                    })
                                    .is_ok()
                                });
                            }
                        }
                    },
                    Err(e) if e.is_timeout() => {},
                    Err(e) => {
                        tracing::warn!(error = %e, "pub/sub connection lost; reconnecting");
                        break;
                    },
                }
            }
        }
    }

    /// Formats an optional score bound for ZRANGEBYSCORE/ZCOUNT.
    fn score_bound(bound: Option<f64>, unbounded: &str) -> String {
        bound.map_or_else(|| unbounded.to_string(), |score| score.to_string())
    }

    /// Returns the id that XREAD must be given so entries `>= from` are
    /// delivered (XREAD is exclusive on its last-seen id).
    fn exclusive_predecessor(from: StreamId) -> String {
        if from.seq > 0 {
            StreamId::new(from.ms, from.seq - 1).to_string()
        } else if from.ms > 0 {
            format!("{}-{}", from.ms - 1, u64::MAX)
        } else {
            "0".to_string()
        }
    }

    /// Parses an array of stream entries: `[[id, [field, value, ...]], ...]`.
    fn parse_stream_entries(values: &[redis::Value]) -> Vec<(StreamId, String)> {
        let mut entries = Vec::new();
        for value in values {
            let redis::Value::Array(pair) = value else {
                continue;
            };
            let Some(redis::Value::BulkString(id_bytes)) = pair.first() else {
                continue;
            };
            let Ok(id) = String::from_utf8_lossy(id_bytes).parse::<StreamId>() else {
                continue;
            };
            let Some(redis::Value::Array(fields)) = pair.get(1) else {
                continue;
            };
            // Fields come as flat [name, value, ...]; we store one "payload" field.
            let mut payload = None;
            let mut i = 0;
            while i + 1 < fields.len() {
                if let (redis::Value::BulkString(name), redis::Value::BulkString(data)) =
                    (&fields[i], &fields[i + 1])
                {
                    if name.as_slice() == b"payload" {
                        payload = Some(String::from_utf8_lossy(data).into_owned());
                        break;
                    }
                }
                i += 2;
            }
            if let Some(payload) = payload {
                entries.push((id, payload));
            }
        }
        entries
    }

    impl CoordinationBackend for RedisBackend {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.with_connection("redis_get", |conn| conn.get(key))
        }

        fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
            self.with_connection("redis_set", |conn| match ttl {
                Some(ttl) => {
                    // PX 0 is invalid; round sub-millisecond TTLs up.
                    let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                    conn.pset_ex(key, value, ms)
                },
                None => conn.set(key, value),
            })
        }

        fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
            self.with_connection("redis_set_if_absent", |conn| {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value).arg("NX");
                if let Some(ttl) = ttl {
                    let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                    cmd.arg("PX").arg(ms);
                }
                let reply: redis::Value = cmd.query(conn)?;
                Ok(!matches!(reply, redis::Value::Nil))
            })
        }

        fn delete(&self, key: &str) -> Result<bool> {
            let deleted: i64 = self.with_connection("redis_delete", |conn| conn.del(key))?;
            Ok(deleted > 0)
        }

        fn compare_and_swap(
            &self,
            key: &str,
            expected: &str,
            replacement: Option<&str>,
        ) -> Result<bool> {
            self.with_connection("redis_cas", |conn| {
                redis::cmd("WATCH").arg(key).query::<()>(conn)?;
                let current: Option<String> = conn.get(key)?;
                if current.as_deref() != Some(expected) {
                    redis::cmd("UNWATCH").query::<()>(conn)?;
                    return Ok(false);
                }
                let mut pipe = redis::pipe();
                pipe.atomic();
                match replacement {
                    Some(new_value) => {
                        pipe.cmd("SET").arg(key).arg(new_value).arg("KEEPTTL");
                    },
                    None => {
                        pipe.del(key);
                    },
                }
                // EXEC returns nil when the watched key changed underneath us.
                let applied: Option<()> = pipe.query(conn)?;
                Ok(applied.is_some())
            })
        }

        fn scan(&self, pattern: &str, cursor: &str, count: usize) -> Result<(String, Vec<String>)> {
            let (next, keys): (u64, Vec<String>) = self.with_connection("redis_scan", |conn| {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(count)
                    .query(conn)
            })?;
            Ok((next.to_string(), keys))
        }

        fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
            let receivers: i64 =
                self.with_connection("redis_publish", |conn| conn.publish(channel, payload))?;
            Ok(usize::try_from(receivers).unwrap_or(0))
        }

        fn subscribe(&self, channel: &str, sink: Sender<ChannelMessage>) -> Result<()> {
            {
                let mut sinks = self
                    .shared
                    .sinks
                    .lock()
                    .map_err(|e| op_err("redis_subscribe", e))?;
                sinks.entry(channel.to_string()).or_default().push(sink);
            }
            self.shared.dirty.store(true, Ordering::SeqCst);
            self.ensure_listener()
        }

        fn unsubscribe(&self, channel: &str) -> Result<()> {
            let mut sinks = self
                .shared
                .sinks
                .lock()
                .map_err(|e| op_err("redis_unsubscribe", e))?;
            sinks.remove(channel);
            drop(sinks);
            self.shared.dirty.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn sorted_add(&self, key: &str, score: f64, member: &str) -> Result<()> {
            self.with_connection("redis_sorted_add", |conn| conn.zadd(key, member, score))
        }

        fn sorted_range_by_score(
            &self,
            key: &str,
            min: Option<f64>,
            max: Option<f64>,
        ) -> Result<Vec<String>> {
            self.with_connection("redis_sorted_range", |conn| {
                redis::cmd("ZRANGEBYSCORE")
                    .arg(key)
                    .arg(score_bound(min, "-inf"))
                    .arg(score_bound(max, "+inf"))
                    .query(conn)
            })
        }

        fn sorted_count(&self, key: &str, min: Option<f64>, max: Option<f64>) -> Result<usize> {
            let count: i64 = self.with_connection("redis_sorted_count", |conn| {
                redis::cmd("ZCOUNT")
                    .arg(key)
                    .arg(score_bound(min, "-inf"))
                    .arg(score_bound(max, "+inf"))
                    .query(conn)
            })?;
            Ok(usize::try_from(count).unwrap_or(0))
        }

        fn list_push_back(&self, key: &str, value: &str) -> Result<usize> {
            let len: i64 =
                self.with_connection("redis_list_push", |conn| conn.rpush(key, value))?;
            Ok(usize::try_from(len).unwrap_or(0))
        }

        fn list_pop_front(
            &self,
            keys: &[String],
            timeout: Duration,
        ) -> Result<Option<(String, String)>> {
            if timeout.is_zero() {
                for key in keys {
                    let value: Option<String> =
                        self.with_connection("redis_list_pop", |conn| conn.lpop(key, None))?;
                    if let Some(value) = value {
                        return Ok(Some((key.clone(), value)));
                    }
                }
                return Ok(None);
            }
            // BLPOP checks keys in argument order, which is exactly the
            // priority-lane-first contract the queue service relies on.
            let mut conn = self
                .client
                .get_connection()
                .map_err(|e| op_err("redis_blpop_connect", e))?;
            conn.set_read_timeout(Some(timeout + REDIS_TIMEOUT))
                .map_err(|e| op_err("redis_blpop_timeout", e))?;
            let popped: Option<(String, String)> = conn
                .blpop(keys, timeout.as_secs_f64())
                .map_err(|e| op_err("redis_blpop", e))?;
            Ok(popped)
        }

        fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
            self.with_connection("redis_list_range", |conn| conn.lrange(key, start, stop))
        }

        fn list_len(&self, key: &str) -> Result<usize> {
            let len: i64 = self.with_connection("redis_list_len", |conn| conn.llen(key))?;
            Ok(usize::try_from(len).unwrap_or(0))
        }

        fn stream_append(&self, key: &str, payload: &str, max_len: usize) -> Result<StreamId> {
            let id: String = self.with_connection("redis_stream_append", |conn| {
                let mut cmd = redis::cmd("XADD");
                cmd.arg(key);
                if max_len > 0 {
                    cmd.arg("MAXLEN").arg("=").arg(max_len);
                }
                cmd.arg("*").arg("payload").arg(payload);
                cmd.query(conn)
            })?;
            id.parse()
        }

        fn stream_read(
            &self,
            key: &str,
            from: StreamId,
            count: usize,
        ) -> Result<Vec<(StreamId, String)>> {
            let reply: redis::Value = self.with_connection("redis_stream_read", |conn| {
                redis::cmd("XRANGE")
                    .arg(key)
                    .arg(from.to_string())
                    .arg("+")
                    .arg("COUNT")
                    .arg(u64::try_from(count).unwrap_or(u64::MAX).min(1 << 32))
                    .query(conn)
            })?;
            match reply {
                redis::Value::Array(values) => Ok(parse_stream_entries(&values)),
                _ => Ok(Vec::new()),
            }
        }

        fn stream_read_blocking(
            &self,
            key: &str,
            from: StreamId,
            block: Duration,
        ) -> Result<Vec<(StreamId, String)>> {
            if block.is_zero() {
                return self.stream_read(key, from, usize::MAX);
            }
            let mut conn = self
                .client
                .get_connection()
                .map_err(|e| op_err("redis_xread_connect", e))?;
            conn.set_read_timeout(Some(block + REDIS_TIMEOUT))
                .map_err(|e| op_err("redis_xread_timeout", e))?;
            let reply: redis::Value = redis::cmd("XREAD")
                .arg("BLOCK")
                .arg(u64::try_from(block.as_millis()).unwrap_or(u64::MAX))
                .arg("STREAMS")
                .arg(key)
                .arg(exclusive_predecessor(from))
                .query(&mut conn)
                .map_err(|e| op_err("redis_xread", e))?;
            // XREAD reply: [[stream_name, [entries...]]] or nil on timeout.
            let redis::Value::Array(streams) = reply else {
                return Ok(Vec::new());
            };
            let Some(redis::Value::Array(pair)) = streams.first() else {
                return Ok(Vec::new());
            };
            let Some(redis::Value::Array(entries)) = pair.get(1) else {
                return Ok(Vec::new());
            };
            Ok(parse_stream_entries(entries))
        }

        fn ping(&self) -> Result<bool> {
            let pong: String = self.with_connection("redis_ping", |conn| {
                redis::cmd("PING").query(conn)
            })?;
            Ok(pong == "PONG")
        }

        fn close(&self) -> Result<()> {
            self.shared.shutdown.store(true, Ordering::SeqCst);
            if let Ok(mut guard) = self.listener.lock() {
                if let Some(handle) = guard.take() {
                    if handle.join().is_err() {
                        tracing::warn!("pub/sub listener panicked during shutdown");
                    }
                }
            }
            if let Ok(mut guard) = self.connection.lock() {
                *guard = None;
            }
            Ok(())
        }
    }
}

#[cfg(feature = "redis")]
pub use implementation::RedisBackend;

#[cfg(not(feature = "redis"))]
mod stub {
    use crate::backend::CoordinationBackend;
    use crate::models::{ChannelMessage, StreamId};
    use crate::{Error, Result};
    use std::sync::mpsc::Sender;
    use std::time::Duration;

    fn unavailable() -> Error {
        Error::FeatureNotEnabled("redis".to_string())
    }

    /// Stub Redis backend when the feature is not enabled.
    pub struct RedisBackend;

    impl RedisBackend {
        /// Creates a new Redis backend (stub).
        ///
        /// # Errors
        ///
        /// Always returns an error because the feature is not enabled.
        pub fn new(_connection_url: &str) -> Result<Self> {
            Err(unavailable())
        }

        /// Creates a backend with default settings (stub).
        ///
        /// # Errors
        ///
        /// Always returns an error because the feature is not enabled.
        pub fn with_defaults() -> Result<Self> {
            Err(unavailable())
        }
    }

    impl CoordinationBackend for RedisBackend {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(unavailable())
        }

        fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
            Err(unavailable())
        }

        fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<bool> {
            Err(unavailable())
        }

        fn delete(&self, _key: &str) -> Result<bool> {
            Err(unavailable())
        }

        fn compare_and_swap(
            &self,
            _key: &str,
            _expected: &str,
            _replacement: Option<&str>,
        ) -> Result<bool> {
            Err(unavailable())
        }

        fn scan(
            &self,
            _pattern: &str,
            _cursor: &str,
            _count: usize,
        ) -> Result<(String, Vec<String>)> {
            Err(unavailable())
        }

        fn publish(&self, _channel: &str, _payload: &str) -> Result<usize> {
            Err(unavailable())
        }

        fn subscribe(&self, _channel: &str, _sink: Sender<ChannelMessage>) -> Result<()> {
            Err(unavailable())
        }

        fn unsubscribe(&self, _channel: &str) -> Result<()> {
            Err(unavailable())
        }

        fn sorted_add(&self, _key: &str, _score: f64, _member: &str) -> Result<()> {
            Err(unavailable())
        }

        fn sorted_range_by_score(
            &self,
            _key: &str,
            _min: Option<f64>,
            _max: Option<f64>,
        ) -> Result<Vec<String>> {
            Err(unavailable())
        }

        fn sorted_count(&self, _key: &str, _min: Option<f64>, _max: Option<f64>) -> Result<usize> {
            Err(unavailable())
        }

        fn list_push_back(&self, _key: &str, _value: &str) -> Result<usize> {
            Err(unavailable())
        }

        fn list_pop_front(
            &self,
            _keys: &[String],
            _timeout: Duration,
        ) -> Result<Option<(String, String)>> {
            Err(unavailable())
        }

        fn list_range(&self, _key: &str, _start: isize, _stop: isize) -> Result<Vec<String>> {
            Err(unavailable())
        }

        fn list_len(&self, _key: &str) -> Result<usize> {
            Err(unavailable())
        }

        fn stream_append(&self, _key: &str, _payload: &str, _max_len: usize) -> Result<StreamId> {
            Err(unavailable())
        }

        fn stream_read(
            &self,
            _key: &str,
            _from: StreamId,
            _count: usize,
        ) -> Result<Vec<(StreamId, String)>> {
            Err(unavailable())
        }

        fn stream_read_blocking(
            &self,
            _key: &str,
            _from: StreamId,
            _block: Duration,
        ) -> Result<Vec<(StreamId, String)>> {
            Err(unavailable())
        }

        fn ping(&self) -> Result<bool> {
            Err(unavailable())
        }

        fn close(&self) -> Result<()> {
            Err(unavailable())
        }
    }
}

#[cfg(not(feature = "redis"))]
pub use stub::RedisBackend;
