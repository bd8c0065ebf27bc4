//! In-process backend.
//!
//! Implements the full [`CoordinationBackend`] contract over process-local
//! collections with lazy TTL sweeping, so the entire coordination layer is
//! testable without a live server. Blocking pops and stream reads are built
//! on a `Mutex`/`Condvar` pair; pub/sub dispatches directly into subscriber
//! sinks at publish time.

use super::CoordinationBackend;
use crate::models::{ChannelMessage, StreamId};
use crate::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A stored value with its optional expiry.
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Append-only stream state.
#[derive(Debug, Default)]
struct StreamLog {
    entries: VecDeque<(StreamId, String)>,
    last_id: StreamId,
}

/// In-process implementation of [`CoordinationBackend`].
#[derive(Default)]
pub struct InMemoryBackend {
    kv: Mutex<HashMap<String, StoredValue>>,
    zsets: Mutex<HashMap<String, Vec<(f64, String)>>>,
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    lists_cv: Condvar,
    streams: Mutex<HashMap<String, StreamLog>>,
    streams_cv: Condvar,
    subscribers: Mutex<HashMap<String, Vec<Sender<ChannelMessage>>>>,
    closed: AtomicBool,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>, operation: &str) -> Result<MutexGuard<'a, T>> {
        mutex.lock().map_err(|e| Error::OperationFailed {
            operation: operation.to_string(),
            cause: e.to_string(),
        })
    }

    fn check_open(&self, operation: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::OperationFailed {
                operation: operation.to_string(),
                cause: "backend is closed".to_string(),
            });
        }
        Ok(())
    }
}

/// Matches a key against a glob pattern supporting `*` wildcards.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remainder = text;
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match remainder.strip_prefix(part) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if i == last {
            return part.is_empty() || remainder.ends_with(part);
        } else if part.is_empty() {
            // consecutive '*'
        } else if let Some(idx) = remainder.find(part) {
            remainder = &remainder[idx + part.len()..];
        } else {
            return false;
        }
    }
    true
}

impl CoordinationBackend for InMemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_open("memory_get")?;
        let mut kv = Self::lock(&self.kv, "memory_get")?;
        match kv.get(key) {
            Some(stored) if stored.live() => Ok(Some(stored.value.clone())),
            Some(_) => {
                kv.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.check_open("memory_set")?;
        let mut kv = Self::lock(&self.kv, "memory_set")?;
        kv.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        self.check_open("memory_set_if_absent")?;
        let mut kv = Self::lock(&self.kv, "memory_set_if_absent")?;
        if kv.get(key).is_some_and(StoredValue::live) {
            return Ok(false);
        }
        kv.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.check_open("memory_delete")?;
        let mut kv = Self::lock(&self.kv, "memory_delete")?;
        Ok(kv.remove(key).is_some_and(|stored| stored.live()))
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        replacement: Option<&str>,
    ) -> Result<bool> {
        self.check_open("memory_cas")?;
        let mut kv = Self::lock(&self.kv, "memory_cas")?;
        let matches = kv
            .get(key)
            .is_some_and(|stored| stored.live() && stored.value == expected);
        if !matches {
            return Ok(false);
        }
        match replacement {
            Some(new_value) => {
                // Retain the existing expiry across the swap.
                if let Some(stored) = kv.get_mut(key) {
                    stored.value = new_value.to_string();
                }
            },
            None => {
                kv.remove(key);
            },
        }
        Ok(true)
    }

    fn scan(&self, pattern: &str, cursor: &str, count: usize) -> Result<(String, Vec<String>)> {
        self.check_open("memory_scan")?;
        let offset: usize = cursor
            .parse()
            .map_err(|_| Error::InvalidInput(format!("malformed scan cursor '{cursor}'")))?;

        let mut kv = Self::lock(&self.kv, "memory_scan")?;
        // Lazy sweep: drop expired entries while we hold the lock.
        kv.retain(|_, stored| stored.live());

        let mut matching: Vec<String> = kv
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        matching.sort_unstable();

        let page: Vec<String> = matching.iter().skip(offset).take(count).cloned().collect();
        let next = offset + page.len();
        let next_cursor = if next >= matching.len() {
            "0".to_string()
        } else {
            next.to_string()
        };
        Ok((next_cursor, page))
    }

    fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        self.check_open("memory_publish")?;
        let mut subs = Self::lock(&self.subscribers, "memory_publish")?;
        let Some(sinks) = subs.get_mut(channel) else {
            return Ok(0);
        };
        // Prune sinks whose receiving side has gone away.
        sinks.retain(|sink| {
            sink.send(ChannelMessage {
                channel: channel.to_string(),
                payload: payload.to_string(),
            })
            .is_ok()
        });
        Ok(sinks.len())
    }

    fn subscribe(&self, channel: &str, sink: Sender<ChannelMessage>) -> Result<()> {
        self.check_open("memory_subscribe")?;
        let mut subs = Self::lock(&self.subscribers, "memory_subscribe")?;
        subs.entry(channel.to_string()).or_default().push(sink);
        Ok(())
    }

    fn unsubscribe(&self, channel: &str) -> Result<()> {
        let mut subs = Self::lock(&self.subscribers, "memory_unsubscribe")?;
        subs.remove(channel);
        Ok(())
    }

    fn sorted_add(&self, key: &str, score: f64, member: &str) -> Result<()> {
        self.check_open("memory_sorted_add")?;
        let mut zsets = Self::lock(&self.zsets, "memory_sorted_add")?;
        let set = zsets.entry(key.to_string()).or_default();
        set.retain(|(_, m)| m != member);
        // Insert before the first higher score; equal scores keep insertion order.
        let position = set
            .iter()
            .position(|(s, _)| *s > score)
            .unwrap_or(set.len());
        set.insert(position, (score, member.to_string()));
        Ok(())
    }

    fn sorted_range_by_score(
        &self,
        key: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Vec<String>> {
        self.check_open("memory_sorted_range")?;
        let zsets = Self::lock(&self.zsets, "memory_sorted_range")?;
        let Some(set) = zsets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(set
            .iter()
            .filter(|(score, _)| min.is_none_or(|m| *score >= m) && max.is_none_or(|m| *score <= m))
            .map(|(_, member)| member.clone())
            .collect())
    }

    fn sorted_count(&self, key: &str, min: Option<f64>, max: Option<f64>) -> Result<usize> {
        Ok(self.sorted_range_by_score(key, min, max)?.len())
    }

    fn list_push_back(&self, key: &str, value: &str) -> Result<usize> {
        self.check_open("memory_list_push")?;
        let mut lists = Self::lock(&self.lists, "memory_list_push")?;
        let list = lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        let len = list.len();
        drop(lists);
        self.lists_cv.notify_all();
        Ok(len)
    }

    fn list_pop_front(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, String)>> {
        self.check_open("memory_list_pop")?;
        let deadline = Instant::now() + timeout;
        let mut lists = Self::lock(&self.lists, "memory_list_pop")?;
        loop {
            for key in keys {
                if let Some(list) = lists.get_mut(key) {
                    if let Some(value) = list.pop_front() {
                        return Ok(Some((key.clone(), value)));
                    }
                }
            }
            if timeout.is_zero() || self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .lists_cv
                .wait_timeout(lists, deadline - now)
                .map_err(|e| Error::OperationFailed {
                    operation: "memory_list_pop".to_string(),
                    cause: e.to_string(),
                })?;
            lists = guard;
        }
    }

    fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.check_open("memory_list_range")?;
        let lists = Self::lock(&self.lists, "memory_list_range")?;
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as isize;
        let normalize = |index: isize| -> isize {
            if index < 0 { len + index } else { index }
        };
        let start = normalize(start).max(0);
        let stop = normalize(stop).min(len - 1);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(usize::try_from(start).unwrap_or(0))
            .take(usize::try_from(stop - start + 1).unwrap_or(0))
            .cloned()
            .collect())
    }

    fn list_len(&self, key: &str) -> Result<usize> {
        self.check_open("memory_list_len")?;
        let lists = Self::lock(&self.lists, "memory_list_len")?;
        Ok(lists.get(key).map_or(0, VecDeque::len))
    }

    fn stream_append(&self, key: &str, payload: &str, max_len: usize) -> Result<StreamId> {
        self.check_open("memory_stream_append")?;
        let mut streams = Self::lock(&self.streams, "memory_stream_append")?;
        let log = streams.entry(key.to_string()).or_default();

        let now_ms = crate::current_timestamp_ms();
        let id = if now_ms <= log.last_id.ms {
            log.last_id.next()
        } else {
            StreamId::new(now_ms, 0)
        };
        log.last_id = id;
        log.entries.push_back((id, payload.to_string()));
        if max_len > 0 {
            while log.entries.len() > max_len {
                log.entries.pop_front();
            }
        }
        drop(streams);
        self.streams_cv.notify_all();
        Ok(id)
    }

    fn stream_read(
        &self,
        key: &str,
        from: StreamId,
        count: usize,
    ) -> Result<Vec<(StreamId, String)>> {
        self.check_open("memory_stream_read")?;
        let streams = Self::lock(&self.streams, "memory_stream_read")?;
        let Some(log) = streams.get(key) else {
            return Ok(Vec::new());
        };
        Ok(log
            .entries
            .iter()
            .filter(|(id, _)| *id >= from)
            .take(count)
            .cloned()
            .collect())
    }

    fn stream_read_blocking(
        &self,
        key: &str,
        from: StreamId,
        block: Duration,
    ) -> Result<Vec<(StreamId, String)>> {
        self.check_open("memory_stream_read_blocking")?;
        let deadline = Instant::now() + block;
        let mut streams = Self::lock(&self.streams, "memory_stream_read_blocking")?;
        loop {
            let available: Vec<(StreamId, String)> = streams
                .get(key)
                .map(|log| {
                    log.entries
                        .iter()
                        .filter(|(id, _)| *id >= from)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if !available.is_empty() || block.is_zero() || self.closed.load(Ordering::SeqCst) {
                return Ok(available);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(available);
            }
            let (guard, _) = self
                .streams_cv
                .wait_timeout(streams, deadline - now)
                .map_err(|e| Error::OperationFailed {
                    operation: "memory_stream_read_blocking".to_string(),
                    cause: e.to_string(),
                })?;
            streams = guard;
        }
    }

    fn ping(&self) -> Result<bool> {
        Ok(!self.closed.load(Ordering::SeqCst))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        // Wake any blocked poppers/readers so they observe the closed flag.
        self.lists_cv.notify_all();
        self.streams_cv.notify_all();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_set_get_delete() {
        let backend = InMemoryBackend::new();
        backend.set("k1", "v1", None).unwrap();
        assert_eq!(backend.get("k1").unwrap(), Some("v1".to_string()));
        assert!(backend.delete("k1").unwrap());
        assert_eq!(backend.get("k1").unwrap(), None);
        assert!(!backend.delete("k1").unwrap());
    }

    #[test]
    fn test_ttl_expiry() {
        let backend = InMemoryBackend::new();
        backend
            .set("short", "v", Some(Duration::from_millis(20)))
            .unwrap();
        assert!(backend.get("short").unwrap().is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(backend.get("short").unwrap(), None);
    }

    #[test]
    fn test_set_if_absent() {
        let backend = InMemoryBackend::new();
        assert!(backend.set_if_absent("k", "a", None).unwrap());
        assert!(!backend.set_if_absent("k", "b", None).unwrap());
        assert_eq!(backend.get("k").unwrap(), Some("a".to_string()));
    }

    #[test]
    fn test_compare_and_swap() {
        let backend = InMemoryBackend::new();
        backend.set("k", "old", None).unwrap();
        assert!(!backend.compare_and_swap("k", "wrong", None).unwrap());
        assert!(backend.compare_and_swap("k", "old", Some("new")).unwrap());
        assert_eq!(backend.get("k").unwrap(), Some("new".to_string()));
        assert!(backend.compare_and_swap("k", "new", None).unwrap());
        assert_eq!(backend.get("k").unwrap(), None);
    }

    #[test]
    fn test_scan_pagination_visits_everything() {
        let backend = InMemoryBackend::new();
        for i in 0..25 {
            backend.set(&format!("ns:item:{i:02}"), "v", None).unwrap();
        }
        backend.set("other:thing", "v", None).unwrap();

        let mut seen = Vec::new();
        let mut cursor = "0".to_string();
        loop {
            let (next, page) = backend.scan("ns:item:*", &cursor, 7).unwrap();
            seen.extend(page);
            if next == "0" {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 25);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("a:*", "a:b"));
        assert!(glob_match("a:*:c", "a:b:c"));
        assert!(!glob_match("a:*", "b:a"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[test]
    fn test_list_pop_priority_order_across_keys() {
        let backend = InMemoryBackend::new();
        backend.list_push_back("q:norm", "n1").unwrap();
        backend.list_push_back("q:high", "h1").unwrap();
        let keys = vec!["q:high".to_string(), "q:norm".to_string()];
        let (key, value) = backend
            .list_pop_front(&keys, Duration::ZERO)
            .unwrap()
            .unwrap();
        assert_eq!(key, "q:high");
        assert_eq!(value, "h1");
    }

    #[test]
    fn test_blocking_pop_times_out() {
        let backend = InMemoryBackend::new();
        let keys = vec!["empty".to_string()];
        let started = Instant::now();
        let result = backend
            .list_pop_front(&keys, Duration::from_millis(50))
            .unwrap();
        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_blocking_pop_wakes_on_push() {
        let backend = std::sync::Arc::new(InMemoryBackend::new());
        let popper = std::sync::Arc::clone(&backend);
        let handle = std::thread::spawn(move || {
            let keys = vec!["wake".to_string()];
            popper.list_pop_front(&keys, Duration::from_secs(2)).unwrap()
        });
        std::thread::sleep(Duration::from_millis(30));
        backend.list_push_back("wake", "v").unwrap();
        let result = handle.join().unwrap();
        assert_eq!(result, Some(("wake".to_string(), "v".to_string())));
    }

    #[test]
    fn test_stream_append_monotonic_and_trims() {
        let backend = InMemoryBackend::new();
        let mut last = StreamId::default();
        for i in 0..15 {
            let id = backend
                .stream_append("s", &format!("p{i}"), 10)
                .unwrap();
            assert!(id > last);
            last = id;
        }
        let entries = backend.stream_read("s", StreamId::default(), 100).unwrap();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].1, "p5");
    }

    #[test]
    fn test_sorted_set_range_and_stability() {
        let backend = InMemoryBackend::new();
        backend.sorted_add("z", 2.0, "b").unwrap();
        backend.sorted_add("z", 1.0, "a").unwrap();
        backend.sorted_add("z", 2.0, "c").unwrap();
        let all = backend.sorted_range_by_score("z", None, None).unwrap();
        assert_eq!(all, vec!["a", "b", "c"]);
        let windowed = backend
            .sorted_range_by_score("z", Some(1.5), Some(2.5))
            .unwrap();
        assert_eq!(windowed, vec!["b", "c"]);
        assert_eq!(backend.sorted_count("z", Some(2.0), None).unwrap(), 2);
    }

    #[test]
    fn test_publish_counts_subscribers() {
        let backend = InMemoryBackend::new();
        let (tx, rx) = mpsc::channel();
        backend.subscribe("c1", tx).unwrap();
        let delivered = backend.publish("c1", "{\"x\":1}").unwrap();
        assert_eq!(delivered, 1);
        let message = rx.recv().unwrap();
        assert_eq!(message.channel, "c1");
        assert_eq!(message.payload, "{\"x\":1}");
        assert_eq!(backend.publish("c2", "{}").unwrap(), 0);
    }

    #[test]
    fn test_close_rejects_further_operations() {
        let backend = InMemoryBackend::new();
        backend.close().unwrap();
        assert!(!backend.ping().unwrap());
        assert!(backend.get("k").is_err());
    }
}
