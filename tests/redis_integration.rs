//! Redis backend integration tests.
//!
//! These tests require a running Redis server. Set the environment variable
//! `CONCORD_TEST_REDIS_URL` to enable them:
//!
//! ```bash
//! export CONCORD_TEST_REDIS_URL="redis://localhost:6379"
//! cargo test --features redis redis_integration
//! ```
//!
//! Every test works under a unique namespace so runs never collide and the
//! server needs no cleanup between them.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
#![cfg(feature = "redis")]

use concord::backend::{CoordinationBackend, RedisBackend};
use concord::{AgentCredentials, ConcordConfig, CoordinationHub, TtlTier};
use serde_json::json;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Environment variable for the Redis test connection URL.
const REDIS_URL_ENV: &str = "CONCORD_TEST_REDIS_URL";

/// Returns the Redis connection URL if available, or None to skip tests.
fn get_redis_url() -> Option<String> {
    env::var(REDIS_URL_ENV).ok()
}

/// Macro to skip tests when Redis is not available.
macro_rules! require_redis {
    () => {
        match get_redis_url() {
            Some(url) => url,
            None => {
                eprintln!(
                    "Skipping test: {} not set. Set this environment variable to run Redis tests.",
                    REDIS_URL_ENV
                );
                return;
            },
        }
    };
}

fn unique_namespace() -> String {
    format!("concord-test-{}", Uuid::new_v4().simple())
}

fn redis_hub(url: &str) -> CoordinationHub {
    let config = ConcordConfig::default()
        .with_backend_url(url)
        .with_namespace(unique_namespace());
    CoordinationHub::connect(&config).expect("redis hub")
}

#[test]
fn test_ping() {
    let url = require_redis!();
    let backend = RedisBackend::new(&url).unwrap();
    assert!(backend.ping().unwrap());
    backend.close().unwrap();
}

#[test]
fn test_kv_round_trip_with_ttl() {
    let url = require_redis!();
    let backend = RedisBackend::new(&url).unwrap();
    let key = format!("{}:kv", unique_namespace());

    backend
        .set(&key, "value", Some(Duration::from_secs(30)))
        .unwrap();
    assert_eq!(backend.get(&key).unwrap(), Some("value".to_string()));
    assert!(backend.delete(&key).unwrap());
    assert_eq!(backend.get(&key).unwrap(), None);
    backend.close().unwrap();
}

#[test]
fn test_compare_and_swap_rejects_stale_expectation() {
    let url = require_redis!();
    let backend = RedisBackend::new(&url).unwrap();
    let key = format!("{}:cas", unique_namespace());

    backend.set(&key, "v1", None).unwrap();
    assert!(backend.compare_and_swap(&key, "v1", Some("v2")).unwrap());
    assert!(!backend.compare_and_swap(&key, "v1", Some("v3")).unwrap());
    assert_eq!(backend.get(&key).unwrap(), Some("v2".to_string()));

    // CAS-delete
    assert!(backend.compare_and_swap(&key, "v2", None).unwrap());
    assert_eq!(backend.get(&key).unwrap(), None);
    backend.delete(&key).ok();
    backend.close().unwrap();
}

#[test]
fn test_stream_append_and_read() {
    let url = require_redis!();
    let backend = RedisBackend::new(&url).unwrap();
    let key = format!("{}:stream", unique_namespace());

    let first = backend.stream_append(&key, r#"{"n":1}"#, 100).unwrap();
    let second = backend.stream_append(&key, r#"{"n":2}"#, 100).unwrap();
    assert!(second > first);

    let all = backend
        .stream_read(&key, concord::StreamId::default(), 10)
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].0, first);

    let tail = backend.stream_read(&key, second, 10).unwrap();
    assert_eq!(tail.len(), 1);
    backend.delete(&key).ok();
    backend.close().unwrap();
}

#[test]
fn test_blocking_pop_orders_keys_by_priority() {
    let url = require_redis!();
    let backend = RedisBackend::new(&url).unwrap();
    let ns = unique_namespace();
    let urgent = format!("{ns}:urgent");
    let fifo = format!("{ns}:fifo");

    backend.list_push_back(&fifo, "slow").unwrap();
    backend.list_push_back(&urgent, "fast").unwrap();

    let keys = vec![urgent.clone(), fifo.clone()];
    let (from, value) = backend
        .list_pop_front(&keys, Duration::from_secs(1))
        .unwrap()
        .unwrap();
    assert_eq!(from, urgent);
    assert_eq!(value, "fast");

    backend.delete(&urgent).ok();
    backend.delete(&fifo).ok();
    backend.close().unwrap();
}

#[test]
fn test_hub_lifecycle_over_redis() {
    let url = require_redis!();
    let hub = redis_hub(&url);
    let contributor = AgentCredentials::contributor("agent-c");
    let coordinator = AgentCredentials::coordinator("agent-k");

    assert!(
        hub.working()
            .stash("plan", &json!({"s": 1}), &contributor, TtlTier::WorkingResults, true)
    );
    assert_eq!(
        hub.working().retrieve("plan", &contributor, None),
        Some(json!({"s": 1}))
    );

    assert!(
        hub.staging()
            .stage_pattern("p-redis", json!({"rule": "x"}), 0.9, &contributor)
    );
    let outcome = hub
        .transactions()
        .atomic_promote_pattern("p-redis", &coordinator, 0.5);
    assert!(outcome.success);
    assert!(hub.staging().get_staged_pattern("p-redis", &contributor).is_none());

    hub.working().clear_working_memory(&contributor);
    hub.close();
}

#[test]
fn test_pubsub_over_redis() {
    let url = require_redis!();
    let hub = Arc::new(redis_hub(&url));
    let creds = AgentCredentials::contributor("agent-p");

    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let received = Arc::clone(&received);
        assert!(hub.pubsub().subscribe(
            "wire",
            move |message| {
                received.lock().unwrap().push(message.clone());
            },
            &creds,
        ));
    }

    // The listener needs a moment to establish the subscription.
    std::thread::sleep(Duration::from_millis(300));
    hub.pubsub().publish("wire", &json!("hello"), &creds);

    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    loop {
        if !received.lock().unwrap().is_empty() {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "message never delivered over redis"
        );
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(received.lock().unwrap()[0], json!("hello"));
    hub.close();
}
