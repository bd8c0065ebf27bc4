//! Integration tests for the messaging surfaces: task queues, append-only
//! streams, timelines, and pub/sub channels.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use concord::{AgentCredentials, ConcordConfig, CoordinationHub};
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

fn hub() -> CoordinationHub {
    CoordinationHub::in_memory(&ConcordConfig::default())
}

mod queues {
    use super::*;

    #[test]
    fn test_priority_lane_pops_first() {
        let hub = hub();
        let creds = AgentCredentials::contributor("worker");

        assert!(hub.queues().queue_push("jobs", &json!({"t": 1}), &creds, false));
        assert!(hub.queues().queue_push("jobs", &json!({"t": 2}), &creds, true));
        assert!(hub.queues().queue_push("jobs", &json!({"t": 3}), &creds, false));

        let order: Vec<i64> = (0..3)
            .map(|_| {
                hub.queues()
                    .queue_pop("jobs", &creds, Duration::ZERO)
                    .unwrap()
                    .payload["t"]
                    .as_i64()
                    .unwrap()
            })
            .collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert!(hub.queues().queue_pop("jobs", &creds, Duration::ZERO).is_none());
    }

    #[test]
    fn test_pop_timeout_on_empty_queue() {
        let hub = hub();
        let creds = AgentCredentials::contributor("worker");

        let started = Instant::now();
        let popped = hub
            .queues()
            .queue_pop("idle", &creds, Duration::from_millis(60));
        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_blocking_pop_wakes_on_push() {
        let hub = Arc::new(hub());
        let creds = AgentCredentials::contributor("worker");

        let popper = {
            let hub = Arc::clone(&hub);
            let creds = creds.clone();
            std::thread::spawn(move || {
                hub.queues().queue_pop("handoff", &creds, Duration::from_secs(2))
            })
        };

        std::thread::sleep(Duration::from_millis(30));
        assert!(hub.queues().queue_push("handoff", &json!("work"), &creds, false));

        let task = popper.join().unwrap().unwrap();
        assert_eq!(task.payload, json!("work"));
    }

    #[test]
    fn test_peek_and_length_leave_queue_intact() {
        let hub = hub();
        let creds = AgentCredentials::contributor("worker");
        hub.queues().queue_push("jobs", &json!(1), &creds, false);
        hub.queues().queue_push("jobs", &json!(2), &creds, true);
        hub.queues().queue_push("jobs", &json!(3), &creds, false);

        let peeked = hub.queues().queue_peek("jobs", 2, &creds);
        assert_eq!(peeked.len(), 2);
        // Pop order: the priority task first
        assert_eq!(peeked[0].payload, json!(2));
        assert!(peeked[0].priority);

        assert_eq!(hub.queues().queue_length("jobs", &creds), 3);
    }

    #[test]
    fn test_observer_cannot_push_or_pop() {
        let hub = hub();
        let observer = AgentCredentials::observer("watcher");
        assert!(!hub.queues().queue_push("jobs", &json!(1), &observer, false));
        assert!(hub.queues().queue_pop("jobs", &observer, Duration::ZERO).is_none());
    }
}

mod streams {
    use super::*;

    #[test]
    fn test_append_assigns_increasing_ids() {
        let hub = hub();
        let creds = AgentCredentials::contributor("writer");

        let first = hub
            .streams()
            .stream_append("events", &json!({"n": 1}), &creds, None)
            .unwrap();
        let second = hub
            .streams()
            .stream_append("events", &json!({"n": 2}), &creds, None)
            .unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_read_from_id_is_inclusive() {
        let hub = hub();
        let creds = AgentCredentials::contributor("writer");
        let ids: Vec<_> = (0..4)
            .map(|n| {
                hub.streams()
                    .stream_append("events", &json!({"n": n}), &creds, None)
                    .unwrap()
            })
            .collect();

        let tail = hub.streams().stream_read("events", Some(ids[2]), 10, &creds);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].id, ids[2]);
        assert_eq!(tail[0].payload, json!({"n": 2}));

        let all = hub.streams().stream_read("events", None, 10, &creds);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_trimming_caps_stream_length() {
        let hub = hub();
        let creds = AgentCredentials::contributor("writer");
        for n in 0..8 {
            hub.streams()
                .stream_append("short", &json!({"n": n}), &creds, Some(5));
        }

        let entries = hub.streams().stream_read("short", None, 100, &creds);
        assert_eq!(entries.len(), 5);
        // Oldest entries were dropped
        assert_eq!(entries[0].payload, json!({"n": 3}));
        assert_eq!(entries[4].payload, json!({"n": 7}));
    }

    #[test]
    fn test_read_new_skips_last_seen() {
        let hub = hub();
        let creds = AgentCredentials::contributor("writer");
        let first = hub
            .streams()
            .stream_append("log", &json!("a"), &creds, None)
            .unwrap();
        let second = hub
            .streams()
            .stream_append("log", &json!("b"), &creds, None)
            .unwrap();

        let new = hub.streams().stream_read_new("log", Some(first), 0, &creds);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].id, second);
    }

    #[test]
    fn test_blocking_read_wakes_on_append() {
        let hub = Arc::new(hub());
        let creds = AgentCredentials::contributor("writer");
        let last = hub
            .streams()
            .stream_append("live", &json!("seed"), &creds, None)
            .unwrap();

        let reader = {
            let hub = Arc::clone(&hub);
            let creds = creds.clone();
            std::thread::spawn(move || {
                hub.streams().stream_read_new("live", Some(last), 2000, &creds)
            })
        };

        std::thread::sleep(Duration::from_millis(30));
        hub.streams().stream_append("live", &json!("fresh"), &creds, None);

        let entries = reader.join().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, json!("fresh"));
    }
}

mod timelines {
    use super::*;

    #[test]
    fn test_window_query_is_ordered_and_bounded() {
        let hub = hub();
        let creds = AgentCredentials::contributor("scribe");

        for (ts, label) in [(1000, "early"), (2000, "mid"), (3000, "late")] {
            assert!(
                hub.timelines()
                    .timeline_add("run", &json!(label), &creds, Some(ts))
                    .is_some()
            );
        }

        let window = hub.timelines().timeline_query("run", Some(1500), Some(2500), &creds);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].payload, json!("mid"));

        let all = hub.timelines().timeline_query("run", None, None, &creds);
        let labels: Vec<_> = all.iter().map(|e| e.payload.clone()).collect();
        assert_eq!(labels, vec![json!("early"), json!("mid"), json!("late")]);
    }

    #[test]
    fn test_count_matches_query() {
        let hub = hub();
        let creds = AgentCredentials::contributor("scribe");
        for ts in [100, 200, 300, 400] {
            hub.timelines().timeline_add("t", &json!(ts), &creds, Some(ts));
        }

        assert_eq!(hub.timelines().timeline_count("t", Some(150), Some(350), &creds), 2);
        assert_eq!(hub.timelines().timeline_count("t", None, None, &creds), 4);
        assert_eq!(hub.timelines().timeline_count("empty", None, None, &creds), 0);
    }

    #[test]
    fn test_identical_payloads_stay_distinct() {
        let hub = hub();
        let creds = AgentCredentials::contributor("scribe");

        let a = hub.timelines().timeline_add("dup", &json!("x"), &creds, Some(500));
        let b = hub.timelines().timeline_add("dup", &json!("x"), &creds, Some(500));
        assert_ne!(a, b);

        let events = hub.timelines().timeline_query("dup", None, None, &creds);
        assert_eq!(events.len(), 2);
    }
}

mod pubsub {
    use super::*;

    #[test]
    fn test_publish_reaches_subscriber() {
        let hub = hub();
        let creds = AgentCredentials::contributor("talker");

        let received = Arc::new(Mutex::new(Vec::new()));
        {
            let received = Arc::clone(&received);
            assert!(hub.pubsub().subscribe(
                "alerts",
                move |message| {
                    received.lock().unwrap().push(message.clone());
                },
                &creds,
            ));
        }

        assert_eq!(hub.pubsub().publish("alerts", &json!({"sev": 1}), &creds), 1);

        // Delivery is asynchronous; poll briefly.
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if !received.lock().unwrap().is_empty() {
                break;
            }
            assert!(Instant::now() < deadline, "message never delivered");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(received.lock().unwrap()[0], json!({"sev": 1}));

        hub.close();
    }

    #[test]
    fn test_publish_without_subscribers_reports_zero() {
        let hub = hub();
        let creds = AgentCredentials::contributor("talker");
        assert_eq!(hub.pubsub().publish("void", &json!(1), &creds), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = hub();
        let creds = AgentCredentials::contributor("talker");

        let count = Arc::new(Mutex::new(0usize));
        {
            let count = Arc::clone(&count);
            hub.pubsub().subscribe(
                "ticks",
                move |_| {
                    *count.lock().unwrap() += 1;
                },
                &creds,
            );
        }
        assert!(hub.pubsub().unsubscribe("ticks", &creds));
        assert_eq!(hub.pubsub().publish("ticks", &json!(1), &creds), 0);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*count.lock().unwrap(), 0);

        hub.close();
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let hub = hub();
        let creds = AgentCredentials::contributor("talker");

        // Re-entrant handlers must not deadlock the dispatcher.
        let count = Arc::new(Mutex::new(0usize));
        {
            let count = Arc::clone(&count);
            let pubsub = Arc::clone(hub.pubsub());
            let handler_creds = creds.clone();
            assert!(hub.pubsub().subscribe(
                "once",
                move |_| {
                    pubsub.unsubscribe("once", &handler_creds);
                    *count.lock().unwrap() += 1;
                },
                &creds,
            ));
        }

        assert_eq!(hub.pubsub().publish("once", &json!("first"), &creds), 1);

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if *count.lock().unwrap() == 1 {
                break;
            }
            assert!(Instant::now() < deadline, "handler never ran");
            std::thread::sleep(Duration::from_millis(10));
        }

        // The handler removed its own subscription before counting.
        assert_eq!(hub.pubsub().publish("once", &json!("again"), &creds), 0);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*count.lock().unwrap(), 1);

        hub.close();
    }

    #[test]
    fn test_observer_cannot_publish() {
        let hub = hub();
        let observer = AgentCredentials::observer("watcher");
        assert_eq!(hub.pubsub().publish("alerts", &json!(1), &observer), 0);
    }
}
