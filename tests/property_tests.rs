//! Property-based tests over the in-process backend.

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use concord::{AgentCredentials, ConcordConfig, CoordinationHub};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;

fn hub() -> CoordinationHub {
    CoordinationHub::in_memory(&ConcordConfig::default())
}

proptest! {
    /// Following scan cursors to completion always yields every staged
    /// pattern exactly once, regardless of page size.
    #[test]
    fn prop_pagination_is_complete(total in 1usize..60, page in 1usize..20) {
        let hub = hub();
        let creds = AgentCredentials::contributor("agent-p");
        for i in 0..total {
            let pattern_id = format!("p-{i:03}");
            let staged = hub.staging().stage_pattern(&pattern_id, json!(i), 0.5, &creds);
            prop_assert!(staged);
        }

        let mut seen = BTreeSet::new();
        let mut cursor = "0".to_string();
        loop {
            let (patterns, next) =
                hub.staging().list_staged_patterns_paginated(&cursor, page, &creds);
            for pattern in patterns {
                prop_assert!(seen.insert(pattern.pattern_id), "duplicate in pagination");
            }
            if next == "0" {
                break;
            }
            cursor = next;
        }
        prop_assert_eq!(seen.len(), total);
    }

    /// Pops return every priority task before any FIFO task, preserving
    /// insertion order within each lane.
    #[test]
    fn prop_queue_ordering(flags in proptest::collection::vec(any::<bool>(), 1..30)) {
        let hub = hub();
        let creds = AgentCredentials::contributor("agent-q");
        for (i, &priority) in flags.iter().enumerate() {
            prop_assert!(hub.queues().queue_push("q", &json!(i), &creds, priority));
        }

        let mut expected: Vec<usize> = (0..flags.len()).filter(|&i| flags[i]).collect();
        expected.extend((0..flags.len()).filter(|&i| !flags[i]));

        let mut actual = Vec::new();
        while let Some(task) = hub.queues().queue_pop("q", &creds, Duration::ZERO) {
            actual.push(usize::try_from(task.payload.as_u64().unwrap()).unwrap());
        }
        prop_assert_eq!(actual, expected);
    }

    /// Stash/retrieve round-trips arbitrary JSON-safe strings when
    /// sanitization is skipped.
    #[test]
    fn prop_stash_round_trip(key in "[a-z0-9-]{1,24}", text in "\\PC{0,80}") {
        let hub = hub();
        let creds = AgentCredentials::contributor("agent-r");
        let payload = json!({"text": text});
        prop_assert!(hub.working().stash(&key, &payload, &creds, concord::TtlTier::Durable, true));
        prop_assert_eq!(hub.working().retrieve(&key, &creds, None), Some(payload));
    }
}
